//! Adapters layer: Concrete implementations of ports.
//!
//! - `laplace`: Laplace mechanism backed by a ChaCha CSPRNG
//! - `logistic`: L2-regularised logistic regression classifier
//! - `http`: Axum router exposing the analytics service

pub mod http;
pub mod laplace;
pub mod logistic;
