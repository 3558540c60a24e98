//! Dataset types for DP analytics requests.
//!
//! A dataset is an ordered list of records received with a request. It is
//! never mutated after decoding and never persisted.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Label of the implicit group when no group key is given.
pub const ALL_GROUP: &str = "all";

/// A single scalar cell in a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Flag(bool),
    Null,
}

impl FieldValue {
    /// Coerce to a finite number.
    ///
    /// Strings are parsed after trimming. Booleans, nulls, non-finite and
    /// unparsable values yield `None` and are treated as missing.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        let x = match self {
            Self::Number(x) => *x,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
            Self::Flag(_) | Self::Null => return None,
        };
        x.is_finite().then_some(x)
    }

    /// Positive indicator test for percentages: numeric 1 or the string "1".
    #[must_use]
    pub fn is_positive_indicator(&self) -> bool {
        match self {
            Self::Number(x) => *x == 1.0,
            Self::Text(s) => s.trim() == "1",
            Self::Flag(_) | Self::Null => false,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(x: f64) -> Self {
        Self::Number(x)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// One record: field name to scalar value.
pub type Record = BTreeMap<String, FieldValue>;

/// Ordered, immutable sequence of records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    records: Vec<Record>,
}

/// Records sharing one group-key value.
#[derive(Debug, Clone)]
pub struct Partition<'a> {
    /// Group label (`all` when ungrouped)
    pub label: String,
    /// Records in original order
    pub records: Vec<&'a Record>,
}

impl Partition<'_> {
    /// Raw values of `column`; a missing field reads as `Null`.
    pub fn column<'c>(&'c self, column: &'c str) -> impl Iterator<Item = &'c FieldValue> + 'c {
        static NULL: FieldValue = FieldValue::Null;
        self.records
            .iter()
            .map(move |r| r.get(column).unwrap_or(&NULL))
    }
}

impl Dataset {
    /// Create a dataset from records.
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Build a single-column dataset from plain numbers.
    #[must_use]
    pub fn from_values(column: &str, values: &[f64]) -> Self {
        let records = values
            .iter()
            .map(|&v| {
                let mut r = Record::new();
                r.insert(column.to_string(), FieldValue::Number(v));
                r
            })
            .collect();
        Self { records }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Partition records by the Cartesian key of `group_by`.
    ///
    /// Partitions come back in first-appearance order. An empty key yields a
    /// single partition labelled [`ALL_GROUP`], even for an empty dataset.
    #[must_use]
    pub fn partition(&self, group_by: &[String]) -> Vec<Partition<'_>> {
        if group_by.is_empty() {
            return vec![Partition {
                label: ALL_GROUP.to_string(),
                records: self.records.iter().collect(),
            }];
        }

        let mut index: HashMap<Vec<KeyPart<'_>>, usize> = HashMap::new();
        let mut keys: Vec<Vec<KeyPart<'_>>> = Vec::new();
        let mut members: Vec<Vec<&Record>> = Vec::new();

        for record in &self.records {
            let key: Vec<KeyPart<'_>> = group_by
                .iter()
                .map(|field| record.get(field).map_or(KeyPart::Null, KeyPart::from))
                .collect();
            match index.get(&key) {
                Some(&i) => members[i].push(record),
                None => {
                    index.insert(key.clone(), keys.len());
                    keys.push(key);
                    members.push(vec![record]);
                }
            }
        }

        unique_labels(&keys)
            .into_iter()
            .zip(members)
            .map(|(label, records)| Partition { label, records })
            .collect()
    }
}

/// Typed component of a group key.
///
/// Keeps the value's variant so `1` and `"1"`, or `null` and `"null"`, stay
/// distinct groups even though they render alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyPart<'a> {
    Number(u64),
    Text(&'a str),
    Flag(bool),
    Null,
}

impl<'a> From<&'a FieldValue> for KeyPart<'a> {
    fn from(v: &'a FieldValue) -> Self {
        match v {
            // -0.0 and 0.0 are one group.
            FieldValue::Number(x) => Self::Number(if *x == 0.0 { 0.0f64.to_bits() } else { x.to_bits() }),
            FieldValue::Text(s) => Self::Text(s),
            FieldValue::Flag(b) => Self::Flag(*b),
            FieldValue::Null => Self::Null,
        }
    }
}

impl KeyPart<'_> {
    fn label(&self) -> String {
        match self {
            Self::Number(bits) => f64::from_bits(*bits).to_string(),
            Self::Text(s) => (*s).to_string(),
            Self::Flag(b) => b.to_string(),
            Self::Null => "null".to_string(),
        }
    }
}

fn render_label(key: &[KeyPart<'_>]) -> String {
    match key {
        [single] => single.label(),
        parts => format!(
            "({})",
            parts.iter().map(KeyPart::label).collect::<Vec<_>>().join(", ")
        ),
    }
}

/// Render one label per distinct key.
///
/// Later keys whose rendering is already taken get a ` #2`, ` #3`, ... suffix.
fn unique_labels(keys: &[Vec<KeyPart<'_>>]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    keys.iter()
        .map(|key| {
            let base = render_label(key);
            let mut label = base.clone();
            let mut n = 2;
            while taken.contains(&label) {
                label = format!("{base} #{n}");
                n += 1;
            }
            taken.insert(label.clone());
            label
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, FieldValue)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_coercion() {
        assert_eq!(FieldValue::Number(2.5).as_number(), Some(2.5));
        assert_eq!(FieldValue::from(" 3 ").as_number(), Some(3.0));
        assert_eq!(FieldValue::from("abc").as_number(), None);
        assert_eq!(FieldValue::from("NaN").as_number(), None);
        assert_eq!(FieldValue::Flag(true).as_number(), None);
        assert_eq!(FieldValue::Null.as_number(), None);
    }

    #[test]
    fn test_positive_indicator() {
        assert!(FieldValue::Number(1.0).is_positive_indicator());
        assert!(FieldValue::from("1").is_positive_indicator());
        assert!(!FieldValue::Number(2.0).is_positive_indicator());
        assert!(!FieldValue::from("1.0").is_positive_indicator());
        assert!(!FieldValue::from("yes").is_positive_indicator());
        assert!(!FieldValue::Flag(true).is_positive_indicator());
    }

    #[test]
    fn test_deserialize_mixed_record() {
        let json = r#"[{"city": "Oslo", "age": 31, "smoker": "1", "note": null, "ok": true}]"#;
        let ds: Dataset = serde_json::from_str(json).expect("Should parse");
        let r = &ds.records()[0];
        assert_eq!(r["city"], FieldValue::from("Oslo"));
        assert_eq!(r["age"], FieldValue::Number(31.0));
        assert_eq!(r["note"], FieldValue::Null);
        assert_eq!(r["ok"], FieldValue::Flag(true));
    }

    #[test]
    fn test_partition_first_appearance_order() {
        let ds = Dataset::new(vec![
            record(&[("g", "b".into()), ("x", 1.0.into())]),
            record(&[("g", "a".into()), ("x", 2.0.into())]),
            record(&[("g", "b".into()), ("x", 3.0.into())]),
        ]);

        let parts = ds.partition(&["g".to_string()]);
        let labels: Vec<_> = parts.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "a"]);
        assert_eq!(parts[0].records.len(), 2);
    }

    #[test]
    fn test_partition_multi_key_and_missing_field() {
        let ds = Dataset::new(vec![
            record(&[("g", "a".into()), ("h", 1.0.into())]),
            record(&[("g", "a".into())]),
        ]);

        let parts = ds.partition(&["g".to_string(), "h".to_string()]);
        let labels: Vec<_> = parts.iter().map(|p| p.label.clone()).collect();
        assert_eq!(labels, vec!["(a, 1)".to_string(), "(a, null)".to_string()]);
    }

    #[test]
    fn test_ungrouped_partition() {
        let ds = Dataset::from_values("v", &[1.0, 2.0]);
        let parts = ds.partition(&[]);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].label, ALL_GROUP);

        let values: Vec<_> = parts[0].column("v").filter_map(FieldValue::as_number).collect();
        assert_eq!(values, vec![1.0, 2.0]);
        assert_eq!(parts[0].column("missing").count(), 2);
    }

    #[test]
    fn test_partition_distinguishes_keys_that_render_alike() {
        let g = ["g".to_string(), "h".to_string()];
        let ds = Dataset::new(vec![
            record(&[("g", "x, y".into()), ("h", "z".into()), ("v", 1.0.into())]),
            record(&[("g", "x".into()), ("h", "y, z".into()), ("v", 9.0.into())]),
        ]);
        let parts = ds.partition(&g);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].label, "(x, y, z)");
        assert_eq!(parts[1].label, "(x, y, z) #2");
        assert!(parts.iter().all(|p| p.records.len() == 1));

        let ds = Dataset::new(vec![
            record(&[("g", 1.0.into())]),
            record(&[("g", "1".into())]),
            record(&[("g", FieldValue::Null)]),
            record(&[("g", "null".into())]),
            record(&[]),
            record(&[("g", "1".into())]),
        ]);
        let parts = ds.partition(&["g".to_string()]);
        let summary: Vec<_> = parts
            .iter()
            .map(|p| (p.label.as_str(), p.records.len()))
            .collect();
        assert_eq!(
            summary,
            vec![("1", 1), ("1 #2", 2), ("null", 2), ("null #2", 1)]
        );
    }
}
