//! Record trait and index/filter types

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Current Unix timestamp in milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A value that can be indexed for filtered listing
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    String(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for IndexValue {
    fn from(s: &str) -> Self {
        IndexValue::String(s.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(s: String) -> Self {
        IndexValue::String(s)
    }
}

impl From<i64> for IndexValue {
    fn from(i: i64) -> Self {
        IndexValue::Int(i)
    }
}

impl From<bool> for IndexValue {
    fn from(b: bool) -> Self {
        IndexValue::Bool(b)
    }
}

/// Comparison operator for filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
}

/// A single filter condition against an indexed field
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    /// Equality filter shorthand
    pub fn eq(field: impl Into<String>, value: impl Into<IndexValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    /// Check whether a set of indexed fields satisfies this filter
    pub fn matches(&self, fields: &HashMap<String, IndexValue>) -> bool {
        match (self.op, fields.get(&self.field)) {
            (FilterOp::Eq, Some(v)) => *v == self.value,
            (FilterOp::Ne, Some(v)) => *v != self.value,
            // Absent fields never satisfy Eq, always satisfy Ne
            (FilterOp::Eq, None) => false,
            (FilterOp::Ne, None) => true,
        }
    }
}

/// Trait for records that can be persisted in a [`crate::Store`]
pub trait Record: Serialize + DeserializeOwned {
    /// Unique identifier within the collection
    fn id(&self) -> &str;

    /// Last update timestamp (Unix milliseconds)
    fn updated_at(&self) -> i64;

    /// Collection this record type lives in
    fn collection_name() -> &'static str;

    /// Fields exposed to filtered listing
    fn indexed_fields(&self) -> HashMap<String, IndexValue>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, IndexValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), IndexValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_filter_eq_matches() {
        let f = Filter::eq("status", "pending");
        assert!(f.matches(&fields(&[("status", "pending")])));
        assert!(!f.matches(&fields(&[("status", "running")])));
        assert!(!f.matches(&fields(&[])));
    }

    #[test]
    fn test_filter_ne() {
        let f = Filter {
            field: "status".to_string(),
            op: FilterOp::Ne,
            value: IndexValue::from("failed"),
        };
        assert!(f.matches(&fields(&[("status", "pending")])));
        assert!(!f.matches(&fields(&[("status", "failed")])));
        assert!(f.matches(&fields(&[])));
    }

    #[test]
    fn test_index_value_conversions() {
        assert_eq!(IndexValue::from("x"), IndexValue::String("x".to_string()));
        assert_eq!(IndexValue::from(3i64), IndexValue::Int(3));
        assert_eq!(IndexValue::from(true), IndexValue::Bool(true));
    }

    #[test]
    fn test_now_ms_is_positive() {
        assert!(now_ms() > 0);
    }
}
