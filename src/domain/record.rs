//! Records and batches flowing through the in-process pipeline.
//!
//! The coordination layer treats a record as an opaque bag of named fields.
//! Only the `id` field has meaning here: once the source stage assigns it,
//! every later stage that forwards the record must keep it unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the identifier field carried by every record
pub const ID_FIELD: &str = "id";

/// An ordered group of records produced or consumed by one stage invocation
pub type Batch = Vec<Record>;

/// One unit of domain data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, returning the record for chaining
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// The record identifier, if one has been assigned
    pub fn id(&self) -> Option<&Value> {
        self.0.get(ID_FIELD)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
