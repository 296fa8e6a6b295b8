use std::fmt::Display;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod collection;
pub mod memory;

/// Identity of a record inside of a collection. Identities are always kept in
/// their string form so that `7` and `"7"` address the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl ToString) -> Self {
        Self(id.to_string())
    }

    /// Read an identity out of a json value. Only strings and numbers can be
    /// used as an identity.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// A single record of a collection. The core never looks inside of a record
/// except to read its identity, so it is kept as a plain json object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Copy every field of the patch onto this record, one field at a time.
    pub fn apply(&mut self, patch: &Patch) {
        for (field, value) in patch.iter() {
            self.0.insert(field.clone(), value.clone());
        }
    }

    /// Build a new record where the patch wins over this record's fields. The
    /// record itself is left untouched.
    pub fn overlay(&self, patch: &Patch) -> Record {
        let mut record = self.clone();
        record.apply(patch);
        record
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl TryFrom<Value> for Record {
    type Error = anyhow::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => anyhow::bail!("A record must be a json object. Found {}", other),
        }
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

/// Partial record holding local edits. Writing the same field twice keeps the
/// last value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(IndexMap<String, Value>);

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What happened to the record inside of the observed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Update,
    Remove,
}

/// A notification sent by an observed collection. `previous_index` is set for
/// updates and removals of records that were inside of the view,
/// `new_index` for additions and updates that land inside of the view.
#[derive(Debug, Clone)]
pub struct Change {
    pub kind: ChangeKind,
    pub record: Record,
    pub previous_index: Option<usize>,
    pub new_index: Option<usize>,
}

impl Change {
    pub fn added(record: Record, new_index: usize) -> Self {
        Self {
            kind: ChangeKind::Add,
            record,
            previous_index: None,
            new_index: Some(new_index),
        }
    }

    pub fn updated(record: Record, previous_index: Option<usize>, new_index: Option<usize>) -> Self {
        Self {
            kind: ChangeKind::Update,
            record,
            previous_index,
            new_index,
        }
    }

    pub fn removed(record: Record, previous_index: usize) -> Self {
        Self {
            kind: ChangeKind::Remove,
            record,
            previous_index: Some(previous_index),
            new_index: None,
        }
    }
}
