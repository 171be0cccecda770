// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::fmt;

use serde_json::{Map, Value};

use crate::hash;

/// Data operation carried by a load event.  `Any` leaves the choice of
/// insert/update/delete to the writer based on what is already committed,
/// which is useful when the event carries the desired current state rather
/// than a delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
    Any,
}

impl Operation {
    /// Parses the wire form.  Matching is exact and case-sensitive; anything
    /// unrecognized yields `None`.
    pub fn parse(op: &str) -> Option<Operation> {
        match op {
            "INSERT" => Some(Operation::Insert),
            "UPDATE" => Some(Operation::Update),
            "DELETE" => Some(Operation::Delete),
            "ANY" => Some(Operation::Any),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Any => "ANY",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A pending insert, update, or delete of a single document revision against
/// the target ledger.  Events may carry a grouping value to specify ordering
/// within a group for delivery channels that support it (FIFO loaders).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadEvent {
    operation: Option<Operation>,
    table_name: Option<String>,
    grouping_value: Option<String>,
    id: Option<Value>,
    revision: Option<Map<String, Value>>,
    version: Option<i64>,
}

impl LoadEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// The unique/idempotence identifier for the record delivered in this
    /// load event.
    pub fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    /// Any JSON scalar is accepted; a null clears the identifier.
    pub fn set_id(&mut self, id: Value) {
        self.id = if id.is_null() { None } else { Some(id) };
    }

    /// String identifiers are trimmed; an empty string clears the identifier.
    pub fn set_id_str(&mut self, id: &str) {
        let id = id.trim();
        self.id = if id.is_empty() {
            None
        } else {
            Some(Value::String(id.to_string()))
        };
    }

    /// The table this event will be written to in the target ledger.
    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    pub fn set_table_name(&mut self, table_name: &str) {
        let table_name = table_name.trim();
        self.table_name = if table_name.is_empty() {
            None
        } else {
            Some(table_name.to_string())
        };
    }

    pub fn operation(&self) -> Option<Operation> {
        self.operation
    }

    pub fn set_operation(&mut self, operation: Operation) {
        self.operation = Some(operation);
    }

    /// The new document revision to load.  Absent for deletes.
    pub fn revision(&self) -> Option<&Map<String, Value>> {
        self.revision.as_ref()
    }

    pub fn set_revision(&mut self, revision: Map<String, Value>) {
        self.revision = Some(revision);
    }

    /// The revision number of the document contained in this event, used to
    /// keep revisions applied in order.  `None` means unknown.
    pub fn version(&self) -> Option<i64> {
        self.version
    }

    /// Negative versions are the "unknown" sentinel and clear the field.
    pub fn set_version(&mut self, version: i64) {
        self.version = (version >= 0).then_some(version);
    }

    /// Grouping/sharding value for FIFO delivery channels.
    pub fn grouping_value(&self) -> Option<&str> {
        self.grouping_value.as_deref()
    }

    pub fn set_grouping_value(&mut self, grouping_value: &str) {
        self.grouping_value = Some(grouping_value.to_string());
    }

    /// True when the event is complete enough to apply: operation and table
    /// are set, and inserts/updates carry a revision.
    pub fn is_valid(&self) -> bool {
        let Some(operation) = self.operation else {
            return false;
        };
        if self.table_name.is_none() {
            return false;
        }
        self.revision.is_some()
            || !matches!(operation, Operation::Insert | Operation::Update)
    }

    /// Emits the wire form, containing exactly the fields that are set.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        if let Some(operation) = self.operation {
            object.insert("op".to_string(), Value::String(operation.name().to_string()));
        }
        if let Some(id) = &self.id {
            object.insert("id".to_string(), id.clone());
        }
        if let Some(table_name) = &self.table_name {
            object.insert("table".to_string(), Value::String(table_name.clone()));
        }
        if let Some(revision) = &self.revision {
            object.insert("data".to_string(), Value::Object(revision.clone()));
        }
        if let Some(version) = self.version {
            object.insert("version".to_string(), Value::from(version));
        }
        if let Some(grouping_value) = &self.grouping_value {
            object.insert("group".to_string(), Value::String(grouping_value.clone()));
        }
        Value::Object(object)
    }

    /// An ID that uniquely identifies this event for de-duplication purposes:
    /// the base64-encoded SHA-256 hash of the event's canonical serialization.
    pub fn deduplication_id(&self) -> String {
        hash::hash_value(&self.to_json())
    }

    /// Builds a load event from a parsed wire payload.  Unknown fields are
    /// ignored; mistyped fields are treated as absent.  A null, non-object,
    /// or empty payload yields no event.
    pub fn from_json(value: &Value) -> Option<LoadEvent> {
        let object = value.as_object()?;
        if object.is_empty() {
            return None;
        }

        let mut event = LoadEvent::new();

        if let Some(id) = object.get("id") {
            event.set_id(id.clone());
        }
        if let Some(Value::Object(data)) = object.get("data") {
            event.set_revision(data.clone());
        }
        if let Some(Value::String(table_name)) = object.get("table") {
            event.set_table_name(table_name);
        }
        if let Some(Value::String(op)) = object.get("op") {
            if let Some(operation) = Operation::parse(op) {
                event.set_operation(operation);
            }
        }
        if let Some(version) = object.get("version").and_then(Value::as_i64) {
            event.set_version(version);
        }
        if let Some(Value::String(grouping_value)) = object.get("group") {
            event.set_grouping_value(grouping_value);
        }

        Some(event)
    }

    /// Builds a load event from JSON text.  Unparsable or non-object text
    /// yields no event.
    pub fn from_text(text: &str) -> Option<LoadEvent> {
        let value: Value = serde_json::from_str(text).ok()?;
        LoadEvent::from_json(&value)
    }

    /// Builds a load event from the committed view of a ledger revision
    /// (a document with `metadata`, `data`, etc. fields), used when
    /// re-emitting captured history.  The operation is inferred: no `data`
    /// means the revision is a tombstone (DELETE), version 0 is the initial
    /// INSERT, anything else an UPDATE.
    pub fn from_committed_revision(revision: &Value, table_name: &str) -> Option<LoadEvent> {
        let revision = revision.as_object()?;
        if revision.is_empty() {
            return None;
        }

        let metadata = revision.get("metadata")?.as_object()?;
        let doc_id = metadata.get("id")?;
        let version = metadata.get("version")?.as_i64()?;
        let data = revision.get("data").and_then(Value::as_object);

        let operation = match data {
            None => Operation::Delete,
            Some(_) if version == 0 => Operation::Insert,
            Some(_) => Operation::Update,
        };

        let mut event = LoadEvent::new();
        event.set_operation(operation);
        event.set_id(doc_id.clone());
        event.set_table_name(table_name);
        event.set_version(version);
        if let Some(data) = data {
            event.set_revision(data.clone());
        }

        Some(event)
    }
}

impl fmt::Display for LoadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
