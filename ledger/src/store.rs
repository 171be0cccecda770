use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use core_types::hash;
use serde_json::{Map, Value};

use crate::error::{LedgerError, Result};

/// Tables keep their catalog entry after deactivation; only ACTIVE tables
/// accept reads and writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableStatus {
    Active,
    Inactive,
}

/// Ledger-assigned identity of a committed revision.
#[derive(Clone, Debug, PartialEq)]
pub struct RevisionMetadata {
    /// Document id, stable across all revisions of one document.
    pub id: String,
    /// Starts at 0 and increases by exactly 1 per mutation.
    pub version: i64,
    pub tx_id: String,
    pub tx_time: DateTime<Utc>,
}

/// Committed view of one document revision.  `data` is absent when the
/// revision is a tombstone left by a delete.
#[derive(Clone, Debug, PartialEq)]
pub struct CommittedRevision {
    pub metadata: RevisionMetadata,
    pub data: Option<Map<String, Value>>,
    /// Content hash of `data`; absent for tombstones.
    pub data_hash: Option<String>,
}

impl CommittedRevision {
    /// Renders the committed view as a document with `metadata` and `data`
    /// fields, the shape consumed when re-emitting captured history.
    pub fn to_json(&self) -> Value {
        let mut metadata = Map::new();
        metadata.insert("id".to_string(), Value::String(self.metadata.id.clone()));
        metadata.insert("version".to_string(), Value::from(self.metadata.version));
        metadata.insert("txId".to_string(), Value::String(self.metadata.tx_id.clone()));
        metadata.insert(
            "txTime".to_string(),
            Value::String(self.metadata.tx_time.to_rfc3339()),
        );

        let mut object = Map::new();
        object.insert("metadata".to_string(), Value::Object(metadata));
        if let Some(data) = &self.data {
            object.insert("data".to_string(), Value::Object(data.clone()));
        }
        if let Some(data_hash) = &self.data_hash {
            object.insert("hash".to_string(), Value::String(data_hash.clone()));
        }
        Value::Object(object)
    }
}

/// Commit stamp shared by every mutation of one transaction.
#[derive(Clone, Debug)]
pub struct TxStamp {
    pub tx_id: String,
    pub tx_time: DateTime<Utc>,
}

#[derive(Clone, Debug, Default)]
struct Document {
    revisions: Vec<CommittedRevision>,
}

impl Document {
    fn latest(&self) -> Option<&CommittedRevision> {
        self.revisions.last()
    }
}

#[derive(Clone, Debug)]
struct Table {
    status: TableStatus,
    documents: BTreeMap<String, Document>,
}

/// Append-only document store: named tables of per-document revision
/// chains.  All access goes through [`crate::Transaction`]; the store itself
/// is a plain value so transactions can snapshot it wholesale.
#[derive(Clone, Debug)]
pub struct LedgerStore {
    name: String,
    commit_seq: u64,
    doc_counter: u64,
    tables: BTreeMap<String, Table>,
}

impl LedgerStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            commit_seq: 0,
            doc_counter: 0,
            tables: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commit_seq(&self) -> u64 {
        self.commit_seq
    }

    pub(crate) fn bump_commit_seq(&mut self) {
        self.commit_seq += 1;
    }

    /// Registers a table, ACTIVE.  Creating an existing table reactivates it.
    pub fn create_table(&mut self, table: &str) {
        self.tables
            .entry(table.to_string())
            .and_modify(|entry| entry.status = TableStatus::Active)
            .or_insert_with(|| Table {
                status: TableStatus::Active,
                documents: BTreeMap::new(),
            });
    }

    pub fn set_table_status(&mut self, table: &str, status: TableStatus) -> Result<()> {
        let entry = self.tables.get_mut(table).ok_or_else(|| LedgerError::NoSuchTable {
            table: table.to_string(),
        })?;
        entry.status = status;
        Ok(())
    }

    /// Names of the tables currently marked ACTIVE in the catalog.
    pub fn active_tables(&self) -> Vec<String> {
        self.tables
            .iter()
            .filter(|(_, table)| table.status == TableStatus::Active)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn table(&self, table: &str) -> Result<&Table> {
        self.tables.get(table).ok_or_else(|| LedgerError::NoSuchTable {
            table: table.to_string(),
        })
    }

    fn active_table_mut(&mut self, table: &str) -> Result<&mut Table> {
        let entry = self.tables.get_mut(table).ok_or_else(|| LedgerError::NoSuchTable {
            table: table.to_string(),
        })?;
        if entry.status != TableStatus::Active {
            return Err(LedgerError::InactiveTable {
                table: table.to_string(),
            });
        }
        Ok(entry)
    }

    /// Committed-view lookup: the latest revision in `table` whose data
    /// field `field` equals `value`.  Tombstoned documents never match.
    pub fn find_by_field(
        &self,
        table: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<CommittedRevision>> {
        let table = self.table(table)?;
        for document in table.documents.values() {
            let Some(latest) = document.latest() else {
                continue;
            };
            let Some(data) = &latest.data else {
                continue;
            };
            if data.get(field) == Some(value) {
                return Ok(Some(latest.clone()));
            }
        }
        Ok(None)
    }

    /// Inserts `data` as a new document and returns its assigned id.
    pub fn insert(&mut self, table: &str, stamp: &TxStamp, data: Map<String, Value>) -> Result<String> {
        self.doc_counter += 1;
        let doc_id = hash::sequence_uid("document", &format!("{}/{table}", self.name), self.doc_counter);
        let revision = CommittedRevision {
            metadata: RevisionMetadata {
                id: doc_id.clone(),
                version: 0,
                tx_id: stamp.tx_id.clone(),
                tx_time: stamp.tx_time,
            },
            data_hash: Some(hash::hash_value(&Value::Object(data.clone()))),
            data: Some(data),
        };
        let entry = self.active_table_mut(table)?;
        entry
            .documents
            .insert(doc_id.clone(), Document { revisions: vec![revision] });
        Ok(doc_id)
    }

    /// Replaces the document identified by `doc_id` with `data`, advancing
    /// its version by one.
    pub fn update(
        &mut self,
        table: &str,
        stamp: &TxStamp,
        doc_id: &str,
        data: Map<String, Value>,
    ) -> Result<()> {
        let entry = self.active_table_mut(table)?;
        let document = entry.documents.get_mut(doc_id).ok_or_else(|| {
            LedgerError::NoSuchDocument {
                table: table.to_string(),
                doc_id: doc_id.to_string(),
            }
        })?;
        let version = document.latest().map(|rev| rev.metadata.version + 1).unwrap_or(0);
        document.revisions.push(CommittedRevision {
            metadata: RevisionMetadata {
                id: doc_id.to_string(),
                version,
                tx_id: stamp.tx_id.clone(),
                tx_time: stamp.tx_time,
            },
            data_hash: Some(hash::hash_value(&Value::Object(data.clone()))),
            data: Some(data),
        });
        Ok(())
    }

    /// Appends a tombstone revision for `doc_id`, removing the document
    /// from the committed view.
    pub fn delete(&mut self, table: &str, stamp: &TxStamp, doc_id: &str) -> Result<()> {
        let entry = self.active_table_mut(table)?;
        let document = entry.documents.get_mut(doc_id).ok_or_else(|| {
            LedgerError::NoSuchDocument {
                table: table.to_string(),
                doc_id: doc_id.to_string(),
            }
        })?;
        let version = document.latest().map(|rev| rev.metadata.version + 1).unwrap_or(0);
        document.revisions.push(CommittedRevision {
            metadata: RevisionMetadata {
                id: doc_id.to_string(),
                version,
                tx_id: stamp.tx_id.clone(),
                tx_time: stamp.tx_time,
            },
            data_hash: None,
            data: None,
        });
        Ok(())
    }

    /// Full revision chain of one document, oldest first.
    pub fn history(&self, table: &str, doc_id: &str) -> Result<Vec<CommittedRevision>> {
        let table = self.table(table)?;
        Ok(table
            .documents
            .get(doc_id)
            .map(|document| document.revisions.clone())
            .unwrap_or_default())
    }
}
