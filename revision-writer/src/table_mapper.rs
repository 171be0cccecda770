use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use core_types::{LoadEvent, ValidationResult};
use ledger::{CommittedRevision, LedgerDriver, Transaction};
use log::warn;
use serde_json::{Map, Value};

use crate::base::BaseRevisionWriter;
use crate::writer::{active_table_check, RevisionWriter, Result, WriterError};

/// Wildcard entry applying to any table without its own mapping.
const WILDCARD_TABLE: &str = "*";

/// Revision writer that performs idempotence checks through a field of the
/// document data itself, selected per table by a mapping file.
///
/// The mapping file is a JSON object of table name to identity field:
///
/// ```json
/// { "Person": "GovId", "*": "id" }
/// ```
///
/// Unlike [`BaseRevisionWriter`], written revisions are left untouched; the
/// identity field is expected to already be part of the data.
pub struct TableMapperRevisionWriter {
    base: BaseRevisionWriter,
    mapping: HashMap<String, String>,
}

impl std::fmt::Debug for TableMapperRevisionWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableMapperRevisionWriter")
            .field("base", &self.base)
            .field("mapping", &self.mapping)
            .finish()
    }
}

impl TableMapperRevisionWriter {
    pub fn builder() -> TableMapperRevisionWriterBuilder {
        TableMapperRevisionWriterBuilder::new()
    }

    fn id_field(&self, table: &str) -> Option<&str> {
        self.mapping
            .get(table)
            .or_else(|| self.mapping.get(WILDCARD_TABLE))
            .map(String::as_str)
    }
}

impl RevisionWriter for TableMapperRevisionWriter {
    fn driver(&self) -> &LedgerDriver {
        self.base.driver()
    }

    fn strict_mode(&self) -> bool {
        self.base.strict_mode()
    }

    fn active_tables(&self) -> &[String] {
        self.base.active_tables()
    }

    fn pre_validate(&self, event: &LoadEvent) -> ValidationResult {
        let table = event.table_name().unwrap_or_default();
        if self.id_field(table).is_none() {
            return ValidationResult::skip_with(format!(
                "no identity-field mapping for table {table}, skipping"
            ));
        }
        active_table_check(self.active_tables(), event)
    }

    fn read_current_revision(
        &self,
        txn: &mut Transaction,
        event: &LoadEvent,
    ) -> ledger::Result<Option<CommittedRevision>> {
        let (Some(table), Some(id)) = (event.table_name(), event.id()) else {
            return Ok(None);
        };
        let Some(id_field) = self.id_field(table) else {
            warn!("no identity-field mapping for table {table}, skipping event {event}");
            return Ok(None);
        };
        txn.find_by_field(table, id_field, id)
    }

    /// The identity lives in the data itself; nothing to stamp.
    fn adjust_revision(
        &self,
        event: &LoadEvent,
        _current: Option<&CommittedRevision>,
    ) -> Option<Map<String, Value>> {
        event.revision().cloned()
    }
}

pub struct TableMapperRevisionWriterBuilder {
    driver: Option<Arc<LedgerDriver>>,
    strict_mode: bool,
    table_map_file: PathBuf,
}

impl TableMapperRevisionWriterBuilder {
    fn new() -> Self {
        Self {
            driver: None,
            strict_mode: true,
            table_map_file: PathBuf::from("table-map.json"),
        }
    }

    pub fn driver(mut self, driver: Arc<LedgerDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn strict_mode(mut self, strict_mode: bool) -> Self {
        self.strict_mode = strict_mode;
        self
    }

    pub fn table_map_file(mut self, path: impl AsRef<Path>) -> Self {
        self.table_map_file = path.as_ref().to_path_buf();
        self
    }

    /// Loads the table map and finishes the writer.  A missing or malformed
    /// map file is fatal.
    pub fn build(self) -> Result<TableMapperRevisionWriter> {
        let driver = self.driver.ok_or_else(|| WriterError::Builder {
            message: "ledger driver required".to_string(),
        })?;

        let bytes = fs::read(&self.table_map_file).map_err(|source| WriterError::TableMapRead {
            path: self.table_map_file.clone(),
            source,
        })?;
        let mapping: HashMap<String, String> =
            serde_json::from_slice(&bytes).map_err(|source| WriterError::TableMapParse {
                path: self.table_map_file.clone(),
                source,
            })?;

        let base = BaseRevisionWriter::builder()
            .driver(driver)
            .strict_mode(self.strict_mode)
            .build()?;
        Ok(TableMapperRevisionWriter { base, mapping })
    }
}
