use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use core_types::{AppConfig, LoadEvent, Operation};
use event_map::{LoadEventMapper, MapError};
use log::warn;
use revision_writer::RevisionWriter;
use serde::{Deserialize, Serialize};
use serde_json::{Deserializer, Map, Value};

use crate::{log_result, ReceiverError, Result};

/// Batch of change-data-capture records from a partitioned log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdcBatch {
    pub records: Vec<CdcRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdcRecord {
    /// Base64-encoded payload of one or more concatenated CDC documents.
    pub data: String,
}

/// Consumes change-data-capture events describing changes in a foreign
/// database and replays them into the ledger, translating table and field
/// names through the configured [`LoadEventMapper`].  Control records and
/// records the mapping does not cover are skipped; the first failed load
/// raises.
pub struct CdcEventReceiver {
    writer: Arc<dyn RevisionWriter>,
    mapper: Arc<dyn LoadEventMapper>,
    before_image_field: String,
}

impl CdcEventReceiver {
    pub fn new(
        writer: Arc<dyn RevisionWriter>,
        mapper: Arc<dyn LoadEventMapper>,
        before_image_field: &str,
    ) -> Self {
        Self {
            writer,
            mapper,
            before_image_field: before_image_field.to_string(),
        }
    }

    /// Builds the receiver with the mapper variant and before-image field
    /// named in process configuration.
    pub fn from_config(
        config: &AppConfig,
        writer: Arc<dyn RevisionWriter>,
    ) -> std::result::Result<Self, MapError> {
        Ok(Self::new(
            writer,
            event_map::build_from_config(config)?,
            &config.before_image_field_name,
        ))
    }

    pub fn handle(&self, batch: &CdcBatch) -> Result<()> {
        for record in &batch.records {
            let bytes = STANDARD.decode(&record.data)?;
            for payload in Deserializer::from_slice(&bytes).into_iter::<Value>() {
                let payload = payload?;
                let Some(object) = payload.as_object() else {
                    warn!("unexpected non-object value received in CDC payload: {payload}");
                    continue;
                };
                if let Some(event) = self.decode_record(object, &payload) {
                    let result = self.writer.write_event(&event)?;
                    log_result(&result, &payload);
                    if result.fail {
                        return Err(ReceiverError::load_failure(&result));
                    }
                }
            }
        }
        Ok(())
    }

    fn decode_record(&self, record: &Map<String, Value>, payload: &Value) -> Option<LoadEvent> {
        let metadata = record.get("metadata").and_then(Value::as_object)?;
        let data = record.get("data").and_then(Value::as_object)?;

        // Control records describe the replication task, not data changes.
        if metadata.get("record-type").and_then(Value::as_str) != Some("data") {
            return None;
        }

        let op_string = metadata.get("operation").and_then(Value::as_str)?;
        let operation = match op_string {
            "load" | "insert" => Operation::Insert,
            "update" => Operation::Update,
            "delete" => Operation::Delete,
            other => {
                warn!("unexpected data operation \"{other}\", skipping: {payload}");
                return None;
            }
        };

        let Some(source_table) = metadata.get("table-name").and_then(Value::as_str) else {
            warn!("CDC record has no table name, skipping: {payload}");
            return None;
        };

        let before_image = record
            .get(&self.before_image_field)
            .and_then(Value::as_object);
        let Some(id) = self.mapper.map_primary_key(data, before_image, source_table) else {
            warn!("unable to determine primary key for record, skipping: {payload}");
            return None;
        };
        let Some(table_name) = self.mapper.map_table_name(source_table) else {
            warn!("no table mapping for {source_table}, skipping: {payload}");
            return None;
        };
        let revision = self.mapper.map_data_record(data, source_table)?;

        let mut event = LoadEvent::new();
        event.set_operation(operation);
        event.set_table_name(&table_name);
        event.set_id(id);
        event.set_revision(revision);
        if operation == Operation::Insert {
            event.set_version(0);
        }
        Some(event)
    }
}
