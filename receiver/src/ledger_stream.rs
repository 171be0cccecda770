use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use core_types::LoadEvent;
use log::{info, warn};
use revision_writer::RevisionWriter;
use serde::{Deserialize, Serialize};
use serde_json::{Deserializer, Value};

use crate::{log_result, ReceiverError, Result};

/// Record type carrying a document revision; everything else in the stream
/// (block summaries, control records) is ignored.
const REVISION_DETAILS: &str = "REVISION_DETAILS";

/// Batch delivered by a ledger stream over a partitioned log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamBatch {
    pub records: Vec<StreamRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRecord {
    /// Base64-encoded payload.  Producers may client-aggregate several user
    /// records into one stream record.
    pub data: String,
}

/// Consumes revision details from a source-ledger stream and replays them
/// into the target ledger.  Events are derived straight from the committed
/// revisions; no mapping is applied, since ledger-to-ledger replication
/// preserves the schema.  Batch policy matches the partitioned log: process
/// everything, then raise if anything failed.
pub struct LedgerStreamEventReceiver {
    writer: Arc<dyn RevisionWriter>,
}

impl LedgerStreamEventReceiver {
    pub fn new(writer: Arc<dyn RevisionWriter>) -> Self {
        Self { writer }
    }

    pub fn handle(&self, batch: &StreamBatch) -> Result<()> {
        let mut fail_batch = false;

        for user_record in deaggregate(&batch.records)? {
            let Some(object) = user_record.as_object() else {
                warn!("unexpected non-object value received in stream payload: {user_record}");
                continue;
            };

            if object.get("recordType").and_then(Value::as_str) != Some(REVISION_DETAILS) {
                continue;
            }

            let Some(payload) = object.get("payload").and_then(Value::as_object) else {
                info!("revision record has no payload, skipping: {user_record}");
                continue;
            };
            let Some(table_name) = payload
                .get("tableInfo")
                .and_then(|info| info.get("tableName"))
                .and_then(Value::as_str)
            else {
                info!("revision record has no table info, skipping: {user_record}");
                continue;
            };
            let Some(revision) = payload.get("revision") else {
                info!("revision record has no revision, skipping: {user_record}");
                continue;
            };

            let Some(event) = LoadEvent::from_committed_revision(revision, table_name) else {
                info!("revision does not decode to a load event, skipping: {user_record}");
                continue;
            };

            let result = self.writer.write_event(&event)?;
            log_result(&result, &user_record);
            fail_batch = fail_batch || result.fail;
        }

        if fail_batch {
            return Err(ReceiverError::BatchFailed);
        }
        Ok(())
    }
}

/// Splits stream records into user records: each record's payload is
/// decoded and may carry several concatenated documents when the producer
/// aggregated them client-side.
fn deaggregate(records: &[StreamRecord]) -> Result<Vec<Value>> {
    let mut user_records = Vec::new();
    for record in records {
        let bytes = STANDARD.decode(&record.data)?;
        for value in Deserializer::from_slice(&bytes).into_iter::<Value>() {
            user_records.push(value?);
        }
    }
    Ok(user_records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{committed_version, fixture};
    use serde_json::json;

    fn revision_record(table: &str, revision: Value) -> Value {
        json!({
            "recordType": REVISION_DETAILS,
            "payload": {
                "tableInfo": {"tableName": table},
                "revision": revision
            }
        })
    }

    fn batch(user_records: &[Value]) -> StreamBatch {
        let data = user_records
            .iter()
            .map(|record| record.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        StreamBatch {
            records: vec![StreamRecord {
                data: STANDARD.encode(data),
            }],
        }
    }

    #[test]
    fn replays_insert_update_and_delete_revisions() {
        let (driver, writer) = fixture(true);
        let receiver = LedgerStreamEventReceiver::new(writer);

        receiver
            .handle(&batch(&[
                revision_record(
                    "Person",
                    json!({"metadata": {"id": "D1", "version": 0}, "data": {"n": "A"}}),
                ),
                revision_record(
                    "Person",
                    json!({"metadata": {"id": "D1", "version": 1}, "data": {"n": "B"}}),
                ),
            ]))
            .unwrap();
        assert_eq!(committed_version(&driver, "Person", "D1"), Some(1));

        // A revision with no data is a tombstone and deletes the document.
        receiver
            .handle(&batch(&[revision_record(
                "Person",
                json!({"metadata": {"id": "D1", "version": 2}}),
            )]))
            .unwrap();
        assert_eq!(committed_version(&driver, "Person", "D1"), None);
    }

    #[test]
    fn aggregated_records_are_split_into_user_records() {
        let (driver, writer) = fixture(true);
        let receiver = LedgerStreamEventReceiver::new(writer);

        // Two user records aggregated into a single stream record.
        receiver
            .handle(&batch(&[
                revision_record(
                    "Person",
                    json!({"metadata": {"id": "D2", "version": 0}, "data": {"n": "A"}}),
                ),
                revision_record(
                    "Person",
                    json!({"metadata": {"id": "D3", "version": 0}, "data": {"n": "B"}}),
                ),
            ]))
            .unwrap();

        assert_eq!(committed_version(&driver, "Person", "D2"), Some(0));
        assert_eq!(committed_version(&driver, "Person", "D3"), Some(0));
    }

    #[test]
    fn only_revision_details_records_are_processed() {
        let (driver, writer) = fixture(true);
        let receiver = LedgerStreamEventReceiver::new(writer);

        receiver
            .handle(&batch(&[
                json!({"recordType": "BLOCK_SUMMARY", "payload": {}}),
                json!({"recordType": "CONTROL", "payload": {}}),
                revision_record(
                    "Person",
                    json!({"metadata": {"id": "D4", "version": 0}, "data": {"n": "A"}}),
                ),
            ]))
            .unwrap();

        assert_eq!(committed_version(&driver, "Person", "D4"), Some(0));
    }

    #[test]
    fn processes_the_whole_batch_before_raising() {
        let (driver, writer) = fixture(true);
        let receiver = LedgerStreamEventReceiver::new(writer);

        let err = receiver
            .handle(&batch(&[
                // Version 3 against an empty table: out-of-order, fails.
                revision_record(
                    "Person",
                    json!({"metadata": {"id": "D5", "version": 3}, "data": {"n": "A"}}),
                ),
                revision_record(
                    "Person",
                    json!({"metadata": {"id": "D6", "version": 0}, "data": {"n": "B"}}),
                ),
            ]))
            .unwrap_err();

        assert!(matches!(err, ReceiverError::BatchFailed));
        assert_eq!(committed_version(&driver, "Person", "D6"), Some(0));
    }
}
