use std::sync::Arc;

use core_types::LoadEvent;
use log::{error, info, warn};
use revision_writer::RevisionWriter;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{log_result, ReceiverError, Result};

/// Batch delivered by a point-to-point queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueBatch {
    pub records: Vec<QueueRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub message_id: String,
    /// Load-event text, or a topic-delivery envelope wrapping one.
    pub body: String,
}

/// Per-item outcome: ids listed here are redelivered by the queue;
/// everything else is acknowledged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueBatchResponse {
    pub failures: Vec<String>,
}

/// Consumes load events from a point-to-point queue.  Failures are reported
/// per item so one bad record does not hold up the rest of the batch.
pub struct QueueEventReceiver {
    writer: Arc<dyn RevisionWriter>,
}

impl QueueEventReceiver {
    pub fn new(writer: Arc<dyn RevisionWriter>) -> Self {
        Self { writer }
    }

    pub fn handle(&self, batch: &QueueBatch) -> QueueBatchResponse {
        let mut failures = Vec::new();
        for record in &batch.records {
            if let Err(err) = self.process_record(record) {
                error!("error handling message {}: {err}", record.message_id);
                failures.push(record.message_id.clone());
            }
        }
        QueueBatchResponse { failures }
    }

    fn process_record(&self, record: &QueueRecord) -> Result<()> {
        let payload: Value = serde_json::from_str(&record.body)?;
        let Some(object) = payload.as_object() else {
            warn!("unexpected non-object value received in queue payload: {payload}");
            return Ok(());
        };

        // Did this event arrive through a pub/sub topic subscription?
        let event = if object.contains_key("TopicArn") {
            match object.get("Message").and_then(Value::as_str) {
                Some(message) => LoadEvent::from_text(message),
                None => {
                    info!("poorly formatted topic-originated event, skipping: {payload}");
                    return Ok(());
                }
            }
        } else {
            LoadEvent::from_json(&payload)
        };

        let Some(event) = event else {
            info!("queue record does not decode to a load event, skipping: {payload}");
            return Ok(());
        };

        let result = self.writer.write_event(&event)?;
        log_result(&result, &payload);
        if result.fail {
            return Err(ReceiverError::load_failure(&result));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{committed_version, fixture};
    use serde_json::json;

    fn record(message_id: &str, body: &str) -> QueueRecord {
        QueueRecord {
            message_id: message_id.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn applies_events_and_acknowledges_successes() {
        let (driver, writer) = fixture(true);
        let receiver = QueueEventReceiver::new(writer);

        let response = receiver.handle(&QueueBatch {
            records: vec![
                record(
                    "m1",
                    r#"{"op":"INSERT","table":"Person","id":"P1","version":0,"data":{"n":"A"}}"#,
                ),
                record(
                    "m2",
                    r#"{"op":"UPDATE","table":"Person","id":"P1","version":1,"data":{"n":"B"}}"#,
                ),
            ],
        });

        assert!(response.failures.is_empty());
        assert_eq!(committed_version(&driver, "Person", "P1"), Some(1));
    }

    #[test]
    fn unwraps_topic_delivery_envelopes() {
        let (driver, writer) = fixture(true);
        let receiver = QueueEventReceiver::new(writer);

        let wrapped = json!({
            "TopicArn": "some-topic",
            "Message": r#"{"op":"INSERT","table":"Person","id":"P2","version":0,"data":{"n":"A"}}"#
        });
        let response = receiver.handle(&QueueBatch {
            records: vec![record("m1", &wrapped.to_string())],
        });

        assert!(response.failures.is_empty());
        assert_eq!(committed_version(&driver, "Person", "P2"), Some(0));
    }

    #[test]
    fn failures_are_reported_per_item() {
        let (driver, writer) = fixture(true);
        let receiver = QueueEventReceiver::new(writer);

        let response = receiver.handle(&QueueBatch {
            records: vec![
                // Strict-mode update of a missing document fails.
                record("bad", r#"{"op":"UPDATE","table":"Person","id":"X","version":1,"data":{"n":"A"}}"#),
                record(
                    "good",
                    r#"{"op":"INSERT","table":"Person","id":"P3","version":0,"data":{"n":"A"}}"#,
                ),
            ],
        });

        assert_eq!(response.failures, vec!["bad"]);
        assert_eq!(committed_version(&driver, "Person", "P3"), Some(0));
    }

    #[test]
    fn undecodable_bodies_fail_their_item() {
        let (_, writer) = fixture(true);
        let receiver = QueueEventReceiver::new(writer);
        let response = receiver.handle(&QueueBatch {
            records: vec![record("m1", "not json at all")],
        });
        assert_eq!(response.failures, vec!["m1"]);
    }

    #[test]
    fn non_object_and_incomplete_payloads_are_skipped() {
        let (_, writer) = fixture(true);
        let receiver = QueueEventReceiver::new(writer);
        let response = receiver.handle(&QueueBatch {
            records: vec![
                record("m1", "[1, 2, 3]"),
                record("m2", r#"{"TopicArn": "t"}"#),
                record("m3", r#"{"table":"Person"}"#),
            ],
        });
        assert!(response.failures.is_empty());
    }
}
