use std::sync::Arc;

use core_types::LoadEvent;
use log::{info, warn};
use revision_writer::RevisionWriter;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{log_result, ReceiverError, Result};

/// Batch delivered by a pub/sub topic subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicBatch {
    pub records: Vec<TopicRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRecord {
    pub message: String,
}

/// Consumes load events from a pub/sub topic.  The channel has no per-item
/// acknowledgement, so the first failed load raises and the channel retries
/// the whole delivery (and eventually dead-letters it).
pub struct TopicEventReceiver {
    writer: Arc<dyn RevisionWriter>,
}

impl TopicEventReceiver {
    pub fn new(writer: Arc<dyn RevisionWriter>) -> Self {
        Self { writer }
    }

    pub fn handle(&self, batch: &TopicBatch) -> Result<()> {
        for record in &batch.records {
            let payload: Value = serde_json::from_str(&record.message)?;
            if !payload.is_object() {
                warn!("unexpected non-object value received in topic payload: {payload}");
                continue;
            }

            let Some(event) = LoadEvent::from_json(&payload) else {
                info!("topic record does not decode to a load event, skipping: {payload}");
                continue;
            };

            let result = self.writer.write_event(&event)?;
            log_result(&result, &payload);
            if result.fail {
                return Err(ReceiverError::load_failure(&result));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{committed_version, fixture};

    fn batch(messages: &[&str]) -> TopicBatch {
        TopicBatch {
            records: messages
                .iter()
                .map(|message| TopicRecord {
                    message: message.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn applies_each_record() {
        let (driver, writer) = fixture(true);
        let receiver = TopicEventReceiver::new(writer);

        receiver
            .handle(&batch(&[
                r#"{"op":"INSERT","table":"Person","id":"P1","version":0,"data":{"n":"A"}}"#,
                r#"{"op":"UPDATE","table":"Person","id":"P1","version":1,"data":{"n":"B"}}"#,
            ]))
            .unwrap();

        assert_eq!(committed_version(&driver, "Person", "P1"), Some(1));
    }

    #[test]
    fn raises_on_the_first_failure() {
        let (driver, writer) = fixture(true);
        let receiver = TopicEventReceiver::new(writer);

        let err = receiver
            .handle(&batch(&[
                r#"{"op":"DELETE","table":"Person","id":"missing","version":1}"#,
                r#"{"op":"INSERT","table":"Person","id":"P1","version":0,"data":{"n":"A"}}"#,
            ]))
            .unwrap_err();

        assert!(matches!(err, ReceiverError::LoadFailure { .. }));
        // The insert after the failing record was never attempted.
        assert_eq!(committed_version(&driver, "Person", "P1"), None);
    }

    #[test]
    fn skips_are_not_failures() {
        let (_, writer) = fixture(false);
        let receiver = TopicEventReceiver::new(writer);
        receiver
            .handle(&batch(&[r#"{"op":"DELETE","table":"Person","id":"missing"}"#]))
            .unwrap();
    }
}
