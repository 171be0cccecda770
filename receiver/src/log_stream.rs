use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use core_types::LoadEvent;
use log::{info, warn};
use revision_writer::RevisionWriter;
use serde::{Deserialize, Serialize};
use serde_json::{Deserializer, Value};

use crate::{log_result, ReceiverError, Result};

/// Batch delivered by a partitioned log, keyed by topic-partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogBatch {
    pub records: BTreeMap<String, Vec<LogRecord>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Base64-encoded payload carrying one or more concatenated load-event
    /// documents.
    pub value: String,
}

/// Consumes load events from a partitioned log.
///
/// Instead of erroring out on the first failed load, the whole batch is
/// processed and the failure raised at the end.  An event later in the
/// stream may fix the condition an earlier event failed on (out-of-order
/// delivery, for example); failing fast would turn that one event into a
/// logjam that stalls the partition.
pub struct LogStreamEventReceiver {
    writer: Arc<dyn RevisionWriter>,
}

impl LogStreamEventReceiver {
    pub fn new(writer: Arc<dyn RevisionWriter>) -> Self {
        Self { writer }
    }

    pub fn handle(&self, batch: &LogBatch) -> Result<()> {
        let mut fail_batch = false;

        for records in batch.records.values() {
            for record in records {
                let bytes = STANDARD.decode(&record.value)?;
                for payload in Deserializer::from_slice(&bytes).into_iter::<Value>() {
                    let payload = payload?;
                    if !payload.is_object() {
                        warn!("unexpected non-object value received in log payload: {payload}");
                        continue;
                    }

                    let Some(event) = LoadEvent::from_json(&payload) else {
                        info!("log record does not decode to a load event, skipping: {payload}");
                        continue;
                    };

                    let result = self.writer.write_event(&event)?;
                    log_result(&result, &payload);
                    fail_batch = fail_batch || result.fail;
                }
            }
        }

        if fail_batch {
            return Err(ReceiverError::BatchFailed);
        }
        Ok(())
    }
}
