//! Per-channel dispatchers: decode a delivery-channel batch envelope into
//! canonical load events, route them through a revision writer, and report
//! failures the way the channel's retry contract expects.

pub mod bus;
pub mod cdc;
pub mod ledger_stream;
pub mod log_stream;
pub mod queue;
pub mod topic;

use core_types::ValidationResult;
use log::warn;
use revision_writer::WriterError;
use serde_json::Value;
use thiserror::Error;

pub use bus::BusEventReceiver;
pub use cdc::{CdcBatch, CdcEventReceiver, CdcRecord};
pub use ledger_stream::{LedgerStreamEventReceiver, StreamBatch, StreamRecord};
pub use log_stream::{LogBatch, LogRecord, LogStreamEventReceiver};
pub use queue::{QueueBatch, QueueBatchResponse, QueueEventReceiver, QueueRecord};
pub use topic::{TopicBatch, TopicEventReceiver, TopicRecord};

pub type Result<T> = std::result::Result<T, ReceiverError>;

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error(transparent)]
    Writer(#[from] WriterError),
    #[error("load failure: {message}")]
    LoadFailure { message: String },
    #[error("batch contained failures")]
    BatchFailed,
    #[error("invalid record payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("invalid record encoding: {0}")]
    Encoding(#[from] base64::DecodeError),
}

impl ReceiverError {
    /// Failure surfaced to the channel for a load that did not pass.
    pub(crate) fn load_failure(result: &ValidationResult) -> Self {
        ReceiverError::LoadFailure {
            message: result
                .message
                .clone()
                .unwrap_or_else(|| "event failed validation".to_string()),
        }
    }
}

/// Logs the diagnostic of a skip/fail result next to the payload it came
/// from, the way every channel reports them.
pub(crate) fn log_result(result: &ValidationResult, payload: &Value) {
    if let Some(message) = &result.message {
        warn!("{message}");
        warn!("{payload}");
    }
}
