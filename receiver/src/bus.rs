use std::sync::Arc;

use core_types::LoadEvent;
use log::{info, warn};
use revision_writer::RevisionWriter;
use serde_json::Value;

use crate::{log_result, ReceiverError, Result};

/// Consumes load events from an event bus.  Each delivery is a single
/// envelope whose `detail` field carries the event; any failed load raises
/// so the bus retries the delivery.
pub struct BusEventReceiver {
    writer: Arc<dyn RevisionWriter>,
}

impl BusEventReceiver {
    pub fn new(writer: Arc<dyn RevisionWriter>) -> Self {
        Self { writer }
    }

    pub fn handle(&self, envelope: &Value) -> Result<()> {
        let Some(object) = envelope.as_object() else {
            warn!("unexpected non-object value received in event-bus payload: {envelope}");
            return Ok(());
        };

        let Some(detail) = object.get("detail") else {
            return Ok(());
        };

        let Some(event) = LoadEvent::from_json(detail) else {
            info!("event-bus detail does not decode to a load event, skipping: {envelope}");
            return Ok(());
        };

        let result = self.writer.write_event(&event)?;
        log_result(&result, envelope);
        if result.fail {
            return Err(ReceiverError::load_failure(&result));
        }
        Ok(())
    }
}
