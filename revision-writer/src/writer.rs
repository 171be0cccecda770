use std::path::PathBuf;

use core_types::{LoadEvent, Operation, ValidationResult};
use ledger::{CommittedRevision, LedgerDriver, LedgerError, Transaction};
use log::{info, warn};
use serde_json::{Map, Value};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WriterError>;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("writer misconfigured: {message}")]
    Builder { message: String },
    #[error("unable to read table map file {path}: {source}")]
    TableMapRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed table map file {path}: {source}")]
    TableMapParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("batch aborted: {message}")]
    BatchAborted { message: String },
}

/// Verifies and writes document revisions received through a loading
/// mechanism into the ledger.
///
/// The apply pipeline, the validation state machine, and the mutation
/// planning are provided methods shared by every implementation; concrete
/// writers supply the revision lookup strategy and may override
/// pre-validation and revision adjustment.
pub trait RevisionWriter: Send + Sync {
    fn driver(&self) -> &LedgerDriver;

    /// When true, missing preconditions fail so the channel retries; when
    /// false they are skipped so an interrupted load can re-play quietly.
    fn strict_mode(&self) -> bool;

    /// Tables marked ACTIVE in the target ledger, captured at construction.
    fn active_tables(&self) -> &[String];

    /// Reads the committed revision the event refers to, or `None` when the
    /// document does not exist.  The meaning of the event id (back-link or
    /// indexed document field) is the implementation's choice.
    fn read_current_revision(
        &self,
        txn: &mut Transaction,
        event: &LoadEvent,
    ) -> ledger::Result<Option<CommittedRevision>>;

    /// Checks the event before any ledger transaction is opened.
    fn pre_validate(&self, event: &LoadEvent) -> ValidationResult {
        active_table_check(self.active_tables(), event)
    }

    /// Decides pass/skip/fail for the event against the committed revision.
    fn validate(
        &self,
        event: &LoadEvent,
        current: Option<&CommittedRevision>,
    ) -> ValidationResult {
        let Some(operation) = event.operation() else {
            return ValidationResult::skip_with(format!("event has no operation: {event}"));
        };

        match (operation, current) {
            (Operation::Insert, Some(_)) => {
                let message = format!("record already exists for INSERT operation: {event}");
                info!("{message}");
                return ValidationResult::skip_with(message);
            }
            (Operation::Update, None) | (Operation::Delete, None) => {
                let message =
                    format!("revision does not exist to {}: {event}", operation.name());
                info!("{message}");
                return if self.strict_mode() {
                    ValidationResult::fail(message)
                } else {
                    ValidationResult::skip_with(message)
                };
            }
            (Operation::Any, None) if event.revision().is_none() => {
                return ValidationResult::skip_with(format!(
                    "nothing to apply for ANY with no revision: {event}"
                ));
            }
            (Operation::Any, Some(_)) if event.version().is_none() => {
                let message =
                    format!("record already exists for ANY with no version: {event}");
                info!("{message}");
                return ValidationResult::skip_with(message);
            }
            _ => {}
        }

        // Whatever the operation, revisions must land in order.  Processing
        // a delete while later updates for the document are still in flight
        // would lose them.
        if let (Some(version), Some(current)) = (event.version(), current) {
            let current_version = current.metadata.version;
            if version <= current_version {
                let message = format!(
                    "revision {version} is not greater than current version {current_version}: {event}"
                );
                info!("{message}");
                return ValidationResult::skip_with(message);
            }
            if version != current_version + 1 {
                return ValidationResult::fail(format!(
                    "out of order revision received, current version = {current_version}: {event}"
                ));
            }
        }

        ValidationResult::pass()
    }

    /// Produces the revision value to write, adjusted with whatever the
    /// strategy needs to find the document again later.  Events themselves
    /// are never mutated.
    fn adjust_revision(
        &self,
        event: &LoadEvent,
        _current: Option<&CommittedRevision>,
    ) -> Option<Map<String, Value>> {
        let mut revision = event.revision().cloned()?;
        if let Some(id) = event.id() {
            revision.insert(crate::base::BACK_LINK_FIELD.to_string(), id.clone());
        }
        Some(revision)
    }

    /// Emits exactly one ledger mutation for a validated event.
    fn write_document(
        &self,
        txn: &mut Transaction,
        event: &LoadEvent,
        revision: Option<Map<String, Value>>,
        current: Option<&CommittedRevision>,
    ) -> ledger::Result<()> {
        let Some(table) = event.table_name() else {
            return Ok(());
        };

        match event.operation() {
            Some(Operation::Insert) => {
                if let Some(revision) = revision {
                    txn.insert(table, revision)?;
                }
            }
            Some(Operation::Update) => {
                if let (Some(current), Some(revision)) = (current, revision) {
                    txn.update(table, &current.metadata.id, revision)?;
                }
            }
            Some(Operation::Delete) => {
                if let Some(current) = current {
                    txn.delete(table, &current.metadata.id)?;
                }
            }
            Some(Operation::Any) => match (current, revision) {
                (None, Some(revision)) => {
                    txn.insert(table, revision)?;
                }
                (Some(current), None) => {
                    txn.delete(table, &current.metadata.id)?;
                }
                (Some(current), Some(revision)) => {
                    txn.update(table, &current.metadata.id, revision)?;
                }
                (None, None) => {}
            },
            None => {}
        }
        Ok(())
    }

    /// Applies one event under its own ledger transaction.
    fn write_event(&self, event: &LoadEvent) -> Result<ValidationResult> {
        if !event.is_valid() {
            return Ok(ValidationResult::skip_with(
                "event is not complete enough to process, skipping",
            ));
        }

        let result = self.pre_validate(event);
        if !result.is_pass() {
            return Ok(result);
        }

        self.driver().execute(|txn| self.apply(txn, event))
    }

    /// Applies a batch atomically: all events commit in one transaction or
    /// none do.  Poorly-formed events and events that fail pre-validation
    /// are dropped with a warning before the transaction opens; any skip or
    /// fail inside the transaction aborts the whole batch.
    fn write_events(&self, events: &[LoadEvent]) -> Result<()> {
        let mut accepted = Vec::new();
        for event in events {
            if !event.is_valid() {
                warn!("ignoring invalid event: {event}");
                continue;
            }
            let result = self.pre_validate(event);
            if !result.is_pass() {
                warn!(
                    "event failed pre-validation ({}): {event}",
                    result.message.as_deref().unwrap_or("no diagnostic")
                );
                continue;
            }
            accepted.push(event);
        }

        if accepted.is_empty() {
            return Ok(());
        }

        self.driver().execute(|txn| {
            for event in &accepted {
                let result = self.apply(txn, event)?;
                if !result.is_pass() {
                    return Err(WriterError::BatchAborted {
                        message: result
                            .message
                            .unwrap_or_else(|| format!("event did not pass validation: {event}")),
                    });
                }
            }
            Ok(())
        })
    }

    /// One trip through the apply pipeline inside an open transaction.
    fn apply(&self, txn: &mut Transaction, event: &LoadEvent) -> Result<ValidationResult> {
        let current = self.read_current_revision(txn, event)?;
        let result = self.validate(event, current.as_ref());
        if result.is_pass() {
            let revision = self.adjust_revision(event, current.as_ref());
            self.write_document(txn, event, revision, current.as_ref())?;
        }
        Ok(result)
    }
}

/// Shared pre-validation: the event's table must be ACTIVE in the target
/// ledger.
pub(crate) fn active_table_check(active_tables: &[String], event: &LoadEvent) -> ValidationResult {
    let table = event.table_name().unwrap_or_default();
    if active_tables.iter().any(|active| active == table) {
        ValidationResult::pass()
    } else {
        ValidationResult::skip_with(format!("{table} is not an active table"))
    }
}
