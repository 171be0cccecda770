use std::sync::Arc;

use core_types::LoadEvent;
use ledger::{CommittedRevision, LedgerDriver, Transaction};

use crate::writer::{RevisionWriter, Result, WriterError};

/// Field stamped on written revisions to record the source identity of the
/// record, assuming the event id is a document id from another ledger.
pub const BACK_LINK_FIELD: &str = "oldDocumentId";

/// Revision writer that tracks source identities through a back-link field
/// in the written data.
///
/// Lookups read the committed view of the event's table where
/// `oldDocumentId` equals the event id, and every written revision has the
/// back-link stamped so later events for the same record find it again.
pub struct BaseRevisionWriter {
    driver: Arc<LedgerDriver>,
    strict_mode: bool,
    active_tables: Vec<String>,
}

impl std::fmt::Debug for BaseRevisionWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseRevisionWriter")
            .field("strict_mode", &self.strict_mode)
            .field("active_tables", &self.active_tables)
            .finish()
    }
}

impl BaseRevisionWriter {
    pub fn builder() -> BaseRevisionWriterBuilder {
        BaseRevisionWriterBuilder::new()
    }
}

impl RevisionWriter for BaseRevisionWriter {
    fn driver(&self) -> &LedgerDriver {
        &self.driver
    }

    fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    fn active_tables(&self) -> &[String] {
        &self.active_tables
    }

    fn read_current_revision(
        &self,
        txn: &mut Transaction,
        event: &LoadEvent,
    ) -> ledger::Result<Option<CommittedRevision>> {
        let (Some(table), Some(id)) = (event.table_name(), event.id()) else {
            return Ok(None);
        };
        txn.find_by_field(table, BACK_LINK_FIELD, id)
    }
}

pub struct BaseRevisionWriterBuilder {
    driver: Option<Arc<LedgerDriver>>,
    strict_mode: bool,
}

impl BaseRevisionWriterBuilder {
    fn new() -> Self {
        Self {
            driver: None,
            strict_mode: true,
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

    /// Captures the active-table snapshot and finishes the writer.
    pub fn build(self) -> Result<BaseRevisionWriter> {
        let driver = self.driver.ok_or_else(|| WriterError::Builder {
            message: "ledger driver required".to_string(),
        })?;
        let active_tables = driver.active_tables()?;
        Ok(BaseRevisionWriter {
            driver,
            strict_mode: self.strict_mode,
            active_tables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::{DriverConfig, LedgerError};
    use serde_json::json;

    fn fixture(strict_mode: bool) -> (Arc<LedgerDriver>, BaseRevisionWriter) {
        let driver = Arc::new(
            LedgerDriver::new(DriverConfig::new("test-ledger").with_tables(&["Person"])).unwrap(),
        );
        let writer = BaseRevisionWriter::builder()
            .driver(Arc::clone(&driver))
            .strict_mode(strict_mode)
            .build()
            .unwrap();
        (driver, writer)
    }

    fn event(text: &str) -> LoadEvent {
        LoadEvent::from_text(text).unwrap()
    }

    fn committed_by_link(
        driver: &LedgerDriver,
        table: &str,
        id: &str,
    ) -> Option<CommittedRevision> {
        driver
            .execute::<_, LedgerError, _>(|txn| txn.find_by_field(table, BACK_LINK_FIELD, &json!(id)))
            .unwrap()
    }

    #[test]
    fn strict_mode_is_the_default() {
        let (driver, _) = fixture(true);
        let writer = BaseRevisionWriter::builder().driver(driver).build().unwrap();
        assert!(writer.strict_mode());
    }

    #[test]
    fn builder_requires_a_driver() {
        assert!(matches!(
            BaseRevisionWriter::builder().build().unwrap_err(),
            WriterError::Builder { .. }
        ));
    }

    #[test]
    fn insert_then_duplicate_insert_skips() {
        let (driver, writer) = fixture(true);
        let e = event(r#"{"op":"INSERT","table":"Person","id":"P1","version":0,"data":{"n":"A"}}"#);

        let first = writer.write_event(&e).unwrap();
        assert!(first.is_pass());

        let second = writer.write_event(&e).unwrap();
        assert!(second.skip);

        let current = committed_by_link(&driver, "Person", "P1").unwrap();
        assert_eq!(current.metadata.version, 0);
        assert_eq!(current.data.unwrap().get("n"), Some(&json!("A")));
    }

    #[test]
    fn in_order_update_advances_the_version() {
        let (driver, writer) = fixture(true);
        writer
            .write_event(&event(
                r#"{"op":"INSERT","table":"Person","id":"P1","version":0,"data":{"n":"A"}}"#,
            ))
            .unwrap();

        let result = writer
            .write_event(&event(
                r#"{"op":"UPDATE","table":"Person","id":"P1","version":1,"data":{"n":"B"}}"#,
            ))
            .unwrap();
        assert!(result.is_pass());

        let current = committed_by_link(&driver, "Person", "P1").unwrap();
        assert_eq!(current.metadata.version, 1);
        assert_eq!(current.data.unwrap().get("n"), Some(&json!("B")));

        let history = driver
            .execute::<_, LedgerError, _>(|txn| txn.history("Person", &current.metadata.id))
            .unwrap();
        let versions: Vec<i64> = history.iter().map(|rev| rev.metadata.version).collect();
        assert_eq!(versions, vec![0, 1]);
    }

    #[test]
    fn version_gap_fails_without_mutating() {
        let (driver, writer) = fixture(true);
        writer
            .write_event(&event(
                r#"{"op":"INSERT","table":"Person","id":"P1","version":0,"data":{"n":"A"}}"#,
            ))
            .unwrap();

        let result = writer
            .write_event(&event(
                r#"{"op":"UPDATE","table":"Person","id":"P1","version":3,"data":{"n":"C"}}"#,
            ))
            .unwrap();
        assert!(result.fail);
        assert!(result.message.as_deref().unwrap().contains("out of order"));

        let current = committed_by_link(&driver, "Person", "P1").unwrap();
        assert_eq!(current.metadata.version, 0);
        assert_eq!(current.data.unwrap().get("n"), Some(&json!("A")));
    }

    #[test]
    fn stale_update_skips() {
        let (_, writer) = fixture(true);
        writer
            .write_event(&event(
                r#"{"op":"INSERT","table":"Person","id":"P1","version":0,"data":{"n":"A"}}"#,
            ))
            .unwrap();

        let result = writer
            .write_event(&event(
                r#"{"op":"UPDATE","table":"Person","id":"P1","version":0,"data":{"n":"Z"}}"#,
            ))
            .unwrap();
        assert!(result.skip);
    }

    #[test]
    fn update_without_version_passes() {
        let (driver, writer) = fixture(true);
        writer
            .write_event(&event(
                r#"{"op":"INSERT","table":"Person","id":"P1","version":0,"data":{"n":"A"}}"#,
            ))
            .unwrap();

        let result = writer
            .write_event(&event(r#"{"op":"UPDATE","table":"Person","id":"P1","data":{"n":"B"}}"#))
            .unwrap();
        assert!(result.is_pass());
        let current = committed_by_link(&driver, "Person", "P1").unwrap();
        assert_eq!(current.metadata.version, 1);
    }

    #[test]
    fn delete_of_missing_document_respects_strict_mode() {
        let (_, strict) = fixture(true);
        let result = strict
            .write_event(&event(r#"{"op":"DELETE","table":"Person","id":"X"}"#))
            .unwrap();
        assert!(result.fail);
        assert!(result.message.is_some());

        let (_, relaxed) = fixture(false);
        let result = relaxed
            .write_event(&event(r#"{"op":"DELETE","table":"Person","id":"X"}"#))
            .unwrap();
        assert!(result.skip);
        assert!(result.message.is_some());
    }

    #[test]
    fn update_of_missing_document_respects_strict_mode() {
        let (_, strict) = fixture(true);
        let result = strict
            .write_event(&event(r#"{"op":"UPDATE","table":"Person","id":"X","data":{"n":"A"}}"#))
            .unwrap();
        assert!(result.fail);

        let (_, relaxed) = fixture(false);
        let result = relaxed
            .write_event(&event(r#"{"op":"UPDATE","table":"Person","id":"X","data":{"n":"A"}}"#))
            .unwrap();
        assert!(result.skip);
    }

    #[test]
    fn delete_removes_the_document_from_the_committed_view() {
        let (driver, writer) = fixture(true);
        writer
            .write_event(&event(
                r#"{"op":"INSERT","table":"Person","id":"P1","version":0,"data":{"n":"A"}}"#,
            ))
            .unwrap();
        let result = writer
            .write_event(&event(r#"{"op":"DELETE","table":"Person","id":"P1","version":1}"#))
            .unwrap();
        assert!(result.is_pass());
        assert!(committed_by_link(&driver, "Person", "P1").is_none());
    }

    #[test]
    fn any_resolves_to_insert_then_skip_then_update() {
        let (driver, writer) = fixture(true);
        let e = event(r#"{"op":"ANY","table":"Person","id":"P2","data":{"n":"Q"}}"#);

        let first = writer.write_event(&e).unwrap();
        assert!(first.is_pass());
        let current = committed_by_link(&driver, "Person", "P2").unwrap();
        assert_eq!(current.metadata.version, 0);

        let second = writer.write_event(&e).unwrap();
        assert!(second.skip);

        let third = writer
            .write_event(&event(
                r#"{"op":"ANY","table":"Person","id":"P2","version":1,"data":{"n":"R"}}"#,
            ))
            .unwrap();
        assert!(third.is_pass());
        let current = committed_by_link(&driver, "Person", "P2").unwrap();
        assert_eq!(current.metadata.version, 1);
        assert_eq!(current.data.unwrap().get("n"), Some(&json!("R")));
    }

    #[test]
    fn any_with_version_deletes_when_revision_is_absent() {
        let (driver, writer) = fixture(true);
        writer
            .write_event(&event(
                r#"{"op":"ANY","table":"Person","id":"P3","data":{"n":"Q"}}"#,
            ))
            .unwrap();

        let result = writer
            .write_event(&event(r#"{"op":"ANY","table":"Person","id":"P3","version":1}"#))
            .unwrap();
        assert!(result.is_pass());
        assert!(committed_by_link(&driver, "Person", "P3").is_none());
    }

    #[test]
    fn any_with_nothing_to_apply_skips() {
        let (_, writer) = fixture(true);
        let result = writer
            .write_event(&event(r#"{"op":"ANY","table":"Person","id":"P4"}"#))
            .unwrap();
        assert!(result.skip);
    }

    #[test]
    fn written_revisions_carry_the_back_link() {
        let (driver, writer) = fixture(true);
        writer
            .write_event(&event(
                r#"{"op":"INSERT","table":"Person","id":"P1","version":0,"data":{"n":"A"}}"#,
            ))
            .unwrap();

        let current = committed_by_link(&driver, "Person", "P1").unwrap();
        assert_eq!(current.data.unwrap().get(BACK_LINK_FIELD), Some(&json!("P1")));
    }

    #[test]
    fn inactive_tables_are_skipped_before_the_transaction() {
        let (_, writer) = fixture(true);
        let result = writer
            .write_event(&event(
                r#"{"op":"INSERT","table":"Vehicle","id":"V1","version":0,"data":{"n":"A"}}"#,
            ))
            .unwrap();
        assert!(result.skip);
        assert!(result.message.as_deref().unwrap().contains("not an active table"));
    }

    #[test]
    fn incomplete_events_are_skipped() {
        let (_, writer) = fixture(true);
        let result = writer
            .write_event(&event(r#"{"table":"Person","id":"P1"}"#))
            .unwrap();
        assert!(result.skip);
    }

    #[test]
    fn batch_applies_atomically() {
        let (driver, writer) = fixture(true);
        let events = vec![
            event(r#"{"op":"INSERT","table":"Person","id":"B1","version":0,"data":{"n":"A"}}"#),
            event(r#"{"op":"UPDATE","table":"Person","id":"B1","version":1,"data":{"n":"B"}}"#),
        ];
        writer.write_events(&events).unwrap();

        let current = committed_by_link(&driver, "Person", "B1").unwrap();
        assert_eq!(current.metadata.version, 1);
        assert_eq!(current.data.unwrap().get("n"), Some(&json!("B")));
    }

    #[test]
    fn batch_failure_leaves_the_ledger_untouched() {
        let (driver, writer) = fixture(true);
        let events = vec![
            event(r#"{"op":"INSERT","table":"Person","id":"B1","version":0,"data":{"n":"A"}}"#),
            // Version gap: fails validation and aborts the batch.
            event(r#"{"op":"UPDATE","table":"Person","id":"B1","version":5,"data":{"n":"B"}}"#),
        ];
        let err = writer.write_events(&events).unwrap_err();
        assert!(matches!(err, WriterError::BatchAborted { .. }));
        assert!(committed_by_link(&driver, "Person", "B1").is_none());
    }

    #[test]
    fn batch_drops_invalid_and_inactive_events_quietly() {
        let (driver, writer) = fixture(true);
        let events = vec![
            event(r#"{"table":"Person","id":"nope"}"#),
            event(r#"{"op":"INSERT","table":"Vehicle","id":"V1","version":0,"data":{"n":"A"}}"#),
            event(r#"{"op":"INSERT","table":"Person","id":"B2","version":0,"data":{"n":"A"}}"#),
        ];
        writer.write_events(&events).unwrap();
        assert!(committed_by_link(&driver, "Person", "B2").is_some());
    }
}
