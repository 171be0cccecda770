use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("driver configuration invalid: {message}")]
    Config { message: String },
    #[error("no such table: {table}")]
    NoSuchTable { table: String },
    #[error("table {table} is not active")]
    InactiveTable { table: String },
    #[error("no such document {doc_id} in table {table}")]
    NoSuchDocument { table: String, doc_id: String },
    #[error("concurrent commit on ledger {ledger}: snapshot at seq {snapshot_seq}, store at seq {committed_seq}")]
    OccConflict {
        ledger: String,
        snapshot_seq: u64,
        committed_seq: u64,
    },
}
