use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use core_types::hash;
use log::warn;
use parking_lot::{Condvar, Mutex};
use serde_json::{Map, Value};

use crate::config::DriverConfig;
use crate::error::{LedgerError, Result};
use crate::store::{CommittedRevision, LedgerStore, TxStamp};

/// Transaction executor over the embedded store.
///
/// `execute` runs its closure against a fresh snapshot transaction and
/// retries the whole body when the commit loses an optimistic-concurrency
/// race, so the closure must not carry mutable state across invocations.
/// In-flight transactions are bounded by the configured session count.
pub struct LedgerDriver {
    config: DriverConfig,
    store: Arc<Mutex<LedgerStore>>,
    sessions: SessionGate,
    tx_counter: AtomicU64,
}

impl std::fmt::Debug for LedgerDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerDriver")
            .field("config", &self.config)
            .field("tx_counter", &self.tx_counter)
            .finish()
    }
}

impl LedgerDriver {
    pub fn new(config: DriverConfig) -> Result<Self> {
        if config.ledger_name.trim().is_empty() {
            return Err(LedgerError::Config {
                message: "ledger name must not be empty".to_string(),
            });
        }

        let mut store = LedgerStore::new(config.ledger_name.trim());
        for table in &config.tables {
            let table = table.trim();
            if !table.is_empty() {
                store.create_table(table);
            }
        }

        Ok(Self {
            sessions: SessionGate::new(config.max_sessions.max(1)),
            config,
            store: Arc::new(Mutex::new(store)),
            tx_counter: AtomicU64::new(0),
        })
    }

    pub fn ledger_name(&self) -> &str {
        &self.config.ledger_name
    }

    /// Runs `body` in a transaction, committing on success.  A commit-time
    /// conflict re-runs the whole body against a fresh snapshot, up to the
    /// configured retry ceiling, with jittered backoff in between.  Errors
    /// returned by the body abort the transaction and are not retried.
    pub fn execute<T, E, F>(&self, mut body: F) -> std::result::Result<T, E>
    where
        E: From<LedgerError>,
        F: FnMut(&mut Transaction) -> std::result::Result<T, E>,
    {
        let _permit = self.sessions.acquire();
        let mut attempt: u32 = 0;
        loop {
            let mut txn = self.begin();
            let value = body(&mut txn)?;
            match txn.commit() {
                Ok(()) => return Ok(value),
                Err(err @ LedgerError::OccConflict { .. }) => {
                    if attempt >= self.config.max_occ_retries {
                        return Err(E::from(err));
                    }
                    warn!(
                        "transaction on {} hit a concurrency conflict; retrying: {err}",
                        self.config.ledger_name
                    );
                    self.config.retry.pause(attempt);
                    attempt += 1;
                }
                Err(err) => return Err(E::from(err)),
            }
        }
    }

    /// Catalog query for the tables currently marked ACTIVE.
    pub fn active_tables(&self) -> Result<Vec<String>> {
        self.execute(|txn| Ok(txn.active_tables()))
    }

    fn begin(&self) -> Transaction {
        let seq = self.tx_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let tx_id = hash::sequence_uid("transaction", &self.config.ledger_name, seq);
        let (snapshot, base_seq) = {
            let guard = self.store.lock();
            (guard.clone(), guard.commit_seq())
        };
        Transaction {
            store: Arc::clone(&self.store),
            snapshot,
            base_seq,
            stamp: TxStamp {
                tx_id,
                tx_time: Utc::now(),
            },
        }
    }
}

/// Snapshot-isolated transaction.  Reads and writes hit a private copy of
/// the store, so a batch observes its own earlier writes; `commit` succeeds
/// only if nothing else committed since the snapshot was taken.
pub struct Transaction {
    store: Arc<Mutex<LedgerStore>>,
    snapshot: LedgerStore,
    base_seq: u64,
    stamp: TxStamp,
}

impl Transaction {
    pub fn active_tables(&self) -> Vec<String> {
        self.snapshot.active_tables()
    }

    /// Committed-view lookup by data-field equality.
    pub fn find_by_field(
        &self,
        table: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<CommittedRevision>> {
        self.snapshot.find_by_field(table, field, value)
    }

    pub fn insert(&mut self, table: &str, data: Map<String, Value>) -> Result<String> {
        self.snapshot.insert(table, &self.stamp, data)
    }

    pub fn update(&mut self, table: &str, doc_id: &str, data: Map<String, Value>) -> Result<()> {
        self.snapshot.update(table, &self.stamp, doc_id, data)
    }

    pub fn delete(&mut self, table: &str, doc_id: &str) -> Result<()> {
        self.snapshot.delete(table, &self.stamp, doc_id)
    }

    /// Revision chain of one document, oldest first.
    pub fn history(&self, table: &str, doc_id: &str) -> Result<Vec<CommittedRevision>> {
        self.snapshot.history(table, doc_id)
    }

    fn commit(mut self) -> Result<()> {
        let mut guard = self.store.lock();
        if guard.commit_seq() != self.base_seq {
            return Err(LedgerError::OccConflict {
                ledger: guard.name().to_string(),
                snapshot_seq: self.base_seq,
                committed_seq: guard.commit_seq(),
            });
        }
        self.snapshot.bump_commit_seq();
        *guard = self.snapshot;
        Ok(())
    }
}

struct SessionGate {
    state: Mutex<usize>,
    available: Condvar,
    max_sessions: usize,
}

impl SessionGate {
    fn new(max_sessions: usize) -> Self {
        Self {
            state: Mutex::new(0),
            available: Condvar::new(),
            max_sessions,
        }
    }

    fn acquire(&self) -> SessionPermit<'_> {
        let mut in_use = self.state.lock();
        while *in_use >= self.max_sessions {
            self.available.wait(&mut in_use);
        }
        *in_use += 1;
        SessionPermit { gate: self }
    }
}

struct SessionPermit<'a> {
    gate: &'a SessionGate,
}

impl Drop for SessionPermit<'_> {
    fn drop(&mut self) {
        let mut in_use = self.gate.state.lock();
        *in_use -= 1;
        self.gate.available.notify_one();
    }
}
