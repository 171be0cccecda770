use core_types::AppConfig;

use crate::error::{LedgerError, Result};
use crate::retry::RetryPolicy;

/// Driver construction parameters.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Target ledger identifier.
    pub ledger_name: String,
    /// Region label, carried for diagnostics only.
    pub ledger_region: Option<String>,
    /// Max concurrent transactions handed out by the driver.
    pub max_sessions: usize,
    /// Retry ceiling for optimistic-concurrency conflicts.
    pub max_occ_retries: u32,
    pub retry: RetryPolicy,
    /// Tables seeded as ACTIVE when the driver is built.
    pub tables: Vec<String>,
}

impl DriverConfig {
    pub fn new(ledger_name: &str) -> Self {
        Self {
            ledger_name: ledger_name.to_string(),
            ledger_region: None,
            max_sessions: 1,
            max_occ_retries: 3,
            retry: RetryPolicy::default(),
            tables: Vec::new(),
        }
    }

    pub fn with_tables(mut self, tables: &[&str]) -> Self {
        self.tables = tables.iter().map(|table| table.to_string()).collect();
        self
    }

    /// Builds driver settings from process configuration.  An empty ledger
    /// name is a fatal configuration error.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let ledger_name = config.ledger_name.trim();
        if ledger_name.is_empty() {
            return Err(LedgerError::Config {
                message: "environment not configured with a LEDGER_NAME".to_string(),
            });
        }

        Ok(Self {
            ledger_name: ledger_name.to_string(),
            ledger_region: config.ledger_region.clone(),
            max_sessions: config.max_sessions_per_lambda.max(1),
            max_occ_retries: config.max_occ_retries,
            retry: RetryPolicy::default(),
            tables: config.ledger_tables.clone(),
        })
    }
}
