//! Host harness: replays load events from a file (or stdin) through the
//! configured revision writer.  Configuration comes from `config.toml`
//! overlaid with environment variables; see [`core_types::AppConfig`].

use std::io::Read;
use std::sync::Arc;
use std::{env, fs, io, process};

use config::ConfigError;
use core_types::AppConfig;
use ledger::{DriverConfig, LedgerDriver, LedgerError};
use log::{info, warn};
use revision_writer::WriterError;
use serde_json::{Deserializer, Value};
use thiserror::Error;

#[derive(Debug, Error)]
enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("writer error: {0}")]
    Writer(#[from] WriterError),
    #[error("unable to read input: {0}")]
    Io(#[from] io::Error),
    #[error("input is not a stream of JSON documents: {0}")]
    Input(#[from] serde_json::Error),
    #[error("{failed} of {total} events failed")]
    LoadFailures { failed: u64, total: u64 },
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("ledger-loader failed: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let driver = Arc::new(LedgerDriver::new(DriverConfig::from_app_config(&config)?)?);
    let writer = revision_writer::build_from_config(&config, Arc::clone(&driver))?;

    let mut input = String::new();
    match env::args().nth(1) {
        Some(path) => {
            fs::File::open(&path)?.read_to_string(&mut input)?;
        }
        None => {
            io::stdin().read_to_string(&mut input)?;
        }
    }

    let mut total: u64 = 0;
    let mut applied: u64 = 0;
    let mut skipped: u64 = 0;
    let mut failed: u64 = 0;

    for payload in Deserializer::from_str(&input).into_iter::<Value>() {
        let payload = payload?;
        total += 1;

        let Some(event) = core_types::LoadEvent::from_json(&payload) else {
            warn!("input document does not decode to a load event, skipping: {payload}");
            skipped += 1;
            continue;
        };

        let result = writer.write_event(&event)?;
        if let Some(message) = &result.message {
            warn!("{message}");
        }
        if result.fail {
            failed += 1;
        } else if result.skip {
            skipped += 1;
        } else {
            applied += 1;
        }
    }

    info!(
        "replay into {} finished: {applied} applied, {skipped} skipped, {failed} failed of {total}",
        driver.ledger_name()
    );

    if failed > 0 {
        return Err(AppError::LoadFailures { failed, total });
    }
    Ok(())
}
