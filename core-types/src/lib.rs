// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Shared types for the ledger loader.
//!
//! The crate exposes:
//! - [`LoadEvent`] / [`Operation`]: the canonical document-change event and its wire form.
//! - [`ValidationResult`]: pass/skip/fail outcome of applying an event.
//! - [`AppConfig`]: process configuration resolved from file + environment.
//! - [`hash`]: canonical-serialization fingerprints used for de-duplication.

pub mod config;
pub mod event;
pub mod hash;
pub mod result;

pub use config::{AppConfig, MapperKind, WriterKind};
pub use event::{LoadEvent, Operation};
pub use result::ValidationResult;
