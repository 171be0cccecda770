//! The apply core: validation and planning of ledger mutations for incoming
//! load events.
//!
//! The crate exposes:
//! - [`RevisionWriter`]: the writer contract with the shared apply pipeline.
//! - [`BaseRevisionWriter`]: back-link (`oldDocumentId`) revision tracking.
//! - [`TableMapperRevisionWriter`]: per-table identity-field tracking.
//! - [`build_from_config`]: variant selection from process configuration.

pub mod base;
pub mod factory;
pub mod table_mapper;
pub mod writer;

pub use base::{BaseRevisionWriter, BACK_LINK_FIELD};
pub use factory::build_from_config;
pub use table_mapper::TableMapperRevisionWriter;
pub use writer::{RevisionWriter, Result, WriterError};
