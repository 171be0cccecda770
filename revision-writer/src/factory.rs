use std::sync::Arc;

use core_types::{AppConfig, WriterKind};
use ledger::LedgerDriver;

use crate::base::BaseRevisionWriter;
use crate::table_mapper::TableMapperRevisionWriter;
use crate::writer::{RevisionWriter, Result};

/// Builds the writer variant selected by `REVISION_WRITER`.
pub fn build_from_config(
    config: &AppConfig,
    driver: Arc<LedgerDriver>,
) -> Result<Arc<dyn RevisionWriter>> {
    match config.revision_writer {
        WriterKind::Base => Ok(Arc::new(
            BaseRevisionWriter::builder()
                .driver(driver)
                .strict_mode(config.strict_mode)
                .build()?,
        )),
        WriterKind::TableMapper => Ok(Arc::new(
            TableMapperRevisionWriter::builder()
                .driver(driver)
                .strict_mode(config.strict_mode)
                .table_map_file(&config.table_map_file)
                .build()?,
        )),
    }
}
