//! Translation of foreign database change records into canonical load
//! events, driven by a static table/field mapping definition.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use core_types::{AppConfig, MapperKind};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MapError>;

/// Mapper failures are fatal: a loader with a missing or malformed mapping
/// definition must not start.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("unable to read mapping file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed mapping file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Maps source-database change records to target-ledger revisions.
///
/// Implementations resolve three things per source table: the target table
/// name, the identity value used for idempotence checks, and the shape of
/// the record itself.
pub trait LoadEventMapper: Send + Sync {
    /// Target table for a source table, or `None` when the source table is
    /// not mapped (callers skip such records).
    fn map_table_name(&self, source_table: &str) -> Option<String>;

    /// Projects a source record into the target shape.  Only mapped fields
    /// are carried over; everything else is dropped.
    fn map_data_record(
        &self,
        source_record: &Map<String, Value>,
        source_table: &str,
    ) -> Option<Map<String, Value>>;

    /// Identity value for a source record.  When a before image is supplied
    /// and contains the identity field, it wins: the record is renaming its
    /// own key and the committed revision is filed under the old value.
    fn map_primary_key(
        &self,
        source_record: &Map<String, Value>,
        before_image: Option<&Map<String, Value>>,
        source_table: &str,
    ) -> Option<Value>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TableMappingConfig {
    source_table: String,
    target_table: String,
    id_field: String,
    fields: Vec<FieldMappingConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct FieldMappingConfig {
    source_field: String,
    target_field: String,
}

#[derive(Debug, Clone)]
struct TableMapping {
    target_table: String,
    primary_key_field: String,
    field_map: HashMap<String, String>,
}

/// File-driven [`LoadEventMapper`].  The definition is a JSON list of table
/// mappings:
///
/// ```json
/// [ { "source-table": "person", "target-table": "Person",
///     "id-field": "gov_id",
///     "fields": [ {"source-field": "gov_id", "target-field": "GovId"} ] } ]
/// ```
#[derive(Debug)]
pub struct MappingFileLoadEventMapper {
    tables: HashMap<String, TableMapping>,
}

impl MappingFileLoadEventMapper {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| MapError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let configs: Vec<TableMappingConfig> =
            serde_json::from_slice(&bytes).map_err(|source| MapError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut tables = HashMap::new();
        for config in configs {
            let field_map = config
                .fields
                .into_iter()
                .map(|field| (field.source_field, field.target_field))
                .collect();
            tables.insert(
                config.source_table,
                TableMapping {
                    target_table: config.target_table,
                    primary_key_field: config.id_field,
                    field_map,
                },
            );
        }
        Ok(Self { tables })
    }

    fn mapping(&self, source_table: &str) -> Option<&TableMapping> {
        self.tables.get(source_table)
    }
}

impl LoadEventMapper for MappingFileLoadEventMapper {
    fn map_table_name(&self, source_table: &str) -> Option<String> {
        self.mapping(source_table)
            .map(|mapping| mapping.target_table.clone())
    }

    fn map_data_record(
        &self,
        source_record: &Map<String, Value>,
        source_table: &str,
    ) -> Option<Map<String, Value>> {
        let mapping = self.mapping(source_table)?;
        let mut data = Map::new();
        for (field, value) in source_record {
            if let Some(target_field) = mapping.field_map.get(field) {
                data.insert(target_field.clone(), value.clone());
            }
        }
        Some(data)
    }

    fn map_primary_key(
        &self,
        source_record: &Map<String, Value>,
        before_image: Option<&Map<String, Value>>,
        source_table: &str,
    ) -> Option<Value> {
        let mapping = self.mapping(source_table)?;
        if let Some(before) = before_image {
            if let Some(value) = before.get(&mapping.primary_key_field) {
                if !value.is_null() {
                    return Some(value.clone());
                }
            }
        }
        source_record
            .get(&mapping.primary_key_field)
            .filter(|value| !value.is_null())
            .cloned()
    }
}

/// Builds the configured mapper variant.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn LoadEventMapper>> {
    match config.load_event_mapper {
        MapperKind::MappingFile => Ok(Arc::new(MappingFileLoadEventMapper::from_file(
            &config.mapping_file,
        )?)),
    }
}
