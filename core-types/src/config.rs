// Copyright (c) James Kassemi, SC, US. All rights reserved.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Selects the revision-writer implementation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriterKind {
    /// Tracks source identities through an `oldDocumentId` back-link.
    #[default]
    Base,
    /// Looks revisions up through a per-table identity field.
    TableMapper,
}

/// Selects the load-event mapper implementation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MapperKind {
    #[default]
    MappingFile,
}

/// Process configuration.  Values come from an optional `config.toml`
/// overlaid with environment variables of the same (upper-cased) names, so
/// `LEDGER_NAME` populates `ledger_name` and so on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Target ledger identifier.  Required.
    pub ledger_name: String,
    /// Geographical region label of the ledger, if any.
    #[serde(default)]
    pub ledger_region: Option<String>,
    /// Max concurrent transactions per writer instance.
    #[serde(default = "default_max_sessions")]
    pub max_sessions_per_lambda: usize,
    /// Retry ceiling for optimistic-concurrency conflicts.
    #[serde(default = "default_max_occ_retries")]
    pub max_occ_retries: u32,
    /// When true, missing preconditions fail (retry/DLQ); when false they
    /// are skipped so an interrupted load can be resumed.
    #[serde(default = "default_strict_mode")]
    pub strict_mode: bool,
    #[serde(default)]
    pub revision_writer: WriterKind,
    #[serde(default)]
    pub load_event_mapper: MapperKind,
    /// Field on CDC records holding the prior image of a changed key.
    #[serde(default = "default_before_image_field_name")]
    pub before_image_field_name: String,
    /// Table/field mapping definition consumed by the mapper.
    #[serde(default = "default_mapping_file")]
    pub mapping_file: String,
    /// Per-table identity-field map consumed by the table-mapper writer.
    #[serde(default = "default_table_map_file")]
    pub table_map_file: String,
    /// Tables seeded as ACTIVE in the embedded ledger at startup.
    #[serde(default)]
    pub ledger_tables: Vec<String>,
}

fn default_max_sessions() -> usize {
    1
}

fn default_max_occ_retries() -> u32 {
    3
}

fn default_strict_mode() -> bool {
    true
}

fn default_before_image_field_name() -> String {
    "before-image".to_string()
}

fn default_mapping_file() -> String {
    "dms-mapping.json".to_string()
}

fn default_table_map_file() -> String {
    "table-map.json".to_string()
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config.toml").required(false))
            .add_source(
                Environment::default()
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("ledger_tables"),
            )
            .build()?;
        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let config: AppConfig =
            serde_json::from_str(r#"{"ledger_name": "target-ledger"}"#).unwrap();
        assert_eq!(config.ledger_name, "target-ledger");
        assert_eq!(config.ledger_region, None);
        assert_eq!(config.max_sessions_per_lambda, 1);
        assert_eq!(config.max_occ_retries, 3);
        assert!(config.strict_mode);
        assert_eq!(config.revision_writer, WriterKind::Base);
        assert_eq!(config.load_event_mapper, MapperKind::MappingFile);
        assert_eq!(config.before_image_field_name, "before-image");
        assert_eq!(config.mapping_file, "dms-mapping.json");
        assert_eq!(config.table_map_file, "table-map.json");
        assert!(config.ledger_tables.is_empty());
    }

    #[test]
    fn writer_kind_parses_variant_tags() {
        let config: AppConfig = serde_json::from_str(
            r#"{"ledger_name": "l", "revision_writer": "table-mapper", "strict_mode": false}"#,
        )
        .unwrap();
        assert_eq!(config.revision_writer, WriterKind::TableMapper);
        assert!(!config.strict_mode);
    }

    #[test]
    fn missing_ledger_name_is_an_error() {
        assert!(serde_json::from_str::<AppConfig>("{}").is_err());
    }
}
