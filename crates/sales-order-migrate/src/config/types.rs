//! Configuration type definitions.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::FieldHandler;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (legacy schema).
    pub source: DatabaseConfig,

    /// Destination database configuration.
    pub destination: DatabaseConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Document and field mapping rules.
    #[serde(default)]
    pub map: MapConfig,
}

/// Connection settings for one side of the migration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database type (always "mysql" for now).
    #[serde(default = "default_mysql")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Prefix prepended to every document name in this database.
    #[serde(default)]
    pub table_prefix: String,

    /// SSL mode: disable, prefer, require, verify-ca, verify-full (default: "prefer").
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("table_prefix", &self.table_prefix)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows fetched and saved per page (default: 1000).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum connections per database pool (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Source documents to migrate, in processing order.
    #[serde(default = "default_documents")]
    pub documents: Vec<String>,

    /// EAV side table settings.
    #[serde(default)]
    pub eav: EavConfig,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_connections: default_max_connections(),
            documents: default_documents(),
            eav: EavConfig::default(),
        }
    }
}

/// Settings for mirroring source fields into the attribute-value sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EavConfig {
    /// Destination document that receives derived attribute rows.
    #[serde(default = "default_eav_document")]
    pub document: String,

    /// Destination document holding attribute metadata.
    #[serde(default = "default_metadata_document")]
    pub metadata_document: String,

    /// Attribute codes to mirror, in enumeration order.
    #[serde(default = "default_eav_attributes")]
    pub attributes: Vec<String>,

    /// Field names within the metadata document.
    #[serde(default)]
    pub fields: MetadataFields,
}

impl Default for EavConfig {
    fn default() -> Self {
        Self {
            document: default_eav_document(),
            metadata_document: default_metadata_document(),
            attributes: default_eav_attributes(),
            fields: MetadataFields::default(),
        }
    }
}

/// Column names of the attribute metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFields {
    #[serde(default = "default_code_field")]
    pub code: String,
    #[serde(default = "default_attribute_id_field")]
    pub attribute_id: String,
    #[serde(default = "default_entity_type_id_field")]
    pub entity_type_id: String,
}

impl Default for MetadataFields {
    fn default() -> Self {
        Self {
            code: default_code_field(),
            attribute_id: default_attribute_id_field(),
            entity_type_id: default_entity_type_id_field(),
        }
    }
}

/// Document and field mapping rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapConfig {
    /// Source document name to destination document name.
    #[serde(default)]
    pub documents: IndexMap<String, String>,

    /// Source documents that are never migrated, even if mapped.
    #[serde(default)]
    pub ignore_documents: Vec<String>,

    /// Per source document field rules.
    #[serde(default)]
    pub fields: IndexMap<String, SourceFieldRules>,

    /// Per destination document field rules.
    #[serde(default)]
    pub destination_fields: IndexMap<String, DestinationFieldRules>,
}

/// Field rules for a source document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceFieldRules {
    /// Source field to destination field renames.
    #[serde(default)]
    pub rename: IndexMap<String, String>,

    /// Source fields that are not copied.
    #[serde(default)]
    pub ignore: Vec<String>,
}

/// Field rules for a destination document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DestinationFieldRules {
    /// Destination fields that are intentionally left unpopulated by the copy.
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Value handlers applied after the copy.
    #[serde(default)]
    pub handlers: IndexMap<String, FieldHandler>,
}

// Default value functions for serde
fn default_mysql() -> String {
    "mysql".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_prefer() -> String {
    "prefer".to_string()
}

fn default_page_size() -> usize {
    1_000
}

fn default_max_connections() -> usize {
    4
}

fn default_documents() -> Vec<String> {
    vec!["sales_flat_order".to_string()]
}

fn default_eav_document() -> String {
    "eav_entity_int".to_string()
}

fn default_metadata_document() -> String {
    "eav_attribute".to_string()
}

fn default_eav_attributes() -> Vec<String> {
    vec![
        "reward_points_balance_refunded".to_string(),
        "reward_salesrule_points".to_string(),
    ]
}

fn default_code_field() -> String {
    "attribute_code".to_string()
}

fn default_attribute_id_field() -> String {
    "attribute_id".to_string()
}

fn default_entity_type_id_field() -> String {
    "entity_type_id".to_string()
}
