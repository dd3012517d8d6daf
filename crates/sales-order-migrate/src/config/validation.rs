//! Configuration validation.

use std::collections::HashSet;

use super::{Config, DatabaseConfig};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_database("source", &config.source)?;
    validate_database("destination", &config.destination)?;

    // Cannot migrate into the tables being read
    if config.source.host == config.destination.host
        && config.source.port == config.destination.port
        && config.source.database == config.destination.database
        && config.source.table_prefix == config.destination.table_prefix
    {
        return Err(MigrateError::Config(
            "source and destination cannot be the same database".into(),
        ));
    }

    let migration = &config.migration;
    if migration.page_size == 0 {
        return Err(MigrateError::Config(
            "migration.page_size must be at least 1".into(),
        ));
    }
    if migration.max_connections == 0 {
        return Err(MigrateError::Config(
            "migration.max_connections must be at least 1".into(),
        ));
    }
    if migration.documents.is_empty() {
        return Err(MigrateError::Config(
            "migration.documents must list at least one source document".into(),
        ));
    }
    if migration.eav.document.is_empty() {
        return Err(MigrateError::Config(
            "migration.eav.document is required".into(),
        ));
    }
    if migration.eav.metadata_document.is_empty() {
        return Err(MigrateError::Config(
            "migration.eav.metadata_document is required".into(),
        ));
    }

    let mut seen = HashSet::new();
    for code in &migration.eav.attributes {
        if code.is_empty() {
            return Err(MigrateError::Config(
                "migration.eav.attributes cannot contain an empty code".into(),
            ));
        }
        if !seen.insert(code.as_str()) {
            return Err(MigrateError::Config(format!(
                "migration.eav.attributes lists '{}' more than once",
                code
            )));
        }
    }

    Ok(())
}

fn validate_database(side: &str, db: &DatabaseConfig) -> Result<()> {
    if db.host.is_empty() {
        return Err(MigrateError::Config(format!("{}.host is required", side)));
    }
    if db.database.is_empty() {
        return Err(MigrateError::Config(format!("{}.database is required", side)));
    }
    if db.user.is_empty() {
        return Err(MigrateError::Config(format!("{}.user is required", side)));
    }
    if db.r#type != "mysql" {
        return Err(MigrateError::Config(format!(
            "{}.type must be 'mysql', got '{}'",
            side, db.r#type
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MapConfig, MigrationConfig};

    fn database(name: &str) -> DatabaseConfig {
        DatabaseConfig {
            r#type: "mysql".to_string(),
            host: "localhost".to_string(),
            port: 3306,
            database: name.to_string(),
            user: "root".to_string(),
            password: "password".to_string(),
            table_prefix: String::new(),
            ssl_mode: "disable".to_string(),
        }
    }

    fn valid_config() -> Config {
        Config {
            source: database("magento1"),
            destination: database("magento2"),
            migration: MigrationConfig::default(),
            map: MapConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_wrong_destination_type() {
        let mut config = valid_config();
        config.destination.r#type = "postgres".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_same_database_rejected() {
        let mut config = valid_config();
        config.destination.database = "magento1".to_string();
        assert!(validate(&config).is_err());

        // A different prefix in the same schema is a distinct namespace
        config.destination.table_prefix = "m2_".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_page_size() {
        let mut config = valid_config();
        config.migration.page_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_attribute_codes() {
        let mut config = valid_config();
        config.migration.eav.attributes = vec!["coupon_code".into(), "coupon_code".into()];
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("coupon_code"));
    }

    #[test]
    fn test_empty_document_list() {
        let mut config = valid_config();
        config.migration.documents.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_database_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
