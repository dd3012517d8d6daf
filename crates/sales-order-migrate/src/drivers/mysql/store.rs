//! MySQL/MariaDB resource store.
//!
//! Uses mysql_async for connection pooling, binary-protocol paged reads and
//! batched multi-row INSERT for writes.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Row, SslOpts};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::core::{
    Document, DocumentStructure, Field, RawRow, RecordCollection, ResourceStore, Value,
};
use crate::error::{MigrateError, Result};

use super::convert::{from_mysql, to_mysql, BINARY_CHARSET};

/// MySQL max placeholders per prepared statement.
const MYSQL_MAX_PLACEHOLDERS: usize = 65535;

/// Time allowed to obtain a pooled connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// [`ResourceStore`] over one MySQL database.
///
/// Document names are prefixed with the configured `table_prefix`. Document
/// structures are cached after the first lookup.
pub struct MysqlStore {
    pool: Pool,
    database: String,
    table_prefix: String,
    page_size: usize,
    documents: Mutex<HashMap<String, Document>>,
}

impl MysqlStore {
    /// Create a pooled store and verify connectivity.
    pub async fn new(config: &DatabaseConfig, max_conns: usize, page_size: usize) -> Result<Self> {
        let ssl_opts = match config.ssl_mode.to_lowercase().as_str() {
            "disable" => {
                warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
                None
            }
            "prefer" | "require" => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
            "verify-ca" | "verify_ca" | "verify-full" | "verify_identity" => {
                Some(SslOpts::default())
            }
            _ => {
                warn!(
                    "Unknown ssl_mode '{}', defaulting to Preferred",
                    config.ssl_mode
                );
                Some(SslOpts::default().with_danger_accept_invalid_certs(true))
            }
        };

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port)
            .db_name(Some(&config.database))
            .user(Some(&config.user))
            .pass(Some(&config.password))
            // utf8mb4 for full Unicode; FK checks off so documents can be truncated in any order
            .init(vec!["SET NAMES utf8mb4", "SET FOREIGN_KEY_CHECKS = 0"]);

        if let Some(ssl) = ssl_opts {
            builder = builder.ssl_opts(ssl);
        }

        let constraints = PoolConstraints::new(1, max_conns.max(1)).ok_or_else(|| {
            MigrateError::Config(format!("invalid MySQL pool size: {}", max_conns))
        })?;
        let opts: Opts = builder
            .pool_opts(PoolOpts::new().with_constraints(constraints))
            .into();

        let store = Self {
            pool: Pool::new(opts),
            database: config.database.clone(),
            table_prefix: config.table_prefix.clone(),
            page_size: page_size.max(1),
            documents: Mutex::new(HashMap::new()),
        };
        store.test_connection().await?;

        info!(
            "Connected to MySQL: {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(store)
    }

    async fn conn(&self, context: &str) -> Result<Conn> {
        match tokio::time::timeout(CONNECT_TIMEOUT, self.pool.get_conn()).await {
            Ok(conn) => conn.map_err(|e| MigrateError::pool(e, context)),
            Err(_) => Err(MigrateError::pool(
                format!("timed out after {}s", CONNECT_TIMEOUT.as_secs()),
                context,
            )),
        }
    }

    /// Quote a MySQL identifier.
    fn quote_ident(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn table_name(&self, document: &str) -> String {
        format!("{}{}", self.table_prefix, document)
    }

    fn qualify(&self, document: &str) -> String {
        Self::quote_ident(&self.table_name(document))
    }

    fn cached(&self, name: &str) -> Option<Document> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    async fn require_document(&self, name: &str) -> Result<Document> {
        self.get_document(name)
            .await?
            .ok_or_else(|| MigrateError::DocumentNotFound(self.table_name(name)))
    }

    fn order_by(structure: &DocumentStructure) -> String {
        let keys: Vec<String> = match &structure.primary_key {
            Some(pk) => vec![Self::quote_ident(pk)],
            None => structure.field_names().map(Self::quote_ident).collect(),
        };
        keys.join(", ")
    }

    fn row_to_raw(mut row: Row) -> RawRow {
        let columns = row.columns();
        let mut raw = RawRow::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            let value = row
                .take::<mysql_async::Value, usize>(idx)
                .unwrap_or(mysql_async::Value::NULL);
            let binary = column.character_set() == BINARY_CHARSET;
            raw.insert(
                column.name_str().into_owned(),
                from_mysql(value, column.column_type(), binary),
            );
        }
        raw
    }
}

#[async_trait]
impl ResourceStore for MysqlStore {
    async fn get_document(&self, name: &str) -> Result<Option<Document>> {
        if let Some(doc) = self.cached(name) {
            return Ok(Some(doc));
        }

        let mut conn = self.conn("loading document structure").await?;
        let sql = r#"
            SELECT COLUMN_NAME, DATA_TYPE, COLUMN_KEY
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;
        let columns: Vec<(String, String, String)> = conn
            .exec(sql, (self.database.as_str(), self.table_name(name)))
            .await?;
        if columns.is_empty() {
            return Ok(None);
        }

        let mut structure = DocumentStructure::default();
        for (column, data_type, key) in columns {
            if key == "PRI" && structure.primary_key.is_none() {
                structure.primary_key = Some(column.clone());
            }
            structure.fields.push(Field::typed(column, data_type));
        }
        debug!(
            "{}: {} fields, primary key {:?}",
            name,
            structure.fields.len(),
            structure.primary_key
        );

        let doc = Document::new(name, structure);
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), doc.clone());
        Ok(Some(doc))
    }

    async fn get_records_count(&self, name: &str) -> Result<u64> {
        let mut conn = self.conn("counting records").await?;
        let sql = format!("SELECT COUNT(*) FROM {}", self.qualify(name));
        let count: Option<u64> = conn.query_first(&sql).await?;
        Ok(count.unwrap_or(0))
    }

    async fn get_records(&self, name: &str, page: usize) -> Result<Vec<RawRow>> {
        let doc = self.require_document(name).await?;
        let structure = doc.structure();
        let columns: Vec<String> = structure.field_names().map(Self::quote_ident).collect();

        let sql = format!(
            "SELECT {} FROM {} ORDER BY {} LIMIT ? OFFSET ?",
            columns.join(", "),
            self.qualify(name),
            Self::order_by(structure)
        );
        let limit = self.page_size as u64;
        let offset = (page as u64).saturating_mul(limit);

        let mut conn = self.conn("reading page").await?;
        let rows: Vec<Row> = conn.exec(&sql, (limit, offset)).await?;
        debug!("{}: page {} returned {} rows", name, page, rows.len());
        Ok(rows.into_iter().map(Self::row_to_raw).collect())
    }

    async fn save_records(&self, name: &str, records: &RecordCollection) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let structure = records.document().structure();
        let col_list: Vec<String> = structure.field_names().map(Self::quote_ident).collect();
        let num_cols = col_list.len();
        if num_cols == 0 {
            return Ok(0);
        }
        let max_rows_per_batch = (MYSQL_MAX_PLACEHOLDERS / num_cols).max(1);
        let table = self.qualify(name);

        let mut conn = self.conn("saving records").await?;
        for chunk in records.records().chunks(max_rows_per_batch) {
            let placeholders_per_row = format!("({})", vec!["?"; num_cols].join(", "));
            let all_placeholders = vec![placeholders_per_row; chunk.len()];
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                table,
                col_list.join(", "),
                all_placeholders.join(", ")
            );
            let params: Vec<mysql_async::Value> = chunk
                .iter()
                .flat_map(|record| record.values().iter().map(to_mysql).collect::<Vec<_>>())
                .collect();
            conn.exec_drop(&sql, params).await?;
        }

        debug!("MySQL: wrote {} rows to {}", records.len(), table);
        Ok(records.len() as u64)
    }

    async fn clear_document(&self, name: &str) -> Result<()> {
        let mut conn = self.conn("clearing document").await?;
        conn.query_drop(format!("TRUNCATE TABLE {}", self.qualify(name)))
            .await?;
        debug!("MySQL: truncated {}", self.table_name(name));
        Ok(())
    }

    async fn delete_records(&self, name: &str, field: &str, values: &[Value]) -> Result<u64> {
        if values.is_empty() {
            return Ok(0);
        }

        let table = self.qualify(name);
        let column = Self::quote_ident(field);
        let mut conn = self.conn("deleting records").await?;
        let mut deleted = 0u64;
        for chunk in values.chunks(MYSQL_MAX_PLACEHOLDERS) {
            let sql = format!(
                "DELETE FROM {} WHERE {} IN ({})",
                table,
                column,
                vec!["?"; chunk.len()].join(", ")
            );
            let params: Vec<mysql_async::Value> = chunk.iter().map(to_mysql).collect();
            conn.exec_drop(&sql, params).await?;
            deleted += conn.affected_rows();
        }

        debug!("MySQL: deleted {} rows from {}", deleted, table);
        Ok(deleted)
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn test_connection(&self) -> Result<()> {
        let mut conn = self.conn("testing MySQL connection").await?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| MigrateError::pool(e, "testing MySQL connection"))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.clone().disconnect().await.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(MysqlStore::quote_ident("sales_order"), "`sales_order`");
        assert_eq!(MysqlStore::quote_ident("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_order_by_prefers_primary_key() {
        let structure =
            DocumentStructure::from_names(["entity_id", "status"]).with_primary_key("entity_id");
        assert_eq!(MysqlStore::order_by(&structure), "`entity_id`");

        let structure = DocumentStructure::from_names(["attribute_id", "value"]);
        assert_eq!(MysqlStore::order_by(&structure), "`attribute_id`, `value`");
    }
}
