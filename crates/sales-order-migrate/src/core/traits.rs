//! Core traits for store-agnostic data migration.
//!
//! This module defines the seams the migration pipeline is built on:
//!
//! - [`ResourceStore`]: Paged reads and bulk writes against a source or destination
//! - [`MapReader`]: Document and field mapping between the two schemas
//! - [`RecordTransformer`]: Populates a destination record from a source record
//! - [`TransformerFactory`]: Creates a transformer per document pair
//! - [`ProgressReporter`]: Observational progress callbacks
//!
//! # Design Patterns
//!
//! - **Strategy**: Stores and transformers are interchangeable implementations
//! - **Abstract Factory**: `TransformerFactory` builds transformers bound to a document pair

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::record::{Document, Record, RecordCollection};
use super::value::{RawRow, Value};

/// Read and write documents in a source or destination store.
///
/// Pages are zero-based and sized by [`page_size`](ResourceStore::page_size).
/// An empty page marks the end of a document.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Look up a document and its structure. `None` if it does not exist.
    async fn get_document(&self, name: &str) -> Result<Option<Document>>;

    /// Count the records in a document.
    async fn get_records_count(&self, name: &str) -> Result<u64>;

    /// Fetch one page of raw rows, in a stable order.
    async fn get_records(&self, name: &str, page: usize) -> Result<Vec<RawRow>>;

    /// Append every record of a collection to a document.
    ///
    /// Returns the number of rows written. An empty collection is a no-op.
    async fn save_records(&self, name: &str, records: &RecordCollection) -> Result<u64>;

    /// Delete every row of a document.
    async fn clear_document(&self, name: &str) -> Result<()>;

    /// Delete the rows whose `field` equals one of `values`.
    ///
    /// Returns the number of rows removed. An empty `values` is a no-op.
    async fn delete_records(&self, name: &str, field: &str, values: &[Value]) -> Result<u64>;

    /// Rows per page.
    fn page_size(&self) -> usize;

    /// Get the store type identifier (e.g., "mysql", "memory").
    fn db_type(&self) -> &str;

    /// Verify the store is reachable.
    async fn test_connection(&self) -> Result<()>;

    /// Close the connection pool.
    async fn close(&self);
}

/// Which side of the mapping a name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapDirection {
    /// Name is a source document or field.
    Source,
    /// Name is a destination document or field.
    Destination,
}

/// A value rule applied to a destination field after the plain copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldHandler {
    /// Overwrite the field with a constant.
    SetValue(Option<ScalarValue>),
    /// Replace values by their text form; unlisted values pass through.
    Convert(IndexMap<String, String>),
}

/// Constant usable in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<ScalarValue> for Value {
    fn from(v: ScalarValue) -> Self {
        match v {
            ScalarValue::Bool(b) => Value::Bool(b),
            ScalarValue::Int(i) => Value::Int(i),
            ScalarValue::Float(f) => Value::Float(f),
            ScalarValue::Text(s) => Value::Text(s),
        }
    }
}

/// Document and field mapping between source and destination schemas.
pub trait MapReader: Send + Sync {
    /// Map a document name to the other side. `None` means unmapped or ignored.
    fn document_map(&self, name: &str, direction: MapDirection) -> Option<String>;

    /// Map a field of `document` to the other side. `None` if ignored.
    fn field_map(&self, document: &str, field: &str, direction: MapDirection) -> Option<String>;

    /// Check whether a field is explicitly ignored.
    fn is_field_ignored(&self, document: &str, field: &str, direction: MapDirection) -> bool;

    /// Handler for a destination field, if one is configured.
    fn field_handler(&self, document: &str, field: &str) -> Option<&FieldHandler>;
}

/// Populates destination records from source records.
///
/// `init` is called exactly once per document pair before any `transform`.
pub trait RecordTransformer: Send + Sync {
    /// Prepare the transformer (resolve field plans, validate structures).
    fn init(&mut self) -> Result<()>;

    /// Fill `destination` from `source`.
    fn transform(&self, source: &Record, destination: &mut Record) -> Result<()>;
}

/// Creates a transformer for a (source, destination, mapping) triple.
pub trait TransformerFactory: Send + Sync {
    fn create(
        &self,
        source: &Document,
        destination: &Document,
        map_reader: Arc<dyn MapReader>,
    ) -> Box<dyn RecordTransformer>;
}

/// Observational progress callbacks. Has no effect on data correctness.
pub trait ProgressReporter: Send + Sync {
    /// Begin a unit of work with `total` steps.
    fn start(&self, total: u64);

    /// One step completed.
    fn advance(&self);

    /// Unit of work finished.
    fn finish(&self);
}
