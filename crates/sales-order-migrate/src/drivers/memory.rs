//! In-memory [`ResourceStore`].
//!
//! Documents keep rows in insertion order, which is also page order. The
//! store records how many pages were fetched per document and can be told to
//! fail a specific save, which is what the pipeline tests lean on.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::core::{Document, DocumentStructure, RawRow, RecordCollection, ResourceStore, Value};
use crate::error::{MigrateError, Result};

struct MemoryDocument {
    document: Document,
    rows: Vec<RawRow>,
    saves: usize,
}

#[derive(Default)]
struct Inner {
    documents: IndexMap<String, MemoryDocument>,
    fetches: HashMap<String, usize>,
    fail_save: HashMap<String, usize>,
}

/// Mutex-guarded document map implementing [`ResourceStore`].
pub struct MemoryStore {
    name: String,
    page_size: usize,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store. `page_size` is clamped to at least 1.
    pub fn new(name: impl Into<String>, page_size: usize) -> Self {
        Self {
            name: name.into(),
            page_size: page_size.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create (or replace) an empty document with the given fields.
    pub fn create_document<I, S>(&self, name: &str, fields: I, primary_key: Option<&str>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut structure = DocumentStructure::from_names(fields);
        if let Some(pk) = primary_key {
            structure = structure.with_primary_key(pk);
        }
        self.lock().documents.insert(
            name.to_string(),
            MemoryDocument {
                document: Document::new(name, structure),
                rows: Vec::new(),
                saves: 0,
            },
        );
    }

    /// Append raw rows to a document, bypassing the structure check.
    pub fn insert_rows(&self, name: &str, rows: Vec<RawRow>) -> Result<()> {
        let mut inner = self.lock();
        let doc = inner
            .documents
            .get_mut(name)
            .ok_or_else(|| MigrateError::DocumentNotFound(name.to_string()))?;
        doc.rows.extend(rows);
        Ok(())
    }

    /// Snapshot of every row in a document. Empty if the document is unknown.
    pub fn rows(&self, name: &str) -> Vec<RawRow> {
        self.lock()
            .documents
            .get(name)
            .map(|d| d.rows.clone())
            .unwrap_or_default()
    }

    /// Number of `get_records` calls made for a document.
    pub fn page_fetches(&self, name: &str) -> usize {
        self.lock().fetches.get(name).copied().unwrap_or(0)
    }

    /// Make the `nth` (zero-based) non-empty save to `name` fail.
    pub fn fail_save_at(&self, name: &str, nth: usize) {
        self.lock().fail_save.insert(name.to_string(), nth);
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get_document(&self, name: &str) -> Result<Option<Document>> {
        Ok(self.lock().documents.get(name).map(|d| d.document.clone()))
    }

    async fn get_records_count(&self, name: &str) -> Result<u64> {
        self.lock()
            .documents
            .get(name)
            .map(|d| d.rows.len() as u64)
            .ok_or_else(|| MigrateError::DocumentNotFound(name.to_string()))
    }

    async fn get_records(&self, name: &str, page: usize) -> Result<Vec<RawRow>> {
        let mut inner = self.lock();
        *inner.fetches.entry(name.to_string()).or_insert(0) += 1;
        let doc = inner
            .documents
            .get(name)
            .ok_or_else(|| MigrateError::DocumentNotFound(name.to_string()))?;
        Ok(doc
            .rows
            .iter()
            .skip(page.saturating_mul(self.page_size))
            .take(self.page_size)
            .cloned()
            .collect())
    }

    async fn save_records(&self, name: &str, records: &RecordCollection) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut inner = self.lock();
        let fail_at = inner.fail_save.get(name).copied();
        let doc = inner
            .documents
            .get_mut(name)
            .ok_or_else(|| MigrateError::DocumentNotFound(name.to_string()))?;

        let call = doc.saves;
        doc.saves += 1;
        if fail_at == Some(call) {
            return Err(MigrateError::Store(format!(
                "{}: injected failure on save #{}",
                name, call
            )));
        }

        let structure = doc.document.structure().clone();
        for record in records.records() {
            let row: RawRow = structure
                .field_names()
                .map(String::from)
                .zip(record.values())
                .collect();
            doc.rows.push(row);
        }
        Ok(records.len() as u64)
    }

    async fn clear_document(&self, name: &str) -> Result<()> {
        let mut inner = self.lock();
        let doc = inner
            .documents
            .get_mut(name)
            .ok_or_else(|| MigrateError::DocumentNotFound(name.to_string()))?;
        doc.rows.clear();
        Ok(())
    }

    async fn delete_records(&self, name: &str, field: &str, values: &[Value]) -> Result<u64> {
        let mut inner = self.lock();
        let doc = inner
            .documents
            .get_mut(name)
            .ok_or_else(|| MigrateError::DocumentNotFound(name.to_string()))?;
        let before = doc.rows.len();
        doc.rows
            .retain(|row| !row.get(field).is_some_and(|v| values.contains(v)));
        Ok((before - doc.rows.len()) as u64)
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn db_type(&self) -> &str {
        &self.name
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Record;

    fn row(id: i64) -> RawRow {
        let mut row = RawRow::new();
        row.insert("entity_id".into(), Value::Int(id));
        row
    }

    #[tokio::test]
    async fn test_paging_ends_with_empty_page() {
        let store = MemoryStore::new("memory", 2);
        store.create_document("sales_order", ["entity_id"], Some("entity_id"));
        store
            .insert_rows("sales_order", (1..=3).map(row).collect())
            .unwrap();

        assert_eq!(store.get_records("sales_order", 0).await.unwrap().len(), 2);
        assert_eq!(store.get_records("sales_order", 1).await.unwrap().len(), 1);
        assert!(store.get_records("sales_order", 2).await.unwrap().is_empty());
        assert_eq!(store.page_fetches("sales_order"), 3);
        assert_eq!(store.get_records_count("sales_order").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_save_and_clear() {
        let store = MemoryStore::new("memory", 10);
        store.create_document("sales_order", ["entity_id", "status"], None);
        let doc = store.get_document("sales_order").await.unwrap().unwrap();

        let mut records = RecordCollection::new(&doc);
        let mut record = Record::new(&doc);
        record.set_value("entity_id", Value::Int(7)).unwrap();
        records.add_record(record).unwrap();

        assert_eq!(store.save_records("sales_order", &records).await.unwrap(), 1);
        let rows = store.rows("sales_order");
        assert_eq!(rows[0].get("entity_id"), Some(&Value::Int(7)));
        assert_eq!(rows[0].get("status"), Some(&Value::Null));

        store.clear_document("sales_order").await.unwrap();
        assert!(store.rows("sales_order").is_empty());
    }

    #[tokio::test]
    async fn test_delete_records_by_field() {
        let store = MemoryStore::new("memory", 10);
        store.create_document("sales_order", ["entity_id"], None);
        store
            .insert_rows("sales_order", vec![row(1), row(2), row(3), row(2)])
            .unwrap();

        let removed = store
            .delete_records("sales_order", "entity_id", &[Value::Int(2), Value::Int(9)])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.rows("sales_order"), vec![row(1), row(3)]);

        let removed = store
            .delete_records("sales_order", "entity_id", &[])
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(store.rows("sales_order").len(), 2);
    }

    #[tokio::test]
    async fn test_injected_save_failure() {
        let store = MemoryStore::new("memory", 10);
        store.create_document("sales_order", ["entity_id"], None);
        store.fail_save_at("sales_order", 1);
        let doc = store.get_document("sales_order").await.unwrap().unwrap();

        let mut records = RecordCollection::new(&doc);
        records
            .add_record(Record::with_data(&doc, row(1)))
            .unwrap();

        assert!(store.save_records("sales_order", &records).await.is_ok());
        assert!(store.save_records("sales_order", &records).await.is_err());
        assert_eq!(store.rows("sales_order").len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_document() {
        let store = MemoryStore::new("memory", 10);
        assert!(store.get_document("missing").await.unwrap().is_none());
        assert!(matches!(
            store.get_records("missing", 0).await,
            Err(MigrateError::DocumentNotFound(_))
        ));
    }
}
