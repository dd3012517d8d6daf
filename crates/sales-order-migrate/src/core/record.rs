//! Documents, records and page-scoped record collections.
//!
//! A [`Document`] is a named table-like resource with a fixed
//! [`DocumentStructure`]. A [`Record`] is one row bound to a document; writes
//! to fields outside the structure are rejected so a mapping mistake surfaces
//! at transform time instead of at the database.

use std::sync::Arc;

use crate::error::{MigrateError, Result};

use super::value::{RawRow, Value};

/// Field (column) metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Store-specific data type string (e.g. "int", "varchar").
    pub data_type: String,
}

impl Field {
    /// Create a field with an unspecified data type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: String::new(),
        }
    }

    /// Create a field with a data type.
    pub fn typed(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Ordered field list plus the key used for stable page ordering.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentStructure {
    /// Fields in ordinal order.
    pub fields: Vec<Field>,
    /// Primary key field, if the store knows one.
    pub primary_key: Option<String>,
}

impl DocumentStructure {
    /// Build a structure from plain field names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: names.into_iter().map(Field::new).collect(),
            primary_key: None,
        }
    }

    /// Set the primary key field.
    pub fn with_primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = Some(field.into());
        self
    }

    /// Check whether the structure contains a field.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Field names in ordinal order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// A named document with its structure.
///
/// Cloning is cheap: the structure is shared.
#[derive(Debug, Clone)]
pub struct Document {
    name: String,
    structure: Arc<DocumentStructure>,
}

impl Document {
    /// Create a document.
    pub fn new(name: impl Into<String>, structure: DocumentStructure) -> Self {
        Self {
            name: name.into(),
            structure: Arc::new(structure),
        }
    }

    /// Document name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Document structure.
    pub fn structure(&self) -> &DocumentStructure {
        &self.structure
    }
}

/// One row bound to a document.
#[derive(Debug, Clone)]
pub struct Record {
    document: Document,
    data: RawRow,
}

impl Record {
    /// Create an empty record for a document.
    pub fn new(document: &Document) -> Self {
        Self {
            document: document.clone(),
            data: RawRow::new(),
        }
    }

    /// Create a record from existing row data.
    pub fn with_data(document: &Document, data: RawRow) -> Self {
        Self {
            document: document.clone(),
            data,
        }
    }

    /// The document this record is bound to.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Get a field value, if set.
    pub fn get_value(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Set a field value. Fails if the document structure lacks the field.
    pub fn set_value(&mut self, field: &str, value: Value) -> Result<()> {
        if !self.document.structure().has_field(field) {
            return Err(MigrateError::structure(
                self.document.name(),
                format!("record structure does not contain field '{}'", field),
            ));
        }
        self.data.insert(field.to_string(), value);
        Ok(())
    }

    /// Raw field data as set on the record.
    pub fn data(&self) -> &RawRow {
        &self.data
    }

    /// Values in structure order; unset fields become NULL.
    pub fn values(&self) -> Vec<Value> {
        self.document
            .structure()
            .field_names()
            .map(|name| self.data.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// Page-scoped, ordered collection of records for one document.
#[derive(Debug, Clone)]
pub struct RecordCollection {
    document: Document,
    records: Vec<Record>,
}

impl RecordCollection {
    /// Create an empty collection for a document.
    pub fn new(document: &Document) -> Self {
        Self {
            document: document.clone(),
            records: Vec::new(),
        }
    }

    /// Append a record. The record must be bound to the same document.
    pub fn add_record(&mut self, record: Record) -> Result<()> {
        if record.document().name() != self.document.name() {
            return Err(MigrateError::structure(
                self.document.name(),
                format!(
                    "cannot add a record of document '{}' to this collection",
                    record.document().name()
                ),
            ));
        }
        self.records.push(record);
        Ok(())
    }

    /// The document this collection belongs to.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
