//! Attribute metadata resolution against the destination metadata document.
//!
//! [`AttributeResolver::resolve`] performs the full paged scan for one code.
//! [`AttributeResolver::build_index`] performs one scan for every configured
//! code and is what the pipeline uses; both keep the first match in scan order.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::MetadataFields;
use crate::core::{RawRow, ResourceStore, Value};
use crate::error::Result;

/// Identity of an attribute in the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMetadata {
    /// Attribute code the metadata was resolved for.
    pub code: String,
    /// Destination attribute id.
    pub attribute_id: i64,
    /// Owning entity type id.
    pub entity_type_id: i64,
}

/// Precomputed attribute code to metadata lookup.
#[derive(Debug, Clone, Default)]
pub struct AttributeIndex {
    entries: IndexMap<String, AttributeMetadata>,
    unresolved: Vec<String>,
}

impl AttributeIndex {
    /// Build an index directly from resolved metadata.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = AttributeMetadata>,
    {
        let mut index = Self::default();
        for meta in entries {
            index.entries.entry(meta.code.clone()).or_insert(meta);
        }
        index
    }

    /// Metadata for a code, if it was resolved.
    pub fn get(&self, code: &str) -> Option<&AttributeMetadata> {
        self.entries.get(code)
    }

    /// Distinct attribute ids of the resolved codes, in resolution order.
    pub fn attribute_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = Vec::with_capacity(self.entries.len());
        for meta in self.entries.values() {
            if !ids.contains(&meta.attribute_id) {
                ids.push(meta.attribute_id);
            }
        }
        ids
    }

    /// Codes that were requested but had no metadata.
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    /// Number of resolved codes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no code was resolved.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Scans the metadata document of a destination store.
pub struct AttributeResolver {
    store: Arc<dyn ResourceStore>,
    document: String,
    fields: MetadataFields,
}

impl AttributeResolver {
    /// Create a resolver for `document` in `store`.
    pub fn new(store: Arc<dyn ResourceStore>, document: impl Into<String>, fields: MetadataFields) -> Self {
        Self {
            store,
            document: document.into(),
            fields,
        }
    }

    /// Resolve one attribute code.
    ///
    /// Every page is read even after a match; the first match is kept.
    pub async fn resolve(&self, code: &str) -> Result<Option<AttributeMetadata>> {
        let mut found = None;
        let mut page = 0;
        loop {
            let rows = self.store.get_records(&self.document, page).await?;
            if rows.is_empty() {
                break;
            }
            page += 1;
            if found.is_none() {
                found = rows.iter().find_map(|row| self.match_row(row, code));
            }
        }
        debug!("{}: scanned {} pages for {}", self.document, page, code);
        Ok(found)
    }

    /// Resolve every code in one scan.
    ///
    /// Unresolved codes are logged once here and listed on the index.
    pub async fn build_index(&self, codes: &[String]) -> Result<AttributeIndex> {
        let mut index = AttributeIndex::default();
        let mut page = 0;
        loop {
            let rows = self.store.get_records(&self.document, page).await?;
            if rows.is_empty() {
                break;
            }
            page += 1;
            for row in &rows {
                for code in codes {
                    if index.entries.contains_key(code) {
                        continue;
                    }
                    if let Some(meta) = self.match_row(row, code) {
                        index.entries.insert(code.clone(), meta);
                    }
                }
            }
        }

        for code in codes {
            if !index.entries.contains_key(code) {
                warn!(
                    "No attribute metadata for '{}' in {}; values for it will not be mirrored",
                    code, self.document
                );
                index.unresolved.push(code.clone());
            }
        }

        debug!(
            "{}: indexed {}/{} attribute codes from {} pages",
            self.document,
            index.len(),
            codes.len(),
            page
        );
        Ok(index)
    }

    fn match_row(&self, row: &RawRow, code: &str) -> Option<AttributeMetadata> {
        let row_code = row.get(&self.fields.code).and_then(Value::as_str)?;
        if row_code != code {
            return None;
        }

        let attribute_id = row.get(&self.fields.attribute_id).and_then(Value::as_i64);
        let entity_type_id = row.get(&self.fields.entity_type_id).and_then(Value::as_i64);
        match (attribute_id, entity_type_id) {
            (Some(attribute_id), Some(entity_type_id)) => Some(AttributeMetadata {
                code: code.to_string(),
                attribute_id,
                entity_type_id,
            }),
            _ => {
                warn!(
                    "{}: metadata row for '{}' has non-integer ids, ignoring it",
                    self.document, code
                );
                None
            }
        }
    }
}
