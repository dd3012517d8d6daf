//! Configuration-driven document and field mapping.
//!
//! - [`ConfigMapReader`]: answers mapping questions from the `map` config section
//! - [`MappingTransformer`]: copies fields according to the map reader and
//!   applies destination field handlers

mod transformer;

pub use transformer::{MappingTransformer, MappingTransformerFactory};

use crate::config::MapConfig;
use crate::core::{FieldHandler, MapDirection, MapReader};

/// [`MapReader`] backed by the `map` section of the configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigMapReader {
    config: MapConfig,
}

impl ConfigMapReader {
    /// Create a map reader from mapping configuration.
    pub fn new(config: MapConfig) -> Self {
        Self { config }
    }

    fn is_document_ignored(&self, source_name: &str) -> bool {
        self.config.ignore_documents.iter().any(|d| d == source_name)
    }
}

impl MapReader for ConfigMapReader {
    fn document_map(&self, name: &str, direction: MapDirection) -> Option<String> {
        match direction {
            MapDirection::Source => {
                if self.is_document_ignored(name) {
                    return None;
                }
                self.config.documents.get(name).cloned()
            }
            MapDirection::Destination => self
                .config
                .documents
                .iter()
                .find(|(source, dest)| dest.as_str() == name && !self.is_document_ignored(source))
                .map(|(source, _)| source.clone()),
        }
    }

    fn field_map(&self, document: &str, field: &str, direction: MapDirection) -> Option<String> {
        if self.is_field_ignored(document, field, direction) {
            return None;
        }
        match direction {
            MapDirection::Source => {
                let renamed = self
                    .config
                    .fields
                    .get(document)
                    .and_then(|rules| rules.rename.get(field));
                Some(renamed.cloned().unwrap_or_else(|| field.to_string()))
            }
            MapDirection::Destination => {
                // Renames are keyed by source document, so find the rule set whose
                // document maps onto this destination document.
                let source_doc = self.document_map(document, MapDirection::Destination);
                let renamed = source_doc
                    .as_deref()
                    .and_then(|doc| self.config.fields.get(doc))
                    .and_then(|rules| {
                        rules
                            .rename
                            .iter()
                            .find(|(_, dest)| dest.as_str() == field)
                            .map(|(source, _)| source.clone())
                    });
                Some(renamed.unwrap_or_else(|| field.to_string()))
            }
        }
    }

    fn is_field_ignored(&self, document: &str, field: &str, direction: MapDirection) -> bool {
        match direction {
            MapDirection::Source => self
                .config
                .fields
                .get(document)
                .is_some_and(|rules| rules.ignore.iter().any(|f| f == field)),
            MapDirection::Destination => self
                .config
                .destination_fields
                .get(document)
                .is_some_and(|rules| rules.ignore.iter().any(|f| f == field)),
        }
    }

    fn field_handler(&self, document: &str, field: &str) -> Option<&FieldHandler> {
        self.config
            .destination_fields
            .get(document)
            .and_then(|rules| rules.handlers.get(field))
    }
}
