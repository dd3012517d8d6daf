//! Field-copy record transformer driven by a [`MapReader`].

use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::{
    Document, FieldHandler, MapDirection, MapReader, Record, RecordTransformer,
    TransformerFactory, Value,
};
use crate::error::{MigrateError, Result};

/// Resolved copy plan for one document pair.
#[derive(Debug, Clone, Default)]
struct TransformPlan {
    /// (source field, destination field) pairs, in source field order.
    copies: Vec<(String, String)>,
    /// Destination field handlers, in destination field order.
    handlers: Vec<(String, FieldHandler)>,
}

/// Copies mapped fields from a source record into a destination record,
/// then applies destination field handlers.
pub struct MappingTransformer {
    source: Document,
    destination: Document,
    map_reader: Arc<dyn MapReader>,
    plan: Option<TransformPlan>,
}

impl MappingTransformer {
    /// Create an uninitialised transformer for a document pair.
    pub fn new(source: &Document, destination: &Document, map_reader: Arc<dyn MapReader>) -> Self {
        Self {
            source: source.clone(),
            destination: destination.clone(),
            map_reader,
            plan: None,
        }
    }

    fn build_plan(&self) -> Result<TransformPlan> {
        let src_name = self.source.name();
        let dest_name = self.destination.name();
        let dest_structure = self.destination.structure();

        let mut plan = TransformPlan::default();
        for field in self.source.structure().field_names() {
            let Some(target) = self.map_reader.field_map(src_name, field, MapDirection::Source)
            else {
                debug!("{}: source field {} is ignored", src_name, field);
                continue;
            };
            if !dest_structure.has_field(&target) {
                return Err(MigrateError::structure(
                    dest_name,
                    format!(
                        "source field {}.{} maps to '{}', which the destination does not have",
                        src_name, field, target
                    ),
                ));
            }
            plan.copies.push((field.to_string(), target));
        }

        for field in dest_structure.field_names() {
            if let Some(handler) = self.map_reader.field_handler(dest_name, field) {
                plan.handlers.push((field.to_string(), handler.clone()));
                continue;
            }
            let copied = plan.copies.iter().any(|(_, d)| d == field);
            if !copied
                && !self
                    .map_reader
                    .is_field_ignored(dest_name, field, MapDirection::Destination)
            {
                warn!(
                    "{}: destination field {} is not populated by the mapping",
                    dest_name, field
                );
            }
        }

        Ok(plan)
    }

    fn apply_handler(destination: &mut Record, field: &str, handler: &FieldHandler) -> Result<()> {
        match handler {
            FieldHandler::SetValue(value) => {
                let value = value.clone().map_or(Value::Null, Value::from);
                destination.set_value(field, value)
            }
            FieldHandler::Convert(map) => {
                let current = destination.get_value(field).cloned().unwrap_or(Value::Null);
                if current.is_null() {
                    return Ok(());
                }
                match map.get(&current.to_string()) {
                    Some(replacement) => destination.set_value(field, Value::Text(replacement.clone())),
                    None => Ok(()),
                }
            }
        }
    }
}

impl RecordTransformer for MappingTransformer {
    fn init(&mut self) -> Result<()> {
        if self.plan.is_some() {
            return Err(MigrateError::transform(
                self.destination.name(),
                "transformer initialised twice",
            ));
        }
        let plan = self.build_plan()?;
        debug!(
            "{} -> {}: {} copied fields, {} handlers",
            self.source.name(),
            self.destination.name(),
            plan.copies.len(),
            plan.handlers.len()
        );
        self.plan = Some(plan);
        Ok(())
    }

    fn transform(&self, source: &Record, destination: &mut Record) -> Result<()> {
        let dest_name = self.destination.name();
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| MigrateError::transform(dest_name, "transformer used before init"))?;

        for (from, to) in &plan.copies {
            let value = source.get_value(from).cloned().unwrap_or(Value::Null);
            destination
                .set_value(to, value)
                .map_err(|e| MigrateError::transform(dest_name, e.to_string()))?;
        }
        for (field, handler) in &plan.handlers {
            Self::apply_handler(destination, field, handler)
                .map_err(|e| MigrateError::transform(dest_name, e.to_string()))?;
        }
        Ok(())
    }
}

/// Creates a [`MappingTransformer`] per document pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct MappingTransformerFactory;

impl TransformerFactory for MappingTransformerFactory {
    fn create(
        &self,
        source: &Document,
        destination: &Document,
        map_reader: Arc<dyn MapReader>,
    ) -> Box<dyn RecordTransformer> {
        Box::new(MappingTransformer::new(source, destination, map_reader))
    }
}
