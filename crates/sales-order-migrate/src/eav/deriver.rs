//! Derivation of attribute-value rows from source rows.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{Document, RawRow, Record, Value};
use crate::error::{MigrateError, Result};

use super::metadata::AttributeIndex;

/// Source field carrying the store scope of a row.
pub const STORE_ID_FIELD: &str = "store_id";
/// Source field carrying the entity id of a row.
pub const ENTITY_ID_FIELD: &str = "entity_id";

/// Fields every attribute-value sink must have.
pub const SINK_FIELDS: [&str; 5] = [
    "attribute_id",
    "entity_type_id",
    "store_id",
    "entity_id",
    "value",
];

/// One entity-attribute-value row.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedAttributeRow {
    pub attribute_id: i64,
    pub entity_type_id: i64,
    pub store_id: Value,
    pub entity_id: Value,
    pub value: Value,
}

impl DerivedAttributeRow {
    /// Bind the row to the sink document.
    pub fn into_record(self, sink: &Document) -> Result<Record> {
        let mut record = Record::new(sink);
        record.set_value("attribute_id", Value::Int(self.attribute_id))?;
        record.set_value("entity_type_id", Value::Int(self.entity_type_id))?;
        record.set_value("store_id", self.store_id)?;
        record.set_value("entity_id", self.entity_id)?;
        record.set_value("value", self.value)?;
        Ok(record)
    }
}

/// Check that a sink document can hold derived rows.
pub fn check_sink(sink: &Document) -> Result<()> {
    let missing: Vec<&str> = SINK_FIELDS
        .iter()
        .copied()
        .filter(|f| !sink.structure().has_field(f))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(MigrateError::structure(
            sink.name(),
            format!("attribute-value sink is missing fields: {}", missing.join(", ")),
        ))
    }
}

/// Counters for derivation outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationStats {
    /// Derived rows produced.
    pub rows_emitted: u64,
    /// Attribute lookups where the source value was absent or empty.
    pub values_absent: u64,
    /// Attribute lookups skipped because the code had no metadata.
    pub metadata_missing: u64,
    /// Source rows skipped because `store_id` or `entity_id` was missing.
    pub missing_join_keys: u64,
}

impl DerivationStats {
    /// Add another set of counters to this one.
    pub fn merge(&mut self, other: &DerivationStats) {
        self.rows_emitted += other.rows_emitted;
        self.values_absent += other.values_absent;
        self.metadata_missing += other.metadata_missing;
        self.missing_join_keys += other.missing_join_keys;
    }
}

/// Rows derived from one source row, with the counters that produced them.
#[derive(Debug, Clone, Default)]
pub struct Derivation {
    pub rows: Vec<DerivedAttributeRow>,
    pub stats: DerivationStats,
}

/// Mirrors configured source fields into attribute-value rows.
#[derive(Debug, Clone)]
pub struct EavRowDeriver {
    attributes: Vec<String>,
}

impl EavRowDeriver {
    /// Create a deriver for the given attribute codes, in enumeration order.
    pub fn new(attributes: Vec<String>) -> Self {
        Self { attributes }
    }

    /// Configured attribute codes.
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Derive attribute rows for one raw source row.
    ///
    /// A row lacking `store_id` or `entity_id` emits nothing once any
    /// attribute qualifies; it is counted in `missing_join_keys`.
    pub fn derive(&self, row: &RawRow, index: &AttributeIndex) -> Derivation {
        let mut derivation = Derivation::default();

        let mut candidates = Vec::new();
        for code in &self.attributes {
            let value = match row.get(code) {
                Some(v) if !v.is_empty_equivalent() => v,
                _ => {
                    derivation.stats.values_absent += 1;
                    continue;
                }
            };
            match index.get(code) {
                Some(meta) => candidates.push((meta, value)),
                None => derivation.stats.metadata_missing += 1,
            }
        }
        if candidates.is_empty() {
            return derivation;
        }

        let (store_id, entity_id) = match (join_key(row, STORE_ID_FIELD), join_key(row, ENTITY_ID_FIELD)) {
            (Some(s), Some(e)) => (s, e),
            (store_id, _) => {
                let missing = if store_id.is_none() {
                    STORE_ID_FIELD
                } else {
                    ENTITY_ID_FIELD
                };
                let row_id = row
                    .get(ENTITY_ID_FIELD)
                    .map_or_else(|| "?".to_string(), |v| v.to_string());
                warn!(
                    "Skipping attribute derivation for row {}: {} is missing",
                    row_id, missing
                );
                derivation.stats.missing_join_keys += 1;
                return derivation;
            }
        };

        for (meta, value) in candidates {
            derivation.rows.push(DerivedAttributeRow {
                attribute_id: meta.attribute_id,
                entity_type_id: meta.entity_type_id,
                store_id: store_id.clone(),
                entity_id: entity_id.clone(),
                value: value.clone(),
            });
        }
        derivation.stats.rows_emitted = derivation.rows.len() as u64;
        derivation
    }
}

fn join_key<'a>(row: &'a RawRow, field: &str) -> Option<&'a Value> {
    row.get(field).filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DocumentStructure;
    use crate::eav::AttributeMetadata;

    fn index() -> AttributeIndex {
        AttributeIndex::from_entries([
            AttributeMetadata {
                code: "coupon_code".into(),
                attribute_id: 42,
                entity_type_id: 3,
            },
            AttributeMetadata {
                code: "reward_salesrule_points".into(),
                attribute_id: 7,
                entity_type_id: 5,
            },
        ])
    }

    fn row(pairs: &[(&str, Value)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn deriver() -> EavRowDeriver {
        EavRowDeriver::new(vec![
            "coupon_code".into(),
            "reward_salesrule_points".into(),
            "unknown_attribute".into(),
        ])
    }

    #[test]
    fn test_emits_one_row_per_present_attribute() {
        let src = row(&[
            ("entity_id", Value::Int(100)),
            ("store_id", Value::Int(1)),
            ("coupon_code", Value::Text("SAVE10".into())),
        ]);
        let out = deriver().derive(&src, &index());

        assert_eq!(
            out.rows,
            vec![DerivedAttributeRow {
                attribute_id: 42,
                entity_type_id: 3,
                store_id: Value::Int(1),
                entity_id: Value::Int(100),
                value: Value::Text("SAVE10".into()),
            }]
        );
        assert_eq!(out.stats.rows_emitted, 1);
        assert_eq!(out.stats.values_absent, 2);
    }

    #[test]
    fn test_null_and_empty_values_emit_nothing() {
        let src = row(&[
            ("entity_id", Value::Int(100)),
            ("store_id", Value::Int(1)),
            ("coupon_code", Value::Null),
            ("reward_salesrule_points", Value::Text(String::new())),
        ]);
        let out = deriver().derive(&src, &index());
        assert!(out.rows.is_empty());
        assert_eq!(out.stats.values_absent, 3);
    }

    #[test]
    fn test_missing_metadata_skips_only_that_attribute() {
        let src = row(&[
            ("entity_id", Value::Int(100)),
            ("store_id", Value::Int(1)),
            ("unknown_attribute", Value::Int(9)),
            ("reward_salesrule_points", Value::Int(15)),
        ]);
        let out = deriver().derive(&src, &index());
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].attribute_id, 7);
        assert_eq!(out.rows[0].value, Value::Int(15));
        assert_eq!(out.stats.metadata_missing, 1);
    }

    #[test]
    fn test_enumeration_order_within_row() {
        let src = row(&[
            ("reward_salesrule_points", Value::Int(15)),
            ("coupon_code", Value::Text("SAVE10".into())),
            ("entity_id", Value::Int(100)),
            ("store_id", Value::Int(1)),
        ]);
        let out = deriver().derive(&src, &index());
        let ids: Vec<i64> = out.rows.iter().map(|r| r.attribute_id).collect();
        assert_eq!(ids, vec![42, 7]);
    }

    #[test]
    fn test_missing_join_key_fails_the_row() {
        let src = row(&[
            ("entity_id", Value::Int(100)),
            ("coupon_code", Value::Text("SAVE10".into())),
        ]);
        let out = deriver().derive(&src, &index());
        assert!(out.rows.is_empty());
        assert_eq!(out.stats.missing_join_keys, 1);

        let src = row(&[
            ("entity_id", Value::Null),
            ("store_id", Value::Int(1)),
            ("coupon_code", Value::Text("SAVE10".into())),
        ]);
        let out = deriver().derive(&src, &index());
        assert!(out.rows.is_empty());
        assert_eq!(out.stats.missing_join_keys, 1);

        // no entity_id column at all
        let src = row(&[
            ("store_id", Value::Int(1)),
            ("coupon_code", Value::Text("SAVE10".into())),
        ]);
        let out = deriver().derive(&src, &index());
        assert!(out.rows.is_empty());
        assert_eq!(out.stats.missing_join_keys, 1);
    }

    #[test]
    fn test_missing_join_key_ignored_without_candidates() {
        let src = row(&[("coupon_code", Value::Null)]);
        let out = deriver().derive(&src, &index());
        assert_eq!(out.stats.missing_join_keys, 0);
    }

    #[test]
    fn test_into_record_and_sink_check() {
        let sink = Document::new("eav_entity_int", DocumentStructure::from_names(SINK_FIELDS));
        assert!(check_sink(&sink).is_ok());

        let record = DerivedAttributeRow {
            attribute_id: 42,
            entity_type_id: 3,
            store_id: Value::Int(1),
            entity_id: Value::Int(100),
            value: Value::Text("SAVE10".into()),
        }
        .into_record(&sink)
        .unwrap();
        assert_eq!(
            record.values(),
            vec![
                Value::Int(42),
                Value::Int(3),
                Value::Int(1),
                Value::Int(100),
                Value::Text("SAVE10".into())
            ]
        );

        let narrow = Document::new(
            "eav_entity_int",
            DocumentStructure::from_names(["attribute_id", "value"]),
        );
        let err = check_sink(&narrow).unwrap_err();
        assert!(err.to_string().contains("entity_type_id"));
    }

    #[test]
    fn test_stats_merge() {
        let mut total = DerivationStats::default();
        total.merge(&DerivationStats {
            rows_emitted: 2,
            values_absent: 1,
            metadata_missing: 0,
            missing_join_keys: 1,
        });
        total.merge(&DerivationStats {
            rows_emitted: 1,
            ..Default::default()
        });
        assert_eq!(total.rows_emitted, 3);
        assert_eq!(total.missing_join_keys, 1);
    }
}
