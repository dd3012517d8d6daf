//! Entity-attribute-value mirroring.
//!
//! - [`metadata`]: resolves attribute codes to destination attribute ids
//! - [`deriver`]: builds attribute-value rows from source rows

pub mod deriver;
pub mod metadata;

pub use deriver::{
    check_sink, Derivation, DerivationStats, DerivedAttributeRow, EavRowDeriver, SINK_FIELDS,
};
pub use metadata::{AttributeIndex, AttributeMetadata, AttributeResolver};
