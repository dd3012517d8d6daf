//! Core abstractions for store-agnostic migration.
//!
//! - [`value`]: Dynamically typed field values and raw rows
//! - [`record`]: Documents, records and page-scoped collections
//! - [`traits`]: Store, mapping, transformer and progress seams
//!
//! Everything above this module (EAV derivation, the paged batch processor,
//! the orchestrator) is written against these types only, so it can be
//! tested with the in-memory store.

pub mod record;
pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use record::{Document, DocumentStructure, Field, Record, RecordCollection};
pub use traits::{
    FieldHandler, MapDirection, MapReader, ProgressReporter, RecordTransformer, ResourceStore,
    ScalarValue, TransformerFactory,
};
pub use value::{RawRow, Value};
