//! # sales-order-migrate
//!
//! Paged sales order migration between two schema versions.
//!
//! Each configured source document is copied page by page into its mapped
//! destination document. While rows stream through, selected source fields
//! are mirrored into an entity-attribute-value side table, keyed by the
//! attribute ids found in the destination's attribute metadata.
//!
//! - **Paged processing**: read, transform and save one page at a time
//! - **EAV mirroring**: attribute-value rows derived from source fields
//! - **Config-driven mapping**: document/field renames, ignores and handlers
//! - **Run report**: HMAC-signed JSON state file
//!
//! ## Example
//!
//! ```rust,no_run
//! use sales_order_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> sales_order_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::connect(config).await?;
//!     let result = orchestrator.perform().await?;
//!     println!("Migrated {} rows", result.rows_migrated);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod eav;
pub mod error;
pub mod mapping;
pub mod orchestrator;
pub mod progress;
pub mod state;
pub mod transfer;

// Re-exports for convenient access
pub use config::{Config, DatabaseConfig, EavConfig, MapConfig, MigrationConfig};
pub use core::{Document, RawRow, Record, RecordCollection, ResourceStore, Value};
pub use drivers::MemoryStore;
#[cfg(feature = "mysql")]
pub use drivers::MysqlStore;
pub use error::{MigrateError, Result};
pub use orchestrator::{DocumentCount, HealthCheckResult, MigrationResult, Orchestrator};
pub use progress::{JsonProgress, LogProgress, NoProgress, ProgressMode};
pub use state::MigrationState;
