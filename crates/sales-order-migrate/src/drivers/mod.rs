//! Store implementations.
//!
//! - [`memory`]: In-memory store for tests and dry runs
//! - [`mysql`]: MySQL/MariaDB store (feature `mysql`)
//!
//! # Adding New Stores
//!
//! 1. Create a module under `drivers/`
//! 2. Implement [`ResourceStore`](crate::core::ResourceStore)
//! 3. Gate the driver with a feature flag in `Cargo.toml`
//! 4. Accept its `type` in config validation and in `Orchestrator::connect`

pub mod memory;

#[cfg(feature = "mysql")]
pub mod mysql;

pub use memory::MemoryStore;

#[cfg(feature = "mysql")]
pub use mysql::MysqlStore;
