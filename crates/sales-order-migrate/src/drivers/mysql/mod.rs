//! MySQL/MariaDB store.
//!
//! - [`MysqlStore`]: [`ResourceStore`](crate::core::ResourceStore) over a mysql_async pool
//!
//! # Feature Flag
//!
//! This module is only available when the `mysql` feature is enabled (it is
//! on by default).
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod convert;
mod store;

pub use store::MysqlStore;
