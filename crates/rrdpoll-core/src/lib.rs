//! Core library for the rrdpoll SNMP collector
//!
//! This library provides the asynchronous SNMP polling engine and its
//! supporting pieces: configuration loading, host resolution, the poll
//! scheduler, table-query evaluation and sample persistence.
//!
//! # Architecture
//!
//! - [`engine`] - Asynchronous SNMP request engine (batching, retry, demux)
//! - [`poll`] - Poll groups, items and the per-cycle scheduler
//! - [`config`] - Configuration directory parsing and source URIs
//! - [`snmp`] - SNMP v1/v2c wire types and BER codec
//! - [`resolver`] - Background hostname resolution worker
//! - [`persist`] - RRD and raw-file sample persistence
//! - [`mainloop`] - Timer wheel shared by the engine's event loop
//! - [`oid`] - Object identifier type and name resolution
//! - [`error`] - Unified error types and handling

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod mainloop;
pub mod oid;
pub mod persist;
pub mod poll;
pub mod resolver;
pub mod snmp;
pub mod testing;

// Re-exports for convenience
pub use error::{Error, Result};
