//! Shared types for the Angel synchronization engine
//!
//! Provides the data model, error taxonomy, event bus, and configuration
//! used by the `angel-sync` engine crate. Nothing in here performs I/O
//! beyond configuration file loading.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};
