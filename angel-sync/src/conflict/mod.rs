//! Conflict detection and resolution
//!
//! Detection scans recent results from other sources for the same task
//! type; resolution reconciles a disagreeing set into a single record
//! using the configured strategy.

pub mod detector;
pub mod resolver;

pub use detector::ConflictDetector;
pub use resolver::{Candidate, ConflictResolver};
