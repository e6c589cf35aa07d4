//! Book metadata domain entities.
//!
//! Providers construct fresh instances per call. The aggregation layer only
//! filters, merges and reorders them.

mod types;

pub use types::*;
