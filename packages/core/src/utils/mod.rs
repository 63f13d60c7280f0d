//! Utility functions for synchub-core
//!
//! JSON merge-patch (RFC 7396) and UUID helpers shared across the codebase.

mod ids;
mod merge;

pub use ids::{generate_id, validate_id};
pub use merge::merge_patch;
