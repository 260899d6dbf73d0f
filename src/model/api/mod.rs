//! API-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - IDs are serialised as plain strings.

pub mod ein;
pub mod email;
pub mod id;
pub mod status;
