//! Domain layer
//!
//! Storage-agnostic locking logic. Driver-backed implementations of the
//! contracts defined here live in `crate::storage`.

pub mod locking;
