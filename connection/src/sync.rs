//! Synchronization primitives with optional loom support.
//!
//! Re-exports the atomic types the queue core uses, switching to loom's
//! instrumented versions under the `loom` feature so the reserve/commit
//! publication protocol can be model checked.

#[cfg(not(feature = "loom"))]
pub(crate) use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

#[cfg(feature = "loom")]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
