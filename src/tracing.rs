//! Shim over the `tracing` crate: a [`trace!`]/[`debug!`] surface that compiles to nothing when
//! the `tracing` feature is disabled.
//!
//! This mirrors the way the codebase this crate descends from keeps its logging calls
//! unconditional at the call site (`tracing::trace!(...)`) while the cost of the feature is
//! opt-in: without it, every macro here expands to `()`.

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, trace};

#[cfg(not(feature = "tracing"))]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use trace;
