//! Synchronization primitives: a [`Mutex`] abstraction supporting both `std` and `parking_lot`,
//! plus [`Shared`], a thin thread-safe wrapper around [`crate::PriorityTree`].
//!
//! The tree itself is single-threaded cooperative (§5): no internal locking, one owner driving
//! `next()`. [`Shared`] exists for embedders who want a drop-in thread-safe handle without
//! writing their own synchronization; it does not change the scheduling semantics, it only
//! serializes access.
//!
//! - With the `parking_lot` feature enabled, [`parking_lot::Mutex`] is used directly.
//! - Without the feature, a poison-free wrapper around [`std::sync::Mutex`] is used.

#[cfg(feature = "parking_lot")]
pub use parking_lot::Mutex;
#[cfg(not(feature = "parking_lot"))]
pub use std_mutex::Mutex;

#[cfg(not(feature = "parking_lot"))]
mod std_mutex {
    use std::{
        fmt,
        ops::{Deref, DerefMut},
        sync,
    };

    /// A `Mutex` that never poisons and has the same interface as [`std::sync::Mutex`].
    pub struct Mutex<T: ?Sized>(sync::Mutex<T>);

    impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
        fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
            fmt::Debug::fmt(&self.0, fmt)
        }
    }

    impl<T> Mutex<T> {
        /// Like [`std::sync::Mutex::new`].
        #[inline]
        pub fn new(t: T) -> Mutex<T> {
            Mutex(sync::Mutex::new(t))
        }
    }

    impl<T: ?Sized> Mutex<T> {
        /// Like [`std::sync::Mutex::lock`].
        #[inline]
        pub fn lock(&self) -> MutexGuard<'_, T> {
            MutexGuard(self.0.lock().unwrap_or_else(|e| e.into_inner()))
        }
    }

    /// Like [`std::sync::MutexGuard`].
    #[must_use]
    pub struct MutexGuard<'a, T: ?Sized + 'a>(sync::MutexGuard<'a, T>);

    impl<T: ?Sized> Deref for MutexGuard<'_, T> {
        type Target = T;

        #[inline]
        fn deref(&self) -> &T {
            self.0.deref()
        }
    }

    impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
        #[inline]
        fn deref_mut(&mut self) -> &mut T {
            self.0.deref_mut()
        }
    }
}

use crate::error::Error;
use crate::ids::Weight;
use crate::tree::PriorityTree;
use crate::StreamId;
use std::sync::Arc;

/// A thread-safe handle to a [`PriorityTree`], serializing access behind the crate's [`Mutex`]
/// abstraction.
///
/// Cloning a `Shared` is cheap (it clones an [`Arc`]); every clone refers to the same
/// underlying tree. Scheduling remains exactly as deterministic as a bare `PriorityTree`'s
/// (§5) — this wrapper only adds mutual exclusion, it does not reorder or batch calls.
#[derive(Debug, Clone)]
pub struct Shared {
    inner: Arc<Mutex<PriorityTree>>,
}

impl Shared {
    pub fn new(tree: PriorityTree) -> Self {
        Shared {
            inner: Arc::new(Mutex::new(tree)),
        }
    }

    pub fn insert_stream(
        &self,
        stream_id: StreamId,
        depends_on: Option<StreamId>,
        weight: Option<Weight>,
        exclusive: bool,
    ) -> Result<(), Error> {
        self.inner
            .lock()
            .insert_stream(stream_id, depends_on, weight, exclusive)
    }

    pub fn remove_stream(&self, stream_id: StreamId) -> Result<(), Error> {
        self.inner.lock().remove_stream(stream_id)
    }

    pub fn reprioritize(
        &self,
        stream_id: StreamId,
        depends_on: Option<StreamId>,
        weight: Option<Weight>,
        exclusive: bool,
    ) -> Result<(), Error> {
        self.inner
            .lock()
            .reprioritize(stream_id, depends_on, weight, exclusive)
    }

    pub fn block(&self, stream_id: StreamId) -> Result<(), Error> {
        self.inner.lock().block(stream_id)
    }

    pub fn unblock(&self, stream_id: StreamId) -> Result<(), Error> {
        self.inner.lock().unblock(stream_id)
    }

    pub fn next(&self) -> Result<StreamId, Error> {
        self.inner.lock().next()
    }
}
