use std::clone::Clone;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Wrapper struct containing an `Arc<Mutex<T>>`.
///
/// Clones share the same value, so the wrapper can be handed to other tasks and threads.
/// Guards returned by [`WrappedArcMutex::lock`] must never be held across an `.await`;
/// the crate denies `clippy::await_holding_lock` to enforce it.
///
/// Lock poisoning is ignored.
pub struct WrappedArcMutex<T: ?Sized> {
    inner: Arc<Mutex<T>>,
}

impl<T> WrappedArcMutex<T> {
    #[inline]
    pub fn wrap(t: T) -> Self {
        WrappedArcMutex {
            inner: Arc::new(Mutex::new(t)),
        }
    }
}

impl<T: ?Sized> WrappedArcMutex<T> {
    #[inline]
    #[track_caller]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the number of handles pointing to the shared value.
    #[inline]
    pub fn get_num_refs(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<T: ?Sized> Clone for WrappedArcMutex<T> {
    #[inline]
    fn clone(&self) -> Self {
        WrappedArcMutex {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Default> Default for WrappedArcMutex<T> {
    fn default() -> Self {
        Self::wrap(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for WrappedArcMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedArcMutex")
            .field("inner", &self.inner)
            .finish()
    }
}
