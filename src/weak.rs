//! WeakHandle: a non-owning observer of a shared object.

use crate::control_block::BlockRef;
use crate::shared::SharedHandle;
use crate::tokens::WeakToken;
use core::fmt;
use core::ptr::NonNull;

struct Observed<T: ?Sized> {
    ptr: NonNull<T>,
    block: BlockRef,
    token: WeakToken,
}

/// A weak reference: keeps the control block allocated but not the object.
///
/// Promote with [`WeakHandle::lock`] (null on failure) or
/// `SharedHandle::try_from(&weak)` (error on failure).
pub struct WeakHandle<T: ?Sized> {
    raw: Option<Observed<T>>,
}

impl<T: ?Sized> WeakHandle<T> {
    /// A handle that observes nothing; always expired.
    pub const fn new() -> Self {
        Self { raw: None }
    }

    /// Observe `ptr` in `block`, taking a weak unit.
    ///
    /// # Safety
    /// The block must be alive.
    pub(crate) unsafe fn observe(ptr: NonNull<T>, block: BlockRef) -> Self {
        Self {
            raw: Some(Observed {
                ptr,
                block,
                token: block.acquire_weak(),
            }),
        }
    }

    pub(crate) fn parts(&self) -> Option<(NonNull<T>, BlockRef)> {
        self.raw.as_ref().map(|o| (o.ptr, o.block))
    }

    /// Number of strong handles to the observed object; 0 once it is gone.
    pub fn use_count(&self) -> usize {
        // SAFETY: our weak unit keeps the block allocated.
        self.raw
            .as_ref()
            .map_or(0, |o| unsafe { o.block.strong_count() })
    }

    /// Number of weak handles observing the block, this one included.
    pub fn weak_count(&self) -> usize {
        // SAFETY: as in `use_count`.
        self.raw
            .as_ref()
            .map_or(0, |o| unsafe { o.block.weak_count() })
    }

    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// A strong handle to the object, or a null handle if it is gone.
    pub fn lock(&self) -> SharedHandle<T> {
        SharedHandle::from_weak(self).unwrap_or_default()
    }

    /// Stop observing; frees the block if this was its last reference.
    pub fn reset(&mut self) {
        if let Some(Observed { block, token, .. }) = self.raw.take() {
            // SAFETY: the token came from this block.
            unsafe { block.release_weak(token) }
        }
    }

    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(&mut self.raw, &mut other.raw);
    }

    /// Same control block (both null also counts as the same).
    pub fn owner_eq<U: ?Sized>(&self, other: &WeakHandle<U>) -> bool {
        self.raw.as_ref().map(|o| o.block) == other.raw.as_ref().map(|o| o.block)
    }

    /// Whether this handle observes the block `shared` counts in.
    pub fn observes<U: ?Sized>(&self, shared: &SharedHandle<U>) -> bool {
        self.raw.as_ref().map(|o| o.block) == shared.block()
    }
}

impl<T: ?Sized> Drop for WeakHandle<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        match &self.raw {
            // SAFETY: our own weak unit keeps the block allocated.
            Some(o) => unsafe { Self::observe(o.ptr, o.block) },
            None => Self::new(),
        }
    }
}

impl<T: ?Sized> Default for WeakHandle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> From<&SharedHandle<T>> for WeakHandle<T> {
    fn from(shared: &SharedHandle<T>) -> Self {
        match (shared.as_ptr(), shared.block()) {
            // SAFETY: the strong unit held by `shared` keeps the block alive.
            (Some(ptr), Some(block)) => unsafe { Self::observe(ptr, block) },
            _ => Self::new(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for WeakHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.raw {
            Some(o) => f
                .debug_struct("WeakHandle")
                .field("ptr", &o.ptr.cast::<()>())
                .field("use_count", &self.use_count())
                .field("weak_count", &self.weak_count())
                .finish(),
            None => f.write_str("WeakHandle(null)"),
        }
    }
}
