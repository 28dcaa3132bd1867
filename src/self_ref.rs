//! Self-reference capability: an object minting handles to itself.
//!
//! The object embeds a `SelfRef<Self>` and implements `SelfReferencing` to say
//! where it lives. When the first `SharedHandle` is formed through one of the
//! `*_self_referencing` constructors, the `SelfRef` is linked to the new block.
//! The link is a back-reference: it holds no count, so it never keeps the
//! block alive. It is valid while the object is alive because the object lives
//! inside (or is owned by) that block.

use crate::control_block::BlockRef;
use crate::error::HandleError;
use crate::shared::SharedHandle;
use crate::weak::WeakHandle;
use core::cell::Cell;
use core::fmt;
use core::ptr::NonNull;

/// Uncounted back-reference from an object to its own control block.
pub struct SelfRef<T> {
    link: Cell<Option<(BlockRef, NonNull<T>)>>,
}

impl<T> SelfRef<T> {
    /// An unlinked back-reference, to be embedded in a new object.
    pub const fn new() -> Self {
        Self {
            link: Cell::new(None),
        }
    }

    /// Whether the owning object has been placed under shared ownership.
    pub fn is_linked(&self) -> bool {
        self.link.get().is_some()
    }

    /// Wire to the block that now owns `owner`.
    pub(crate) fn link(&self, block: BlockRef, ptr: NonNull<T>, owner: &T) {
        precondition!(
            self.link.get().is_none(),
            "object placed under shared ownership twice"
        );
        let base = owner as *const T as usize;
        let at = self as *const Self as usize;
        precondition!(
            at >= base
                && at + core::mem::size_of::<Self>() <= base + core::mem::size_of::<T>(),
            "SelfReferencing::self_ref must return a field of the object itself"
        );
        self.link.set(Some((block, ptr)));
    }

    /// A strong handle to the owning object.
    ///
    /// Fails with `NoOwningBlock` before the object was placed under shared
    /// ownership, and with `StaleReference` once its last strong handle is
    /// gone (i.e. from inside its destructor).
    pub fn shared(&self) -> Result<SharedHandle<T>, HandleError> {
        let (block, ptr) = self.link.get().ok_or(HandleError::NoOwningBlock)?;
        // SAFETY: this SelfRef lives inside the object, and the object lives
        // no longer than its block, so the block is still allocated.
        unsafe { SharedHandle::promote(ptr, block) }
    }

    /// A weak handle to the owning object; null if not linked.
    pub fn weak(&self) -> WeakHandle<T> {
        match self.link.get() {
            // SAFETY: as in `shared`.
            Some((block, ptr)) => unsafe { WeakHandle::observe(ptr, block) },
            None => WeakHandle::new(),
        }
    }
}

impl<T> Default for SelfRef<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SelfRef<T> {
    /// A clone belongs to a different object, so it starts unlinked.
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SelfRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelfRef")
            .field("linked", &self.is_linked())
            .finish()
    }
}

/// Objects that can produce shared and weak handles to themselves.
///
/// The link is made only by [`SharedHandle::new_self_referencing`],
/// [`SharedHandle::from_box_self_referencing`] and
/// [`SharedHandle::from_exclusive_self_referencing`]. An object placed under
/// [`make_shared`](crate::make_shared), [`SharedHandle::new`],
/// [`SharedHandle::from_box`] or any other constructor stays unlinked:
/// `shared_from_self` then reports [`HandleError::NoOwningBlock`] and
/// `weak_from_self` returns a null handle, even though the object is shared.
///
/// # Safety
/// `self_ref` must return a `SelfRef` stored directly in `self` (a plain
/// field, not behind indirection or inside a cell that allows moving it out),
/// and must return the same one on every call.
pub unsafe trait SelfReferencing: Sized {
    fn self_ref(&self) -> &SelfRef<Self>;

    /// A strong handle sharing the block of the handle that owns `self`.
    fn shared_from_self(&self) -> Result<SharedHandle<Self>, HandleError> {
        self.self_ref().shared()
    }

    /// A weak handle to `self`; null if `self` is not under shared ownership.
    fn weak_from_self(&self) -> WeakHandle<Self> {
        self.self_ref().weak()
    }
}
