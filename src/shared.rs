//! SharedHandle: the strong front end over a control block.

use crate::control_block::{BlockRef, EmbeddedBlock, PointerBlock};
use crate::deleter::{DefaultDelete, Deleter};
use crate::error::HandleError;
use crate::exclusive::ExclusiveHandle;
use crate::self_ref::SelfReferencing;
use crate::tokens::StrongToken;
use crate::weak::WeakHandle;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::NonNull;

/// One strong unit: where the handle points, which block it counts in, and
/// the token proving the unit was taken.
struct Owned<T: ?Sized> {
    ptr: NonNull<T>,
    block: BlockRef,
    token: StrongToken,
}

/// A strong, counted reference to an object owned by a control block.
///
/// Cloning increments the block's strong count; dropping decrements it and
/// destroys the object when the count reaches zero. The access pointer may
/// differ from the owned object (see [`SharedHandle::project`]); the block
/// always tracks the original object.
///
/// Handles compare and hash by access-pointer address.
pub struct SharedHandle<T: ?Sized> {
    raw: Option<Owned<T>>,
    _owns: PhantomData<T>,
}

/// Allocate block and object together and return the first handle.
pub fn make_shared<T>(value: T) -> SharedHandle<T> {
    SharedHandle::new(value)
}

/// Like [`make_shared`], but constructs the object inside the block from `init`.
pub fn make_shared_with<T, F>(init: F) -> SharedHandle<T>
where
    F: FnOnce() -> T,
{
    let (block, ptr, token) = EmbeddedBlock::allocate_with(init);
    SharedHandle::from_owned(ptr, block, token)
}

impl<T> SharedHandle<T> {
    /// Allocate block and object together (one allocation).
    pub fn new(value: T) -> Self {
        make_shared_with(move || value)
    }
}

impl<T: SelfReferencing> SharedHandle<T> {
    /// Like [`SharedHandle::new`], and wires the object's self-reference to the block.
    pub fn new_self_referencing(value: T) -> Self {
        Self::new(value).enable_self_reference()
    }

    /// Like [`SharedHandle::from_box`], and wires the object's self-reference to the block.
    pub fn from_box_self_referencing(b: Box<T>) -> Self {
        Self::from_box(b).enable_self_reference()
    }

    /// Like the `From<ExclusiveHandle>` conversion, and wires the object's
    /// self-reference to the block.
    pub fn from_exclusive_self_referencing<D>(h: ExclusiveHandle<T, D>) -> Self
    where
        D: Deleter<T> + 'static,
    {
        Self::from(h).enable_self_reference()
    }

    fn enable_self_reference(self) -> Self {
        if let Some(o) = &self.raw {
            // SAFETY: the object is alive; this handle holds a strong unit.
            let object = unsafe { o.ptr.as_ref() };
            object.self_ref().link(o.block, o.ptr, object);
        }
        self
    }
}

impl<T: ?Sized> SharedHandle<T> {
    fn from_owned(ptr: NonNull<T>, block: BlockRef, token: StrongToken) -> Self {
        Self {
            raw: Some(Owned { ptr, block, token }),
            _owns: PhantomData,
        }
    }

    /// A handle that references nothing; `use_count() == 0`.
    pub const fn null() -> Self {
        Self {
            raw: None,
            _owns: PhantomData,
        }
    }

    /// Take shared ownership of a boxed object through a fresh pointer block.
    pub fn from_box(b: Box<T>) -> Self {
        let ptr = NonNull::from(Box::leak(b));
        // SAFETY: a leaked box is exclusively owned and destroyable by DefaultDelete.
        unsafe { Self::from_raw(ptr) }
    }

    /// Take shared ownership of `ptr`, destroyed through `Box` when the last
    /// strong handle goes away.
    ///
    /// # Safety
    /// `ptr` must come from `Box::into_raw` (or equivalent) and be owned by
    /// nothing else.
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        Self::from_raw_with_deleter(ptr, DefaultDelete)
    }

    /// Take shared ownership of `ptr`, destroyed by `deleter`.
    ///
    /// The block keeps `deleter` without exposing its type in the handle, so
    /// it may not borrow anything.
    ///
    /// # Safety
    /// `ptr` must be owned by nothing else and destroyable by `deleter`.
    pub unsafe fn from_raw_with_deleter<D>(ptr: NonNull<T>, deleter: D) -> Self
    where
        D: Deleter<T> + 'static,
    {
        let (block, token) = PointerBlock::allocate(ptr, deleter);
        Self::from_owned(ptr, block, token)
    }

    /// Promote a weak handle. Fails if it is null or its object is gone.
    pub fn from_weak(weak: &WeakHandle<T>) -> Result<Self, HandleError> {
        let (ptr, block) = weak.parts().ok_or(HandleError::StaleReference)?;
        // SAFETY: the weak handle keeps the block alive.
        let token = unsafe { block.try_acquire_strong() }.ok_or(HandleError::StaleReference)?;
        Ok(Self::from_owned(ptr, block, token))
    }

    /// Promote raw parts held by a non-owning back-reference.
    ///
    /// # Safety
    /// The block must still be allocated.
    pub(crate) unsafe fn promote(ptr: NonNull<T>, block: BlockRef) -> Result<Self, HandleError> {
        let token = block
            .try_acquire_strong()
            .ok_or(HandleError::StaleReference)?;
        Ok(Self::from_owned(ptr, block, token))
    }

    /// A weak handle observing the same object.
    pub fn downgrade(&self) -> WeakHandle<T> {
        WeakHandle::from(self)
    }

    /// Drop this handle's strong unit and become null.
    pub fn reset(&mut self) {
        if let Some(Owned { block, token, .. }) = self.raw.take() {
            // SAFETY: the token came from this block.
            unsafe { block.release_strong(token) }
        }
    }

    /// Release the current object and own `b` through a brand-new pointer block.
    pub fn reset_to(&mut self, b: Box<T>) {
        let old = core::mem::replace(self, Self::from_box(b));
        drop(old);
    }

    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(&mut self.raw, &mut other.raw);
    }

    pub fn get(&self) -> Option<&T> {
        // SAFETY: the object is alive while this handle holds a strong unit.
        self.raw.as_ref().map(|o| unsafe { o.ptr.as_ref() })
    }

    #[inline]
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.raw.as_ref().map(|o| o.ptr)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.raw.is_none()
    }

    /// Number of strong handles sharing this block; 0 for a null handle.
    pub fn use_count(&self) -> usize {
        // SAFETY: a held strong unit keeps the block alive.
        self.raw
            .as_ref()
            .map_or(0, |o| unsafe { o.block.strong_count() })
    }

    /// Number of weak handles observing this block; 0 for a null handle.
    pub fn weak_count(&self) -> usize {
        // SAFETY: as in `use_count`.
        self.raw
            .as_ref()
            .map_or(0, |o| unsafe { o.block.weak_count() })
    }

    /// Same access-pointer address, regardless of pointee type.
    pub fn ptr_eq<U: ?Sized>(&self, other: &SharedHandle<U>) -> bool {
        self.addr() == other.addr()
    }

    /// Same control block (both null also counts as the same).
    pub fn owner_eq<U: ?Sized>(&self, other: &SharedHandle<U>) -> bool {
        self.block() == other.block()
    }

    pub(crate) fn block(&self) -> Option<BlockRef> {
        self.raw.as_ref().map(|o| o.block)
    }

    fn addr(&self) -> Option<NonNull<()>> {
        self.raw.as_ref().map(|o| o.ptr.cast::<()>())
    }
}

// Aliased handles name only the pointee, while the block keeps the whole `T`.
impl<T: ?Sized + 'static> SharedHandle<T> {
    /// A new handle exposing whatever `project` borrows from the object,
    /// sharing (and incrementing) this handle's block. Null stays null.
    ///
    /// The result does not carry `T`'s lifetimes, so `T` must not borrow:
    ///
    /// ```compile_fail
    /// use rc_handles::{make_shared, SharedHandle};
    ///
    /// struct Holder<'a> {
    ///     v: &'a [u64],
    ///     n: u64,
    /// }
    ///
    /// let n;
    /// {
    ///     let v = vec![1u64, 2, 3];
    ///     let h = make_shared(Holder { v: &v, n: 7 });
    ///     n = SharedHandle::project(&h, |h| &h.n);
    /// }
    /// drop(n);
    /// ```
    pub fn project<U, F>(this: &Self, project: F) -> SharedHandle<U>
    where
        U: ?Sized,
        F: for<'a> FnOnce(&'a T) -> &'a U,
    {
        match &this.raw {
            Some(o) => {
                // SAFETY: the object is alive while `this` holds a strong unit.
                let target = NonNull::from(project(unsafe { o.ptr.as_ref() }));
                // SAFETY: as above.
                let token = unsafe { o.block.acquire_strong() };
                SharedHandle::from_owned(target, o.block, token)
            }
            None => SharedHandle::null(),
        }
    }

    /// Like [`SharedHandle::project`], but consumes `this` and moves its
    /// strong unit to the result without touching the count.
    ///
    /// ```compile_fail
    /// use rc_handles::{make_shared, SharedHandle};
    ///
    /// struct Holder<'a> {
    ///     v: &'a [u64],
    ///     n: u64,
    /// }
    ///
    /// let n;
    /// {
    ///     let v = vec![1u64, 2, 3];
    ///     let h = make_shared(Holder { v: &v, n: 7 });
    ///     n = SharedHandle::map(h, |h| &h.n);
    /// }
    /// drop(n);
    /// ```
    pub fn map<U, F>(mut this: Self, project: F) -> SharedHandle<U>
    where
        U: ?Sized,
        F: for<'a> FnOnce(&'a T) -> &'a U,
    {
        match this.raw.take() {
            Some(Owned { ptr, block, token }) => {
                // SAFETY: the unit we hold keeps the object alive.
                let target = NonNull::from(project(unsafe { ptr.as_ref() }));
                SharedHandle::from_owned(target, block, token)
            }
            None => SharedHandle::null(),
        }
    }

    /// Aliasing construction: expose `ptr` while sharing this handle's block.
    /// Returns a null handle if `this` is null.
    ///
    /// # Safety
    /// `ptr` must stay valid for as long as the block's object is alive.
    pub unsafe fn alias<U: ?Sized>(this: &Self, ptr: NonNull<U>) -> SharedHandle<U> {
        match &this.raw {
            Some(o) => SharedHandle::from_owned(ptr, o.block, o.block.acquire_strong()),
            None => SharedHandle::null(),
        }
    }
}

impl<T: ?Sized> Drop for SharedHandle<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized> Clone for SharedHandle<T> {
    fn clone(&self) -> Self {
        match &self.raw {
            // SAFETY: our own unit keeps the block and object alive.
            Some(o) => Self::from_owned(o.ptr, o.block, unsafe { o.block.acquire_strong() }),
            None => Self::null(),
        }
    }
}

impl<T: ?Sized> Default for SharedHandle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized> Deref for SharedHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Some(v) => v,
            None => panic!("dereferenced a null SharedHandle"),
        }
    }
}

impl<T: ?Sized> From<Box<T>> for SharedHandle<T> {
    fn from(b: Box<T>) -> Self {
        Self::from_box(b)
    }
}

impl<T: ?Sized, D: Deleter<T> + 'static> From<ExclusiveHandle<T, D>> for SharedHandle<T> {
    /// Moves the resource and its destruction policy into a pointer block.
    fn from(h: ExclusiveHandle<T, D>) -> Self {
        match h.into_parts() {
            // SAFETY: the exclusive handle owned `ptr` under `deleter`.
            (Some(ptr), deleter) => unsafe { Self::from_raw_with_deleter(ptr, deleter) },
            (None, _) => Self::null(),
        }
    }
}

impl<T: ?Sized> TryFrom<&WeakHandle<T>> for SharedHandle<T> {
    type Error = HandleError;

    fn try_from(weak: &WeakHandle<T>) -> Result<Self, Self::Error> {
        Self::from_weak(weak)
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<SharedHandle<U>> for SharedHandle<T> {
    fn eq(&self, other: &SharedHandle<U>) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: ?Sized> Eq for SharedHandle<T> {}

impl<T: ?Sized> Hash for SharedHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T: ?Sized> fmt::Debug for SharedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addr() {
            Some(addr) => f
                .debug_struct("SharedHandle")
                .field("ptr", &addr)
                .field("use_count", &self.use_count())
                .field("weak_count", &self.weak_count())
                .finish(),
            None => f.write_str("SharedHandle(null)"),
        }
    }
}
