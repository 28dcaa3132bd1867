//! ExclusiveHandle: single-owner pointer with a pluggable destruction policy.
//!
//! Invariants
//! - Exactly one handle owns a resource; moving transfers it.
//! - The policy runs exactly once per resource: on drop, reset or
//!   reassignment, never on `release`.
//! - Drop runs the policy even when the handle holds null.
//! - Resetting to the pointer already held is a no-op.

use crate::compressed_pair::CompressedPair;
use crate::deleter::{DefaultDelete, Deleter};
use core::fmt;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut, Index, IndexMut};
use core::ptr::NonNull;

pub struct ExclusiveHandle<T: ?Sized, D: Deleter<T> = DefaultDelete> {
    pair: CompressedPair<Option<NonNull<T>>, D>,
    _owns: PhantomData<T>,
}

// Ownership is unique, so thread-safety follows the pointee and policy, as for Box.
unsafe impl<T: ?Sized + Send, D: Deleter<T> + Send> Send for ExclusiveHandle<T, D> {}
unsafe impl<T: ?Sized + Sync, D: Deleter<T> + Sync> Sync for ExclusiveHandle<T, D> {}

#[inline]
fn same_addr<T: ?Sized>(a: Option<NonNull<T>>, b: Option<NonNull<T>>) -> bool {
    a.map(|p| p.cast::<()>()) == b.map(|p| p.cast::<()>())
}

impl<T> ExclusiveHandle<T> {
    /// Allocate `value` and take exclusive ownership of it.
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }
}

impl<T> ExclusiveHandle<[T]> {
    /// Take ownership of a vector's elements as an owned array.
    pub fn from_vec(v: Vec<T>) -> Self {
        Self::from_box(v.into_boxed_slice())
    }
}

impl<T: ?Sized> ExclusiveHandle<T> {
    pub fn from_box(b: Box<T>) -> Self {
        Self::with_parts(Some(NonNull::from(Box::leak(b))), DefaultDelete)
    }

    /// Replace the held resource with `b`, destroying the previous one.
    ///
    /// A fresh box is never the resource already held, even when zero-sized
    /// values share one dangling address, so there is no same-address check.
    pub fn reset_to(&mut self, b: Box<T>) {
        let (held, deleter) = self.pair.both_mut();
        let old = core::mem::replace(held, Some(NonNull::from(Box::leak(b))));
        // SAFETY: the handle owned `old`, and null is accepted by every policy.
        unsafe { deleter.delete(old) }
    }

    /// Give up ownership as a `Box`, or `None` if the handle is null.
    pub fn into_box(mut self) -> Option<Box<T>> {
        // SAFETY: pointers held with DefaultDelete always come from Box.
        self.release().map(|p| unsafe { Box::from_raw(p.as_ptr()) })
    }
}

impl<T: ?Sized, D: Deleter<T>> ExclusiveHandle<T, D> {
    fn with_parts(ptr: Option<NonNull<T>>, deleter: D) -> Self {
        Self {
            pair: CompressedPair::new(ptr, deleter),
            _owns: PhantomData,
        }
    }

    /// A handle that owns nothing.
    pub fn null() -> Self
    where
        D: Default,
    {
        Self::with_parts(None, D::default())
    }

    /// A null handle carrying a specific policy.
    pub fn null_with_deleter(deleter: D) -> Self {
        Self::with_parts(None, deleter)
    }

    /// Take ownership of `ptr`, destroyed later by `D::default()`.
    ///
    /// # Safety
    /// `ptr` must be exclusively owned and destroyable by `D`.
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self
    where
        D: Default,
    {
        Self::with_parts(Some(ptr), D::default())
    }

    /// Take ownership of `ptr` (or of nothing), destroyed later by `deleter`.
    ///
    /// # Safety
    /// `ptr` must be `None` or exclusively owned and destroyable by `deleter`.
    pub unsafe fn from_raw_with_deleter(ptr: Option<NonNull<T>>, deleter: D) -> Self {
        Self::with_parts(ptr, deleter)
    }

    /// Relinquish ownership without running the policy.
    pub fn release(&mut self) -> Option<NonNull<T>> {
        self.pair.first_mut().take()
    }

    /// Destroy the held resource and become null.
    pub fn reset(&mut self) {
        // SAFETY: null is accepted by every policy.
        unsafe { self.reset_raw(None) }
    }

    /// Replace the held pointer, running the policy once on the old one.
    /// Passing the address already held does nothing.
    ///
    /// # Safety
    /// `ptr` must be `None` or exclusively owned and destroyable by this
    /// handle's policy.
    pub unsafe fn reset_raw(&mut self, ptr: Option<NonNull<T>>) {
        if same_addr(*self.pair.first(), ptr) {
            return;
        }
        let (held, deleter) = self.pair.both_mut();
        let old = core::mem::replace(held, ptr);
        deleter.delete(old);
    }

    pub fn swap(&mut self, other: &mut Self) {
        self.pair.swap(&mut other.pair);
    }

    #[inline]
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        *self.pair.first()
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.pair.first().is_none()
    }

    pub fn get(&self) -> Option<&T> {
        // SAFETY: the held pointer is owned by this handle and valid while held.
        self.pair.first().map(|p| unsafe { &*p.as_ptr() })
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        // SAFETY: as in `get`; `&mut self` guarantees exclusivity.
        self.pair.first().map(|p| unsafe { &mut *p.as_ptr() })
    }

    pub fn deleter(&self) -> &D {
        self.pair.second()
    }

    pub fn deleter_mut(&mut self) -> &mut D {
        self.pair.second_mut()
    }

    /// Split into pointer and policy without running the policy.
    pub(crate) fn into_parts(self) -> (Option<NonNull<T>>, D) {
        let mut this = core::mem::ManuallyDrop::new(self);
        let ptr = this.release();
        // SAFETY: `this` is never dropped, so the policy is moved out exactly once.
        let deleter = unsafe { core::ptr::read(this.pair.second()) };
        (ptr, deleter)
    }
}

impl<T: ?Sized, D: Deleter<T>> Drop for ExclusiveHandle<T, D> {
    fn drop(&mut self) {
        let (held, deleter) = self.pair.both_mut();
        // SAFETY: the handle owns whatever it holds, and null is always accepted.
        unsafe { deleter.delete(held.take()) }
    }
}

impl<T: ?Sized, D: Deleter<T> + Default> Default for ExclusiveHandle<T, D> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized> From<Box<T>> for ExclusiveHandle<T> {
    fn from(b: Box<T>) -> Self {
        Self::from_box(b)
    }
}

impl<T: ?Sized, D: Deleter<T>> Deref for ExclusiveHandle<T, D> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Some(v) => v,
            None => panic!("dereferenced a null ExclusiveHandle"),
        }
    }
}

impl<T: ?Sized, D: Deleter<T>> DerefMut for ExclusiveHandle<T, D> {
    fn deref_mut(&mut self) -> &mut T {
        match self.get_mut() {
            Some(v) => v,
            None => panic!("dereferenced a null ExclusiveHandle"),
        }
    }
}

impl<T, D: Deleter<[T]>> ExclusiveHandle<[T], D> {
    /// Number of elements, or 0 for a null handle.
    pub fn len(&self) -> usize {
        self.get().map_or(0, <[T]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, D: Deleter<[T]>> Index<usize> for ExclusiveHandle<[T], D> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &(**self)[index]
    }
}

impl<T, D: Deleter<[T]>> IndexMut<usize> for ExclusiveHandle<[T], D> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut (**self)[index]
    }
}

impl<T: ?Sized, D: Deleter<T>> fmt::Debug for ExclusiveHandle<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_ptr() {
            Some(p) => f.debug_tuple("ExclusiveHandle").field(&p.cast::<()>()).finish(),
            None => f.write_str("ExclusiveHandle(null)"),
        }
    }
}
