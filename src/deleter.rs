//! Destruction policies for owned pointers.

use core::fmt;
use core::ptr::NonNull;

/// How an owned pointer is destroyed.
///
/// `None` stands for the null pointer; every policy must accept it and do
/// nothing. `ExclusiveHandle` calls the policy even when it holds null.
pub trait Deleter<T: ?Sized> {
    /// Destroy the object behind `ptr`.
    ///
    /// # Safety
    /// `ptr` must be `None` or a pointer this policy is able to destroy, owned
    /// exclusively by the caller and not used again afterwards.
    unsafe fn delete(&mut self, ptr: Option<NonNull<T>>);
}

/// Destroys through `Box`: single-object destruction for `T`, array
/// destruction for `[T]`. The variant follows from the pointee type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DefaultDelete;

impl<T: ?Sized> Deleter<T> for DefaultDelete {
    #[inline]
    unsafe fn delete(&mut self, ptr: Option<NonNull<T>>) {
        if let Some(p) = ptr {
            drop(Box::from_raw(p.as_ptr()));
        }
    }
}

/// Adapts a closure into a destruction policy.
#[derive(Clone, Default)]
pub struct FnDeleter<F>(pub F);

impl<T: ?Sized, F> Deleter<T> for FnDeleter<F>
where
    F: FnMut(Option<NonNull<T>>),
{
    #[inline]
    unsafe fn delete(&mut self, ptr: Option<NonNull<T>>) {
        (self.0)(ptr)
    }
}

impl<F> fmt::Debug for FnDeleter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnDeleter")
    }
}
