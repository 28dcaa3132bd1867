//! Two-field storage that spends no space on a stateless second field.
//!
//! Zero-sized types occupy no bytes inside a Rust struct, so a stateless
//! destruction policy stored next to a pointer leaves the pair exactly
//! pointer-sized. A stateful policy is stored as an ordinary field.
//! `SECOND_IS_EMPTY` exposes the compile-time check.

use core::mem;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CompressedPair<F, S> {
    first: F,
    second: S,
}

impl<F, S> CompressedPair<F, S> {
    /// True when `S` is stateless and the pair is the size of `F` alone
    /// (modulo `F`'s own alignment).
    pub const SECOND_IS_EMPTY: bool = mem::size_of::<S>() == 0;

    pub const fn new(first: F, second: S) -> Self {
        Self { first, second }
    }

    #[inline]
    pub fn first(&self) -> &F {
        &self.first
    }

    #[inline]
    pub fn first_mut(&mut self) -> &mut F {
        &mut self.first
    }

    #[inline]
    pub fn second(&self) -> &S {
        &self.second
    }

    #[inline]
    pub fn second_mut(&mut self) -> &mut S {
        &mut self.second
    }

    /// Borrow both halves mutably at once.
    #[inline]
    pub fn both_mut(&mut self) -> (&mut F, &mut S) {
        (&mut self.first, &mut self.second)
    }

    pub fn into_parts(self) -> (F, S) {
        (self.first, self.second)
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }
}
