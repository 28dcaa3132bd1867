//! Lifetime-tied linear tokens and the strong/weak counters of a control block.
//!
//! Tokens are zero-sized proofs that a unit was acquired from a particular
//! kind of counter. Dropping a token panics; the only valid way to dispose of
//! it is to return it to a counter of the same kind via `Count::put`. Every
//! handle that contributes to a count carries exactly one token, so a handle
//! can never give back a unit it did not take.

use core::cell::Cell;
use core::fmt;
use core::marker::PhantomData;

/// Zero-sized, linear token tied to its originating counter type via lifetime.
pub struct Token<'a, C: ?Sized> {
    // Lifetime is tracked separately from the counter type to avoid
    // imposing `'a` bounds on `C`.
    _lt: PhantomData<&'a ()>,
    _ctr: PhantomData<*const C>,
}

impl<'a, C: ?Sized> Token<'a, C> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            _lt: PhantomData,
            _ctr: PhantomData,
        }
    }
}

impl<'a, C: ?Sized> Drop for Token<'a, C> {
    fn drop(&mut self) {
        // A panicking destructor further up already broke the protocol; leaking
        // the unit is the only sound outcome, so don't turn it into an abort.
        if !std::thread::panicking() {
            panic!("Token dropped without Count::put");
        }
    }
}

/// A source of counted references, enforced by linear Token flow.
pub trait Count {
    /// The token type minted by this counter.
    type Token<'a>: Sized
    where
        Self: 'a;

    /// Acquire one counted reference and return a linear token for it.
    ///
    /// Tokens are minted with a 'static lifetime parameter. They remain
    /// branded by counter type and are covariantly shortened in `put`.
    fn get(&self) -> Self::Token<'static>;

    /// Acquire one counted reference only if the count is currently nonzero.
    ///
    /// This is the promotion primitive. A thread-safe counter would implement
    /// it as a compare-and-exchange loop; here the check and the increment
    /// cannot be interleaved.
    fn try_get(&self) -> Option<Self::Token<'static>>;

    /// Return (consume) a previously acquired token.
    /// Returns true if the count is now zero.
    fn put<'a>(&'a self, t: Self::Token<'a>) -> bool;

    /// Current number of outstanding units.
    fn count(&self) -> usize;
}

/// Marker for the strong (owning) side of a control block.
#[derive(Debug)]
pub enum Strong {}

/// Marker for the weak (observing) side of a control block.
#[derive(Debug)]
pub enum Weak {}

/// Single-threaded counter, branded by the side of the block it counts.
pub struct Counter<K> {
    count: Cell<usize>,
    _kind: PhantomData<K>,
}

pub type StrongCounter = Counter<Strong>;
pub type WeakCounter = Counter<Weak>;

impl<K> Counter<K> {
    pub const fn new(initial: usize) -> Self {
        Self {
            count: Cell::new(initial),
            _kind: PhantomData,
        }
    }
}

impl<K> fmt::Debug for Counter<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Counter").field(&self.count.get()).finish()
    }
}

impl<K: 'static> Count for Counter<K> {
    type Token<'a>
        = Token<'a, Self>
    where
        Self: 'a;

    #[inline]
    fn get(&self) -> Self::Token<'static> {
        let c = self.count.get();
        let n = c.wrapping_add(1);
        self.count.set(n);
        if n == 0 {
            // Follow Rc semantics: abort on overflow rather than continue unsafely.
            std::process::abort();
        }
        Token::<'static, Self>::new()
    }

    #[inline]
    fn try_get(&self) -> Option<Self::Token<'static>> {
        if self.count.get() == 0 {
            None
        } else {
            Some(self.get())
        }
    }

    #[inline]
    fn put<'a>(&'a self, t: Self::Token<'a>) -> bool {
        let c = self.count.get();
        assert!(c > 0, "Counter underflow");
        let n = c - 1;
        self.count.set(n);
        core::mem::forget(t);
        n == 0
    }

    #[inline]
    fn count(&self) -> usize {
        self.count.get()
    }
}

/// Token for one strong unit, as held by a `SharedHandle`.
pub type StrongToken = Token<'static, StrongCounter>;
/// Token for one weak unit, as held by a `WeakHandle`.
pub type WeakToken = Token<'static, WeakCounter>;
