//! rc-handles: a single-threaded ownership runtime with strong/weak shared
//! handles over explicit control blocks, plus an exclusive handle with a
//! pluggable destruction policy.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a correct object-lifetime protocol under aliasing, polymorphic
//!   storage, weak references and self-referential construction, built on
//!   raw allocations rather than on `std::rc::Rc`.
//! - Layers:
//!   - tokens: `Counter<Strong>` / `Counter<Weak>` with zero-sized linear
//!     tokens; every counted unit is a token that must be given back.
//!   - control_block: `BlockHeader` + two block layouts (`PointerBlock` for an
//!     externally allocated object, `EmbeddedBlock` for object-in-block). The
//!     release protocol lives here and nowhere else.
//!   - SharedHandle / WeakHandle: front ends that only take and return units.
//!   - SelfRef: an uncounted back-reference so an object can mint handles to
//!     itself.
//!   - ExclusiveHandle: single owner, no block; (pointer, policy) stored in a
//!     `CompressedPair` so a stateless policy costs nothing.
//!
//! Constraints
//! - Single-threaded: handles over blocks are `!Send`/`!Sync` (no atomics).
//!   A thread-safe variant would need atomic counts and a CAS loop in
//!   `Count::try_get` for promotion.
//! - The object is alive iff strong > 0; the block is alive iff
//!   strong + weak > 0. Destruction is synchronous, in the operation that
//!   takes strong to zero.
//! - `make_shared` performs one allocation for block and object.
//!
//! Equality
//! - `SharedHandle` equality and hashing use the access-pointer address.
//!   Two projections of one aggregate to different fields are unequal; use
//!   `owner_eq` to compare blocks.
//!
//! Preconditions
//! - Over-release, double wiring of a self-reference and destroying an
//!   unconstructed embedded object are contract violations. They are checked
//!   in debug builds and with the `hardened` feature; counter underflow is
//!   always checked.
//!
//! Overflow semantics
//! - Count overflow aborts, matching `Rc`.
//!
//! Notes and non-goals
//! - No cycle collection; break cycles with `WeakHandle`.
//! - No unsizing coercions on stable Rust; `SharedHandle::project` and
//!   `SharedHandle::map` produce trait-object handles instead.

macro_rules! precondition {
    ($cond:expr, $($arg:tt)+) => {
        if cfg!(any(debug_assertions, feature = "hardened")) {
            assert!($cond, $($arg)+);
        }
    };
}

mod compressed_pair;
mod control_block;
mod deleter;
mod error;
mod exclusive;
mod self_ref;
mod shared;
mod tokens;
mod weak;

// Public surface
pub use compressed_pair::CompressedPair;
pub use deleter::{DefaultDelete, Deleter, FnDeleter};
pub use error::HandleError;
pub use exclusive::ExclusiveHandle;
pub use self_ref::{SelfRef, SelfReferencing};
pub use shared::{make_shared, make_shared_with, SharedHandle};
pub use weak::WeakHandle;
