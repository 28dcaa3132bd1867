//! Control blocks: the shared ledger behind `SharedHandle` and `WeakHandle`.
//!
//! A block starts with a `BlockHeader` (counts plus a static table of the
//! block's two lifecycle operations) and is followed by variant-specific
//! storage. Handles keep a thin `BlockRef` to the header and never learn which
//! variant they point at; the header's table dispatches to the right one.
//!
//! Release protocol (the only place objects are destroyed or blocks freed):
//! - strong 1 -> 0: decrement, then destroy the object while holding a
//!   temporary weak unit, then free the block if no weak units remain.
//! - weak 1 -> 0 with strong == 0: free the block.

use crate::deleter::Deleter;
use crate::tokens::{Count, StrongCounter, StrongToken, WeakCounter, WeakToken};
use core::cell::{Cell, UnsafeCell};
use core::mem::MaybeUninit;
use core::ptr::NonNull;
use log::trace;

/// Strong and weak counts of one block.
#[derive(Debug)]
pub(crate) struct Counts {
    pub(crate) strong: StrongCounter,
    pub(crate) weak: WeakCounter,
}

/// Per-variant lifecycle operations, shared by every block of one concrete type.
pub(crate) struct BlockOps {
    destroy_object: unsafe fn(NonNull<BlockHeader>),
    free_block: unsafe fn(NonNull<BlockHeader>),
    kind: &'static str,
}

#[repr(C)]
pub(crate) struct BlockHeader {
    counts: Counts,
    ops: &'static BlockOps,
}

impl BlockHeader {
    fn new<B: ControlBlock>() -> Self {
        Self {
            counts: Counts {
                strong: StrongCounter::new(0),
                weak: WeakCounter::new(0),
            },
            ops: ops::<B>(),
        }
    }
}

/// A concrete control block layout.
///
/// # Safety
/// Implementors must be `#[repr(C)]` with a `BlockHeader` as the first field,
/// be allocated through `Box`, and destroy the owned object at most once.
pub(crate) unsafe trait ControlBlock: Sized {
    const KIND: &'static str;

    /// Destroy the owned object. Called once, when the strong count reaches zero.
    ///
    /// # Safety
    /// `this` must point to a live block whose object has not been destroyed.
    unsafe fn destroy_object(this: NonNull<Self>);
}

fn ops<B: ControlBlock>() -> &'static BlockOps {
    &BlockOps {
        destroy_object: destroy_object_shim::<B>,
        free_block: free_block_shim::<B>,
        kind: B::KIND,
    }
}

unsafe fn destroy_object_shim<B: ControlBlock>(header: NonNull<BlockHeader>) {
    B::destroy_object(header.cast::<B>())
}

unsafe fn free_block_shim<B: ControlBlock>(header: NonNull<BlockHeader>) {
    drop(Box::from_raw(header.cast::<B>().as_ptr()))
}

/// Crate-internal access to a block. Handles reach counts and the release
/// protocol only through this type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct BlockRef(NonNull<BlockHeader>);

impl BlockRef {
    fn leak<B: ControlBlock>(block: Box<B>) -> (Self, NonNull<B>) {
        let raw = NonNull::from(Box::leak(block));
        let r = BlockRef(raw.cast::<BlockHeader>());
        trace!("allocated {} block {:p}", B::KIND, r.0);
        (r, raw)
    }

    /// # Safety
    /// The block must be alive (strong + weak > 0, or inside the release protocol).
    #[inline]
    unsafe fn header<'a>(self) -> &'a BlockHeader {
        &*self.0.as_ptr()
    }

    /// # Safety
    /// The block must be alive.
    #[inline]
    pub(crate) unsafe fn counts<'a>(self) -> &'a Counts {
        &self.header().counts
    }

    /// # Safety
    /// The block must be alive.
    #[inline]
    pub(crate) unsafe fn strong_count(self) -> usize {
        self.counts().strong.count()
    }

    /// # Safety
    /// The block must be alive.
    #[inline]
    pub(crate) unsafe fn weak_count(self) -> usize {
        self.counts().weak.count()
    }

    /// Take a strong unit. Caller must already know the object is alive.
    ///
    /// # Safety
    /// The block must be alive and its strong count nonzero.
    #[inline]
    pub(crate) unsafe fn acquire_strong(self) -> StrongToken {
        precondition!(
            self.strong_count() > 0,
            "strong unit taken from a block whose object is gone"
        );
        self.counts().strong.get()
    }

    /// Take a strong unit only if the object is still alive (promotion).
    ///
    /// # Safety
    /// The block must be alive.
    #[inline]
    pub(crate) unsafe fn try_acquire_strong(self) -> Option<StrongToken> {
        self.counts().strong.try_get()
    }

    /// # Safety
    /// The block must be alive.
    #[inline]
    pub(crate) unsafe fn acquire_weak(self) -> WeakToken {
        self.counts().weak.get()
    }

    /// Return a strong unit; destroys the object and possibly frees the block.
    ///
    /// # Safety
    /// `token` must have been taken from this block, and the caller must not
    /// use the block afterwards unless it holds another unit.
    pub(crate) unsafe fn release_strong(self, token: StrongToken) {
        let header = self.header();
        if !header.counts.strong.put(token) {
            return;
        }
        // Pin the block while the object's destructor runs; it may drop
        // weak handles to this very block.
        let pin = header.counts.weak.get();
        trace!("destroying object of {} block {:p}", header.ops.kind, self.0);
        (header.ops.destroy_object)(self.0);
        if header.counts.weak.put(pin) {
            self.free();
        }
    }

    /// Return a weak unit; frees the block if it was the last unit of any kind.
    ///
    /// # Safety
    /// `token` must have been taken from this block.
    pub(crate) unsafe fn release_weak(self, token: WeakToken) {
        let counts = self.counts();
        if counts.weak.put(token) && counts.strong.count() == 0 {
            self.free();
        }
    }

    unsafe fn free(self) {
        let header = self.header();
        debug_assert_eq!(header.counts.strong.count(), 0);
        debug_assert_eq!(header.counts.weak.count(), 0);
        trace!("freeing {} block {:p}", header.ops.kind, self.0);
        (header.ops.free_block)(self.0);
    }
}

/// Block owning an externally allocated object, destroyed through a policy.
#[repr(C)]
pub(crate) struct PointerBlock<T: ?Sized, D> {
    header: BlockHeader,
    ptr: Cell<Option<NonNull<T>>>,
    deleter: UnsafeCell<D>,
}

impl<T: ?Sized, D: Deleter<T>> PointerBlock<T, D> {
    /// Allocate a block that will hand `ptr` to `deleter` when the object dies.
    /// Returns the block with one strong unit already taken.
    ///
    /// # Safety
    /// `ptr` must be exclusively owned and valid to pass to `deleter`.
    pub(crate) unsafe fn allocate(ptr: NonNull<T>, deleter: D) -> (BlockRef, StrongToken) {
        let (block, _) = BlockRef::leak(Box::new(Self {
            header: BlockHeader::new::<Self>(),
            ptr: Cell::new(Some(ptr)),
            deleter: UnsafeCell::new(deleter),
        }));
        let token = block.counts().strong.get();
        (block, token)
    }
}

unsafe impl<T: ?Sized, D: Deleter<T>> ControlBlock for PointerBlock<T, D> {
    const KIND: &'static str = "pointer";

    unsafe fn destroy_object(this: NonNull<Self>) {
        let block = this.as_ref();
        let ptr = block.ptr.take();
        precondition!(ptr.is_some(), "pointer block destroyed its object twice");
        (*block.deleter.get()).delete(ptr);
    }
}

/// Block with the object stored inline: one allocation for both.
#[repr(C)]
pub(crate) struct EmbeddedBlock<T> {
    header: BlockHeader,
    constructed: Cell<bool>,
    slot: UnsafeCell<MaybeUninit<T>>,
}

impl<T> EmbeddedBlock<T> {
    /// Allocate a block and construct the object produced by `init` inside it.
    /// Returns the block, the object's address, and one strong unit.
    pub(crate) fn allocate_with<F>(init: F) -> (BlockRef, NonNull<T>, StrongToken)
    where
        F: FnOnce() -> T,
    {
        let block = Box::new(Self {
            header: BlockHeader::new::<Self>(),
            constructed: Cell::new(false),
            slot: UnsafeCell::new(MaybeUninit::uninit()),
        });
        // If `init` panics the box is freed with nothing constructed.
        let value = init();
        // SAFETY: the slot is uninitialized and exclusively ours.
        unsafe { (*block.slot.get()).write(value) };
        block.constructed.set(true);

        let (r, raw) = BlockRef::leak(block);
        // SAFETY: `raw` is the live allocation just leaked; the slot is initialized.
        let ptr = unsafe { NonNull::new_unchecked((*raw.as_ptr()).slot.get().cast::<T>()) };
        let token = unsafe { r.counts().strong.get() };
        (r, ptr, token)
    }
}

unsafe impl<T> ControlBlock for EmbeddedBlock<T> {
    const KIND: &'static str = "embedded";

    unsafe fn destroy_object(this: NonNull<Self>) {
        let block = this.as_ref();
        precondition!(
            block.constructed.get(),
            "embedded block destroyed an object it does not hold"
        );
        block.constructed.set(false);
        core::ptr::drop_in_place((*block.slot.get()).as_mut_ptr());
    }
}

impl<T> Drop for EmbeddedBlock<T> {
    fn drop(&mut self) {
        // Only reachable from `free`, after the object is gone, or from a
        // panicking `allocate_with` before it was constructed.
        debug_assert!(!self.constructed.get());
    }
}
