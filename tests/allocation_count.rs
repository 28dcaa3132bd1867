// Allocation accounting for the two block layouts.
//
// A counting global allocator records allocations per thread, so parallel
// tests in this binary do not disturb each other's numbers.
//
// Verifies:
// - make_shared: one allocation (block + object), freed exactly once.
// - from_box: two allocations (object, then block), both freed.
// - A weak handle delays the block's deallocation but not the object's drop.
use rc_handles::{make_shared, SharedHandle};
use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

struct CountingAlloc;

thread_local! {
    static ALLOCS: Cell<usize> = const { Cell::new(0) };
    static FREES: Cell<usize> = const { Cell::new(0) };
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = ALLOCS.try_with(|c| c.set(c.get() + 1));
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let _ = FREES.try_with(|c| c.set(c.get() + 1));
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

fn snapshot() -> (usize, usize) {
    (ALLOCS.with(Cell::get), FREES.with(Cell::get))
}

struct Payload([u64; 4]);

#[test]
fn make_shared_is_a_single_allocation() {
    let (a0, f0) = snapshot();
    let h = make_shared(Payload([1, 2, 3, 4]));
    let h2 = h.clone();
    let (a1, f1) = snapshot();
    assert_eq!(a1 - a0, 1);
    assert_eq!(f1 - f0, 0);
    assert_eq!(h2.0[3], 4);

    drop(h);
    drop(h2);
    let (a2, f2) = snapshot();
    assert_eq!(a2 - a0, 1);
    assert_eq!(f2 - f0, 1);
}

#[test]
fn from_box_uses_separate_block() {
    let (a0, f0) = snapshot();
    let h = SharedHandle::from_box(Box::new(Payload([0; 4])));
    let (a1, _) = snapshot();
    assert_eq!(a1 - a0, 2);
    drop(h);
    let (_, f2) = snapshot();
    assert_eq!(f2 - f0, 2);
}

#[test]
fn weak_handle_defers_block_free() {
    let (_, f0) = snapshot();
    let h = make_shared(Payload([0; 4]));
    let w = h.downgrade();
    drop(h);
    assert!(w.expired());
    let (_, f1) = snapshot();
    assert_eq!(f1 - f0, 0);
    drop(w);
    let (_, f2) = snapshot();
    assert_eq!(f2 - f0, 1);
}
