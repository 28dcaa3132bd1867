// ExclusiveHandle test suite.
//
// Invariants exercised:
// - The destruction policy runs exactly once per resource (drop, reset,
//   reassignment), never on release, and also on null at drop.
// - Resetting to the pointer already held is a no-op.
// - A stateless policy adds no space; a stateful one is stored normally.
use rc_handles::{
    CompressedPair, DefaultDelete, Deleter, ExclusiveHandle, FnDeleter, SharedHandle,
};
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;
use std::rc::Rc;

// Stateful policy recording every pointer it was handed (None for null).
#[derive(Clone, Default)]
struct Recording {
    seen: Rc<RefCell<Vec<Option<usize>>>>,
}

impl Recording {
    fn calls(&self) -> Vec<Option<usize>> {
        self.seen.borrow().clone()
    }
}

impl<T> Deleter<T> for Recording {
    unsafe fn delete(&mut self, ptr: Option<NonNull<T>>) {
        self.seen
            .borrow_mut()
            .push(ptr.map(|p| p.as_ptr() as usize));
        DefaultDelete.delete(ptr);
    }
}

thread_local! {
    static STATELESS_CALLS: Cell<usize> = const { Cell::new(0) };
}

// Zero-sized policy counting calls (including null) in a thread-local.
#[derive(Default)]
struct Counting;

impl<T> Deleter<T> for Counting {
    unsafe fn delete(&mut self, ptr: Option<NonNull<T>>) {
        STATELESS_CALLS.with(|c| c.set(c.get() + 1));
        DefaultDelete.delete(ptr);
    }
}

fn raw<T>(value: T) -> NonNull<T> {
    NonNull::from(Box::leak(Box::new(value)))
}

// Test: drop runs the policy once on the held resource.
#[test]
fn drop_runs_policy_once() {
    let rec = Recording::default();
    let p = raw(1u32);
    let h = unsafe { ExclusiveHandle::from_raw_with_deleter(Some(p), rec.clone()) };
    assert_eq!(*h, 1);
    drop(h);
    assert_eq!(rec.calls(), vec![Some(p.as_ptr() as usize)]);
}

// Test: drop of a null handle still calls the policy, with null.
#[test]
fn null_drop_calls_policy_with_null() {
    let rec = Recording::default();
    let h: ExclusiveHandle<u32, Recording> = ExclusiveHandle::null_with_deleter(rec.clone());
    assert!(h.is_null());
    drop(h);
    assert_eq!(rec.calls(), vec![None]);
}

// Test: move-assignment destroys the previous resource exactly once.
#[test]
fn move_assignment_destroys_previous_once() {
    let rec = Recording::default();
    let p1 = raw(1u32);
    let p2 = raw(2u32);
    let mut a = unsafe { ExclusiveHandle::from_raw_with_deleter(Some(p1), rec.clone()) };
    let b = unsafe { ExclusiveHandle::from_raw_with_deleter(Some(p2), rec.clone()) };
    a = b;
    assert_eq!(rec.calls(), vec![Some(p1.as_ptr() as usize)]);
    assert_eq!(*a, 2);
    drop(a);
    assert_eq!(
        rec.calls(),
        vec![Some(p1.as_ptr() as usize), Some(p2.as_ptr() as usize)]
    );
}

// Test: take leaves a null source and moves the resource.
#[test]
fn take_nulls_the_source() {
    let mut a = ExclusiveHandle::new(String::from("owned"));
    let b = std::mem::take(&mut a);
    assert!(a.is_null());
    assert_eq!(&*b, "owned");
}

// Test: release gives up ownership without destruction.
#[test]
fn release_skips_policy() {
    let rec = Recording::default();
    let p = raw(5u8);
    let mut h = unsafe { ExclusiveHandle::from_raw_with_deleter(Some(p), rec.clone()) };
    let released = h.release();
    assert_eq!(released, Some(p));
    assert!(h.is_null());
    drop(h);
    // Only the null call from drop.
    assert_eq!(rec.calls(), vec![None]);
    drop(unsafe { Box::from_raw(p.as_ptr()) });
}

// Test: reset variants.
// Verifies: resetting to the held pointer is a no-op; resetting to another
// pointer destroys the old one once; reset() destroys and nulls.
#[test]
fn reset_semantics() {
    let rec = Recording::default();
    let p1 = raw(1u32);
    let p2 = raw(2u32);
    let mut h = unsafe { ExclusiveHandle::from_raw_with_deleter(Some(p1), rec.clone()) };

    unsafe { h.reset_raw(Some(p1)) };
    assert!(rec.calls().is_empty());
    assert_eq!(*h, 1);

    unsafe { h.reset_raw(Some(p2)) };
    assert_eq!(rec.calls(), vec![Some(p1.as_ptr() as usize)]);

    h.reset();
    assert!(h.is_null());
    assert_eq!(rec.calls().len(), 2);

    // Null to null is also "same pointer".
    h.reset();
    assert_eq!(rec.calls().len(), 2);
}

// Test: reset_to with a box under the default policy.
#[test]
fn reset_to_box() {
    let mut h = ExclusiveHandle::new(1u64);
    h.reset_to(Box::new(2));
    assert_eq!(*h, 2);
    *h += 1;
    assert_eq!(h.get(), Some(&3));
}

thread_local! {
    static UNIT_DROPS: Cell<usize> = const { Cell::new(0) };
}

// Zero-sized: every box of it shares one dangling address.
struct Unit;

impl Drop for Unit {
    fn drop(&mut self) {
        UNIT_DROPS.with(|c| c.set(c.get() + 1));
    }
}

// Test: reset_to with zero-sized values.
// Assumes: the old and new boxes report the same address.
// Verifies: the old value is destroyed at reset time and the new one at drop,
// so nothing is skipped or leaked.
#[test]
fn reset_to_replaces_zero_sized_value() {
    UNIT_DROPS.with(|c| c.set(0));
    let mut h = ExclusiveHandle::new(Unit);
    h.reset_to(Box::new(Unit));
    assert_eq!(UNIT_DROPS.with(Cell::get), 1);
    assert!(!h.is_null());
    drop(h);
    assert_eq!(UNIT_DROPS.with(Cell::get), 2);

    let mut empty = ExclusiveHandle::from_vec(Vec::<Unit>::new());
    empty.reset_to(vec![Unit, Unit].into_boxed_slice());
    assert_eq!(empty.len(), 2);
    drop(empty);
    assert_eq!(UNIT_DROPS.with(Cell::get), 4);
}

// Test: swap exchanges pointer and policy.
#[test]
fn swap_exchanges_pair() {
    let r1 = Recording::default();
    let r2 = Recording::default();
    let p1 = raw(1u32);
    let p2 = raw(2u32);
    let mut a = unsafe { ExclusiveHandle::from_raw_with_deleter(Some(p1), r1.clone()) };
    let mut b = unsafe { ExclusiveHandle::from_raw_with_deleter(Some(p2), r2.clone()) };
    a.swap(&mut b);
    assert_eq!(*a, 2);
    drop(a);
    // a now carries r2 and p2.
    assert_eq!(r2.calls(), vec![Some(p2.as_ptr() as usize)]);
    assert!(r1.calls().is_empty());
    drop(b);
    assert_eq!(r1.calls(), vec![Some(p1.as_ptr() as usize)]);
}

// Test: stateless vs stateful policy layout.
#[test]
fn storage_is_compressed_for_stateless_policy() {
    use std::mem::size_of;
    assert_eq!(size_of::<ExclusiveHandle<u32>>(), size_of::<*mut u32>());
    assert_eq!(size_of::<ExclusiveHandle<u32, Counting>>(), size_of::<*mut u32>());
    assert!(size_of::<ExclusiveHandle<u32, Recording>>() > size_of::<*mut u32>());
    assert!(CompressedPair::<Option<NonNull<u32>>, Counting>::SECOND_IS_EMPTY);
}

// Test: a stateless policy sees the null call at drop too.
#[test]
fn stateless_policy_counts_every_call() {
    STATELESS_CALLS.with(|c| c.set(0));
    let h: ExclusiveHandle<u32, Counting> = unsafe { ExclusiveHandle::from_raw(raw(9)) };
    let n: ExclusiveHandle<u32, Counting> = ExclusiveHandle::null();
    drop(h);
    drop(n);
    assert_eq!(STATELESS_CALLS.with(Cell::get), 2);
}

// Test: array form.
// Verifies: indexed access, length, and array destruction of every element.
#[test]
fn array_handle_indexing_and_destruction() {
    let drops = Rc::new(Cell::new(0));
    struct Elem(u32, Rc<Cell<usize>>);
    impl Drop for Elem {
        fn drop(&mut self) {
            self.1.set(self.1.get() + 1);
        }
    }
    let mut arr =
        ExclusiveHandle::from_vec((0..4).map(|i| Elem(i, drops.clone())).collect::<Vec<_>>());
    assert_eq!(arr.len(), 4);
    assert_eq!(arr[2].0, 2);
    arr[2].0 = 20;
    assert_eq!(arr[2].0, 20);
    drop(arr);
    assert_eq!(drops.get(), 4);

    let empty: ExclusiveHandle<[u8]> = ExclusiveHandle::null();
    assert_eq!(empty.len(), 0);
    assert!(empty.is_empty());
}

// Test: closure policies.
#[test]
fn fn_deleter_is_invoked() {
    let calls = Rc::new(Cell::new(0));
    let c = calls.clone();
    let policy = FnDeleter(move |p: Option<NonNull<u16>>| {
        c.set(c.get() + 1);
        if let Some(p) = p {
            drop(unsafe { Box::from_raw(p.as_ptr()) });
        }
    });
    let h = unsafe { ExclusiveHandle::from_raw_with_deleter(Some(raw(3u16)), policy) };
    drop(h);
    assert_eq!(calls.get(), 1);
}

// Test: conversion into shared ownership keeps the custom policy.
// Verifies: the policy runs once, when the last strong handle drops, and not
// when the exclusive handle is consumed.
#[test]
fn into_shared_keeps_policy() {
    let rec = Recording::default();
    let p = raw(11u32);
    let ex = unsafe { ExclusiveHandle::from_raw_with_deleter(Some(p), rec.clone()) };
    let shared = SharedHandle::from(ex);
    let other = shared.clone();
    assert!(rec.calls().is_empty());
    assert_eq!(*other, 11);
    drop(shared);
    assert!(rec.calls().is_empty());
    drop(other);
    assert_eq!(rec.calls(), vec![Some(p.as_ptr() as usize)]);

    let null: ExclusiveHandle<u32> = ExclusiveHandle::null();
    assert!(SharedHandle::from(null).is_null());
}

// Test: dereferencing null is a loud failure.
#[test]
#[should_panic(expected = "dereferenced a null ExclusiveHandle")]
fn deref_null_panics() {
    let h: ExclusiveHandle<u8> = ExclusiveHandle::null();
    let v: u8 = *h;
    let _ = v;
}
