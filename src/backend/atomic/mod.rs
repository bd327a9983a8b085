//! Spin-locked pointer cells shared by the symbol table and rule caches.
//!
//! Every cell here packs its lock into the pointer word itself: a sentinel
//! address marks the cell as held, anything else is the published content.
//! Holders never block on an OS primitive; waiters spin with
//! [`crossbeam_utils::Backoff`].

mod free_list;
mod slot;
mod swap_lock;

pub use free_list::FreeList;
pub use slot::{AtomicSlot, SlotGuard};
pub use swap_lock::{SwapGuard, SwapLock};

use std::sync::atomic::{AtomicPtr, Ordering};

use crossbeam_utils::Backoff;

/// Address stored while a cell is held. No allocation can start at the last
/// byte of the address space, and the dangling pointer of a boxed zero-sized
/// value is its alignment (a power of two), so it never aliases content.
#[inline]
fn locked<T>() -> *mut T {
    usize::MAX as *mut T
}

/// Spins until the word holds something other than the lock sentinel and
/// swaps the sentinel in, returning what was there.
#[inline]
fn acquire<T>(word: &AtomicPtr<T>) -> *mut T {
    let backoff = Backoff::new();
    loop {
        let current = word.load(Ordering::Relaxed);
        if current != locked::<T>()
            && word
                .compare_exchange_weak(current, locked(), Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        {
            return current;
        }
        backoff.snooze();
    }
}

#[inline]
fn release<T>(word: &AtomicPtr<T>, content: *mut T) {
    debug_assert!(content != locked::<T>());
    word.store(content, Ordering::Release);
}
