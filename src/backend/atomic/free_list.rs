use std::mem::ManuallyDrop;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Owned};

/// Bounded lock-free stack of spare values (Treiber's algorithm).
///
/// Pushing onto a full list hands the value back so the caller can simply
/// drop it. The bound is approximate under contention but never exceeded.
pub struct FreeList<T> {
    head: Atomic<Node<T>>,
    len: AtomicUsize,
    capacity: usize,
}

struct Node<T> {
    // Moved out by `pop`; the node itself is destroyed later by the epoch.
    data: ManuallyDrop<T>,
    next: Atomic<Node<T>>,
}

impl<T> FreeList<T> {
    pub fn new(capacity: usize) -> Self {
        FreeList {
            head: Atomic::null(),
            len: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, value: T) -> Result<(), T> {
        if self.len.fetch_add(1, Ordering::AcqRel) >= self.capacity {
            self.len.fetch_sub(1, Ordering::AcqRel);
            return Err(value);
        }

        let guard = &epoch::pin();
        let mut node = Owned::new(Node {
            data: ManuallyDrop::new(value),
            next: Atomic::null(),
        });
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            node.next.store(head, Ordering::Relaxed);
            match self
                .head
                .compare_exchange(head, node, Ordering::Release, Ordering::Acquire, guard)
            {
                Ok(_) => return Ok(()),
                Err(e) => node = e.new,
            }
        }
    }

    pub fn pop(&self) -> Option<T> {
        let guard = &epoch::pin();
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            // SAFETY: nodes are only destroyed through the epoch guard.
            let node = unsafe { head.as_ref() }?;
            let next = node.next.load(Ordering::Acquire, guard);
            if self
                .head
                .compare_exchange(head, next, Ordering::Release, Ordering::Acquire, guard)
                .is_ok()
            {
                self.len.fetch_sub(1, Ordering::AcqRel);
                // SAFETY: winning the exchange makes us the only owner of the
                // data; `ManuallyDrop` keeps the deferred destroy from
                // dropping it a second time.
                unsafe {
                    let data = ptr::read(&node.data);
                    guard.defer_destroy(head);
                    return Some(ManuallyDrop::into_inner(data));
                }
            }
        }
    }

    /// Drops every spare value.
    pub fn clear(&self) {
        while self.pop().is_some() {}
    }
}

impl<T> Drop for FreeList<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

unsafe impl<T: Send> Send for FreeList<T> {}
unsafe impl<T: Send> Sync for FreeList<T> {}
