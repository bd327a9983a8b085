use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::AtomicPtr;
use std::sync::Arc;

use super::{acquire, release};

/// A single shared reference cell with lock-free-style exchange.
///
/// Holds `Option<Arc<T>>`. Readers briefly take the cell, clone the
/// reference and put it back. Writers take it with [`AtomicSlot::read_start`],
/// inspect the current content, and publish a replacement with
/// [`SlotGuard::read_end`]. The cell can be held by only one party at a time;
/// nesting is permitted only across distinct slots.
pub struct AtomicSlot<T> {
    word: AtomicPtr<T>,
    _owns: PhantomData<Option<Arc<T>>>,
}

// The slot owns an `Arc<T>` and hands out clones across threads.
unsafe impl<T: Send + Sync> Send for AtomicSlot<T> {}
unsafe impl<T: Send + Sync> Sync for AtomicSlot<T> {}

fn into_raw<T>(value: Option<Arc<T>>) -> *mut T {
    value.map_or(ptr::null_mut(), |arc| Arc::into_raw(arc) as *mut T)
}

/// # Safety
/// `raw` must be null or come from [`into_raw`] and not have been reclaimed.
unsafe fn from_raw<T>(raw: *mut T) -> Option<Arc<T>> {
    if raw.is_null() {
        None
    } else {
        Some(Arc::from_raw(raw as *const T))
    }
}

impl<T> AtomicSlot<T> {
    pub const fn empty() -> Self {
        AtomicSlot {
            word: AtomicPtr::new(ptr::null_mut()),
            _owns: PhantomData,
        }
    }

    pub fn new(value: Option<Arc<T>>) -> Self {
        AtomicSlot {
            word: AtomicPtr::new(into_raw(value)),
            _owns: PhantomData,
        }
    }

    /// Returns a new reference to the current content.
    pub fn read(&self) -> Option<Arc<T>> {
        let raw = acquire(&self.word);
        let out = if raw.is_null() {
            None
        } else {
            // SAFETY: the slot owns one strong count for `raw` and we hold the
            // lock, so the allocation cannot be released underneath us.
            unsafe {
                Arc::increment_strong_count(raw as *const T);
                from_raw(raw)
            }
        };
        release(&self.word, raw);
        out
    }

    /// Takes the slot. Until the guard is finished or dropped, every other
    /// reader or writer of this slot spins.
    pub fn read_start(&self) -> SlotGuard<'_, T> {
        let raw = acquire(&self.word);
        // SAFETY: we took ownership of the slot's strong count with the lock.
        let content = unsafe { from_raw(raw) };
        SlotGuard {
            slot: self,
            content: Some(content),
        }
    }

    /// Replaces the content, returning the previous one.
    pub fn write(&self, value: Option<Arc<T>>) -> Option<Arc<T>> {
        self.read_start().read_end(value)
    }

    pub fn take(&self) -> Option<Arc<T>> {
        self.write(None)
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_none()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        let raw = *self.word.get_mut();
        if raw.is_null() {
            return None;
        }
        // SAFETY: exclusive access to the slot means nobody holds the lock
        // and the pointer is live. The temporary Arc is handed back unchanged.
        let mut arc = unsafe { Arc::from_raw(raw as *const T) };
        let unique = Arc::get_mut(&mut arc).is_some();
        let raw = Arc::into_raw(arc) as *mut T;
        // SAFETY: uniqueness was just checked and `&mut self` pins the slot.
        unique.then(|| unsafe { &mut *raw })
    }
}

impl<T> Default for AtomicSlot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Drop for AtomicSlot<T> {
    fn drop(&mut self) {
        let raw = *self.word.get_mut();
        // SAFETY: no guard can outlive the slot it borrows.
        drop(unsafe { from_raw(raw) });
    }
}

impl<T: fmt::Debug> fmt::Debug for AtomicSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicSlot").field(&self.read()).finish()
    }
}

/// Exclusive hold on an [`AtomicSlot`].
///
/// Dropping the guard without calling [`SlotGuard::read_end`] restores the
/// content it was taken with.
pub struct SlotGuard<'a, T> {
    slot: &'a AtomicSlot<T>,
    content: Option<Option<Arc<T>>>,
}

impl<'a, T> SlotGuard<'a, T> {
    /// The content the slot held when it was taken.
    pub fn get(&self) -> Option<&Arc<T>> {
        self.content.as_ref().and_then(Option::as_ref)
    }

    /// Publishes `value` and releases the slot. The previous content is
    /// returned so the caller can drop it outside the critical section.
    pub fn read_end(mut self, value: Option<Arc<T>>) -> Option<Arc<T>> {
        let previous = self.content.take().flatten();
        release(&self.slot.word, into_raw(value));
        previous
    }
}

impl<T> Drop for SlotGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(content) = self.content.take() {
            release(&self.slot.word, into_raw(content));
        }
    }
}
