use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::AtomicPtr;

use super::{acquire, release};

/// An owned value guarded by the same pointer-swap lock as [`AtomicSlot`].
///
/// Used for small tables (rule maps, per-thread stores, the dynamic
/// registry) whose critical sections are a single hash operation.
///
/// [`AtomicSlot`]: super::AtomicSlot
pub struct SwapLock<T> {
    word: AtomicPtr<T>,
    _owns: PhantomData<Box<T>>,
}

unsafe impl<T: Send> Send for SwapLock<T> {}
unsafe impl<T: Send> Sync for SwapLock<T> {}

impl<T> SwapLock<T> {
    pub fn new(value: T) -> Self {
        SwapLock {
            word: AtomicPtr::new(Box::into_raw(Box::new(value))),
            _owns: PhantomData,
        }
    }

    pub fn lock(&self) -> SwapGuard<'_, T> {
        let value = acquire(&self.word);
        SwapGuard {
            lock: self,
            value,
            _not_send: PhantomData,
        }
    }

    /// Swaps in a new value, returning the old one.
    pub fn replace(&self, value: T) -> T {
        std::mem::replace(&mut *self.lock(), value)
    }

    pub fn get_mut(&mut self) -> &mut T {
        // SAFETY: exclusive borrow, the word always holds the boxed value.
        unsafe { &mut **self.word.get_mut() }
    }

    pub fn into_inner(self) -> T {
        let this = std::mem::ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the box is released exactly once.
        *unsafe { Box::from_raw(this.word.load(std::sync::atomic::Ordering::Relaxed)) }
    }
}

impl<T: Default> Default for SwapLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Drop for SwapLock<T> {
    fn drop(&mut self) {
        // SAFETY: no guard can outlive the lock, so the word holds the box.
        drop(unsafe { Box::from_raw(*self.word.get_mut()) });
    }
}

impl<T: fmt::Debug> fmt::Debug for SwapLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SwapLock").field(&*self.lock()).finish()
    }
}

pub struct SwapGuard<'a, T> {
    lock: &'a SwapLock<T>,
    value: *mut T,
    _not_send: PhantomData<*mut T>,
}

impl<T> Deref for SwapGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock, so the box is ours until drop.
        unsafe { &*self.value }
    }
}

impl<T> DerefMut for SwapGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above, and `&mut self` keeps the borrow unique.
        unsafe { &mut *self.value }
    }
}

impl<T> Drop for SwapGuard<'_, T> {
    fn drop(&mut self) {
        release(&self.lock.word, self.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lock_and_mutate() {
        let lock = SwapLock::new(HashMap::new());
        lock.lock().insert("a", 1);
        assert_eq!(lock.lock().get("a"), Some(&1));
        let old = lock.replace(HashMap::new());
        assert_eq!(old.len(), 1);
        assert!(lock.into_inner().is_empty());
    }

    #[test]
    fn test_counter_under_contention() {
        let lock = Arc::new(SwapLock::new(0u64));
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        *lock.lock() += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*lock.lock(), 12_000);
    }

    #[test]
    fn test_zero_sized_payload_locks() {
        let lock = SwapLock::new(());
        {
            let _held = lock.lock();
        }
        let _again = lock.lock();
    }

    #[test]
    fn test_zero_sized_payload_excludes_holders() {
        struct Token;

        let lock = Arc::new(SwapLock::new(Token));
        let inside = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        let _held = lock.lock();
                        let before = inside.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        assert_eq!(before, 0);
                        inside.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
