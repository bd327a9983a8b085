//! Dynamic tracking: which observers (tracker ids) depend on which symbols.
//!
//! A symbol remembers only the most recent tracker that read it; the full
//! many-to-many relation lives here. When a tracked symbol changes, every
//! tracker bound to it is unbound and reported once.

use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::trace;

use crate::backend::atomic::SwapLock;

/// Identifies a dynamic observer. Zero means "none".
pub type TrackerId = u64;

type Ids = SmallVec<[u64; 4]>;

#[derive(Default)]
struct Bindings {
    symbols_by_tracker: HashMap<TrackerId, Ids>,
    trackers_by_symbol: HashMap<u64, Ids>,
}

/// Registry keyed by symbol serial numbers, so it never keeps symbols alive.
#[derive(Default)]
pub struct DynamicRegistry {
    bindings: SwapLock<Bindings>,
}

impl DynamicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `tracker` depends on the symbol with serial `symbol`.
    pub fn bind(&self, symbol: u64, tracker: TrackerId) {
        if tracker == 0 {
            return;
        }
        let mut guard = self.bindings.lock();
        let bindings = &mut *guard;
        let symbols = bindings.symbols_by_tracker.entry(tracker).or_default();
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
            bindings.trackers_by_symbol.entry(symbol).or_default().push(tracker);
        }
    }

    /// Drops every binding of `tracker`. Returns whether it had any.
    pub fn remove(&self, tracker: TrackerId) -> bool {
        let mut bindings = self.bindings.lock();
        Self::remove_locked(&mut bindings, tracker)
    }

    fn remove_locked(bindings: &mut Bindings, tracker: TrackerId) -> bool {
        let Some(symbols) = bindings.symbols_by_tracker.remove(&tracker) else {
            return false;
        };
        for symbol in symbols {
            if let Some(trackers) = bindings.trackers_by_symbol.get_mut(&symbol) {
                trackers.retain(|t| *t != tracker);
                if trackers.is_empty() {
                    bindings.trackers_by_symbol.remove(&symbol);
                }
            }
        }
        true
    }

    /// Unbinds every tracker depending on `symbol` and returns them.
    ///
    /// Trackers are removed entirely, from other symbols as well: an
    /// observer re-registers its dependencies when it is recomputed.
    pub fn update(&self, symbol: u64) -> Vec<TrackerId> {
        let mut bindings = self.bindings.lock();
        let Some(trackers) = bindings.trackers_by_symbol.remove(&symbol) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(trackers.len());
        for tracker in trackers {
            if Self::remove_locked(&mut bindings, tracker) {
                out.push(tracker);
            }
        }
        trace!(
            target: "symtable::dynamic::update",
            symbol, trackers = out.len(), "released trackers"
        );
        out
    }

    pub fn trackers_of(&self, symbol: u64) -> Vec<TrackerId> {
        self.bindings
            .lock()
            .trackers_by_symbol
            .get(&symbol)
            .map(|ids| ids.to_vec())
            .unwrap_or_default()
    }

    pub fn is_bound(&self, tracker: TrackerId) -> bool {
        self.bindings.lock().symbols_by_tracker.contains_key(&tracker)
    }

    pub fn clear(&self) {
        let old = self.bindings.replace(Bindings::default());
        drop(old);
    }
}
