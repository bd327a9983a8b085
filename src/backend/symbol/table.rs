use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use tracing::{debug, trace, warn};

use super::namespace::{qualify, split_name, NamespaceContext, NAMESPACE_SEPARATOR};
use super::{Attributes, Symbol, SymbolData};
use crate::backend::atomic::{FreeList, SwapLock};
use crate::backend::config::TableConfig;
use crate::backend::dynamic::DynamicRegistry;
use crate::backend::error::{Diagnostic, DiagnosticKind, SymbolError, SymbolResult};
use crate::backend::matcher::Semantics;
use crate::backend::threads::ThreadContext;

static GLOBAL: LazyLock<SymbolTable> = LazyLock::new(SymbolTable::new);

#[derive(Default)]
struct TableState {
    by_name: HashMap<Arc<str>, Arc<SymbolData>>,
    /// Enumeration order: serials grow with creation time.
    ring: BTreeMap<u64, Arc<SymbolData>>,
}

pub(crate) struct TableShared {
    state: SwapLock<TableState>,
    free: FreeList<Arc<SymbolData>>,
    pub(crate) dynamic: DynamicRegistry,
    pub(crate) semantics: Semantics,
    config: TableConfig,
    running: AtomicBool,
    next_serial: AtomicU64,
    clock: AtomicU64,
    temporary_counter: AtomicU64,
}

impl TableShared {
    pub(crate) fn next_stamp(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// A symbol not yet in the table. Its serial is drawn on insertion.
    fn allocate(self: &Arc<Self>, name: &str, attributes: Attributes) -> Arc<SymbolData> {
        let fresh = || SymbolData::new(Arc::from(name), attributes, Arc::downgrade(self));
        if let Some(mut spare) = self.free.pop() {
            if let Some(data) = Arc::get_mut(&mut spare) {
                *data = fresh();
                trace!(
                    target: "symtable::symbol::table::allocate",
                    name, "reusing recycled symbol"
                );
                return spare;
            }
        }
        Arc::new(fresh())
    }

    /// Keeps a symbol allocation for reuse if nothing else refers to it.
    fn recycle(&self, mut data: Arc<SymbolData>) {
        if Arc::get_mut(&mut data).is_none() {
            return;
        }
        if self.free.push(data).is_err() {
            trace!(target: "symtable::symbol::table::recycle", "free list full, releasing symbol");
        }
    }

    /// Reclaims a symbol whose last handle was just dropped.
    ///
    /// Only Temporary, unprotected symbols leave the table. A handle taken
    /// from the table between the final release and this call wins: the
    /// 0 → 1 exchange on the handle count fails and the symbol stays.
    pub(crate) fn remove(&self, data: Arc<SymbolData>) {
        let attributes = data.attributes();
        if !attributes.contains(Attributes::TEMPORARY)
            || attributes.contains(Attributes::PROTECTED)
        {
            return;
        }

        let entry = {
            let mut state = self.state.lock();
            if data
                .refs
                .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            // The count stays at 1 from here on: nobody can reach this
            // symbol any more, and a second reclaimer must fail above.
            let registered = state
                .by_name
                .get(&*data.name)
                .is_some_and(|current| Arc::ptr_eq(current, &data));
            if !registered {
                return;
            }
            state.ring.remove(&data.serial());
            state.by_name.remove(&*data.name)
        };

        debug!(
            target: "symtable::symbol::table::remove",
            name = &*data.name, "temporary symbol reclaimed"
        );
        data.release_contents();
        self.dynamic.update(data.serial());
        drop(entry);
        self.recycle(data);
    }

    fn lookup_any(&self, name: &str) -> Option<Symbol> {
        let state = self.state.lock();
        state.by_name.get(name).map(Symbol::acquire)
    }

    /// Finds or creates `name`. The flag tells whether this call created it.
    fn get_or_insert(
        self: &Arc<Self>,
        name: &str,
        attributes: Attributes,
    ) -> Option<(Symbol, bool)> {
        if let Some(found) = self.lookup_any(name) {
            return Some((found, false));
        }

        let fresh = self.allocate(name, attributes);
        let (symbol, loser) = {
            let mut state = self.state.lock();
            if let Some(existing) = state.by_name.get(name) {
                (Symbol::acquire(existing), Some(fresh))
            } else {
                if state.by_name.try_reserve(1).is_err() {
                    drop(state);
                    warn!(
                        target: "symtable::symbol::table::create",
                        name, "symbol table cannot grow"
                    );
                    self.recycle(fresh);
                    return None;
                }
                // Drawn under the lock so ring order is insertion order.
                let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
                fresh.serial.store(serial, Ordering::Relaxed);
                state.by_name.insert(Arc::clone(&fresh.name), Arc::clone(&fresh));
                state.ring.insert(serial, Arc::clone(&fresh));
                (Symbol::acquire(&fresh), None)
            }
        };

        match loser {
            Some(loser) => {
                trace!(target: "symtable::symbol::table::create", name, "lost creation race");
                self.recycle(loser);
                Some((symbol, false))
            }
            None => {
                debug!(target: "symtable::symbol::table::create", name, "symbol created");
                Some((symbol, true))
            }
        }
    }

    fn notify_created(&self, symbol: &Symbol) {
        if self.config.notify_new_symbols && self.running.load(Ordering::Acquire) {
            let (namespace, short) = split_name(symbol.name());
            self.semantics.evaluator.new_symbol(namespace, short);
        }
    }
}

/// The table of all live symbols, keyed by qualified name.
///
/// Cloning yields another handle on the same table.
#[derive(Clone)]
pub struct SymbolTable {
    shared: Arc<TableShared>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::with_config(TableConfig::default(), Semantics::default())
    }

    pub fn with_config(config: TableConfig, semantics: Semantics) -> Self {
        let state = TableState {
            by_name: HashMap::with_capacity(config.initial_capacity),
            ring: BTreeMap::new(),
        };
        SymbolTable {
            shared: Arc::new(TableShared {
                state: SwapLock::new(state),
                free: FreeList::new(config.free_list_capacity),
                dynamic: DynamicRegistry::new(),
                semantics,
                config,
                running: AtomicBool::new(true),
                next_serial: AtomicU64::new(1),
                clock: AtomicU64::new(0),
                temporary_counter: AtomicU64::new(1),
            }),
        }
    }

    /// The process-wide table with default configuration and semantics.
    pub fn global() -> &'static SymbolTable {
        &GLOBAL
    }

    pub fn config(&self) -> &TableConfig {
        &self.shared.config
    }

    pub fn semantics(&self) -> &Semantics {
        &self.shared.semantics
    }

    pub fn dynamic(&self) -> &DynamicRegistry {
        &self.shared.dynamic
    }

    pub fn set_running(&self, running: bool) {
        self.shared.running.store(running, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recycled symbol allocations currently held for reuse.
    pub fn spare_count(&self) -> usize {
        self.shared.free.len()
    }

    /// The symbol called `name`, unless absent or Removed.
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.shared.lookup_any(name).filter(|symbol| !symbol.is_removed())
    }

    /// The symbol called `name`, created if absent. A Removed symbol of that
    /// name is revived instead. `None` only when the table cannot grow.
    pub fn lookup_or_create(&self, name: &str) -> Option<Symbol> {
        let (symbol, created) = self.shared.get_or_insert(name, Attributes::empty())?;
        if created {
            self.shared.notify_created(&symbol);
        } else if symbol.is_removed() {
            symbol.remove_attributes(Attributes::REMOVED);
        }
        Some(symbol)
    }

    /// Resolves a possibly short name through `namespaces`.
    ///
    /// Qualified names are looked up (or created) directly. A short name is
    /// tried as is, then in the current namespace, then along the search
    /// path, and finally created in the current namespace when `create` is
    /// set. Empty names and names starting with the separator yield `None`.
    pub fn find(&self, name: &str, create: bool, namespaces: &NamespaceContext) -> Option<Symbol> {
        if let Some(symbol) = self.lookup(name) {
            return Some(symbol);
        }
        match name.find(NAMESPACE_SEPARATOR) {
            _ if name.is_empty() => None,
            Some(0) => None,
            Some(_) if create => self.lookup_or_create(name),
            Some(_) => None,
            None => self.find_short(name, create, namespaces),
        }
    }

    fn find_short(
        &self,
        name: &str,
        create: bool,
        namespaces: &NamespaceContext,
    ) -> Option<Symbol> {
        let in_namespace =
            |namespace: &str| qualify(namespace, name).and_then(|full| self.lookup(&full));
        if let Some(symbol) = in_namespace(namespaces.current()) {
            return Some(symbol);
        }
        if let Some(symbol) = namespaces.path().iter().find_map(|ns| in_namespace(ns)) {
            return Some(symbol);
        }
        if !create {
            return None;
        }
        let full = qualify(namespaces.current(), name)?;
        self.lookup_or_create(&full)
    }

    /// A Temporary symbol named after `base`.
    ///
    /// A trailing `$digits` (or bare `$`) suffix is stripped from `base`; the
    /// name gets `$<counter>` when `unique`, `$` otherwise. An existing symbol
    /// of that name is reused and its attributes reset to Temporary.
    pub fn create_temporary(&self, base: &str, unique: bool) -> Option<Symbol> {
        let suffix = self.shared.config.temporary_suffix;
        let digits_stripped = base.trim_end_matches(|c: char| c.is_ascii_digit());
        let stem = match digits_stripped.strip_suffix(suffix) {
            Some(stem) if !stem.is_empty() => stem,
            _ => base,
        };
        let name = if unique {
            let counter = self.shared.temporary_counter.fetch_add(1, Ordering::Relaxed);
            format!("{}{}{}", stem, suffix, counter)
        } else {
            format!("{}{}", stem, suffix)
        };

        let (symbol, created) = self.shared.get_or_insert(&name, Attributes::TEMPORARY)?;
        if !created {
            symbol.set_attributes(Attributes::TEMPORARY);
        }
        Some(symbol)
    }

    /// Deletes a symbol on user request: refused for Protected symbols,
    /// otherwise hides it from lookup and drops its value, rules and
    /// messages. The symbol leaves the table once its last handle is gone.
    pub fn remove_symbol(&self, ctx: &ThreadContext, symbol: &Symbol) -> SymbolResult<()> {
        if symbol.is_protected() {
            warn!(
                target: "symtable::symbol::table::remove_symbol",
                symbol = symbol.name(), "protected symbol not removed"
            );
            let diagnostic = Diagnostic::new(DiagnosticKind::RemoveProtected, symbol.name());
            self.shared.semantics.evaluator.message(&diagnostic);
            return Err(SymbolError::Protected {
                symbol: symbol.name().to_string(),
            });
        }
        symbol.add_attributes(Attributes::TEMPORARY | Attributes::REMOVED);
        symbol.clear_unchecked(ctx);
        debug!(
            target: "symtable::symbol::table::remove_symbol",
            symbol = symbol.name(), "symbol removed"
        );
        Ok(())
    }

    /// Lazy walk over live symbols in creation order. Each step holds the
    /// table lock only to fetch the next entry, so concurrent changes may or
    /// may not be seen. Removed symbols are skipped.
    pub fn iter(&self) -> SymbolIter {
        SymbolIter {
            shared: Arc::clone(&self.shared),
            cursor: None,
        }
    }

    /// Continues a walk after `symbol`, e.g. one resumed from a saved symbol.
    pub fn iter_after(&self, symbol: &Symbol) -> SymbolIter {
        SymbolIter {
            shared: Arc::clone(&self.shared),
            cursor: Some(symbol.serial()),
        }
    }

    /// Next live symbol after `symbol` in ring order, wrapping around to the
    /// oldest symbol at the end. A table holding only `symbol` yields it.
    pub fn next_after(&self, symbol: &Symbol) -> Option<Symbol> {
        let start = symbol.serial();
        let mut cursor = start;
        let mut budget = self.len() + 1;
        while budget > 0 {
            budget -= 1;
            let (serial, next) = {
                let state = self.shared.state.lock();
                let (serial, data) = state
                    .ring
                    .range((Bound::Excluded(cursor), Bound::Unbounded))
                    .next()
                    .or_else(|| state.ring.iter().next())?;
                (*serial, Symbol::acquire(data))
            };
            if serial == start || !next.is_removed() {
                return Some(next);
            }
            cursor = serial;
        }
        None
    }

    /// Tears the table down: every symbol loses its value and rules and the
    /// table forgets all of them. Outstanding handles stay valid but are no
    /// longer reachable by name.
    pub fn shutdown(&self) {
        self.set_running(false);
        let state = self.shared.state.replace(TableState::default());
        let count = state.ring.len();
        for data in state.ring.values() {
            data.release_contents();
        }
        drop(state);
        self.shared.free.clear();
        self.shared.dynamic.clear();
        debug!(
            target: "symtable::symbol::table::shutdown",
            symbols = count, "symbol table shut down"
        );
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolTable")
            .field("symbols", &self.len())
            .field("spare", &self.spare_count())
            .field("running", &self.is_running())
            .finish()
    }
}

pub struct SymbolIter {
    shared: Arc<TableShared>,
    cursor: Option<u64>,
}

impl Iterator for SymbolIter {
    type Item = Symbol;

    fn next(&mut self) -> Option<Symbol> {
        loop {
            let (serial, symbol) = {
                let state = self.shared.state.lock();
                let next = match self.cursor {
                    None => state.ring.iter().next(),
                    Some(cursor) => state
                        .ring
                        .range((Bound::Excluded(cursor), Bound::Unbounded))
                        .next(),
                };
                let (serial, data) = next?;
                (*serial, Symbol::acquire(data))
            };
            self.cursor = Some(serial);
            if !symbol.is_removed() {
                return Some(symbol);
            }
        }
    }
}
