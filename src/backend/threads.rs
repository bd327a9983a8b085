//! Thread-local override store for ThreadLocal symbols.
//!
//! Each evaluator thread runs with a [`ThreadContext`]. A context owns private
//! copies of the rule sets and values of ThreadLocal symbols it has written.
//! A child context links to a frozen copy of what its parent could see when
//! the child was created. Reads fall through that chain to the global state;
//! the first write copies whatever the read would have seen into the calling
//! context.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::backend::atomic::SwapLock;
use crate::backend::rules::SymbolRules;
use crate::backend::symbol::{Symbol, ValueCell};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// How a caller intends to use a resolved entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Private entries keyed by symbol serial. The handle keeps the symbol (and
/// with it the serial) alive for as long as the entry exists.
struct LocalStore<V> {
    entries: SwapLock<HashMap<u64, (Symbol, Arc<V>)>>,
}

impl<V> LocalStore<V> {
    fn new() -> Self {
        LocalStore {
            entries: SwapLock::new(HashMap::new()),
        }
    }

    fn get(&self, serial: u64) -> Option<Arc<V>> {
        self.entries.lock().get(&serial).map(|(_, v)| Arc::clone(v))
    }

    /// Inserts `value` unless an entry already exists, returning the entry
    /// that ends up stored.
    fn install(&self, symbol: &Symbol, value: V) -> Option<Arc<V>> {
        let value = Arc::new(value);
        let mut entries = self.entries.lock();
        if let Some((_, existing)) = entries.get(&symbol.serial()) {
            return Some(Arc::clone(existing));
        }
        if entries.try_reserve(1).is_err() {
            drop(entries);
            warn!(
                target: "symtable::threads::install",
                symbol = symbol.name(), "thread-local store is full"
            );
            return None;
        }
        entries.insert(symbol.serial(), (symbol.clone(), Arc::clone(&value)));
        Some(value)
    }

    fn remove(&self, serial: u64) -> Option<(Symbol, Arc<V>)> {
        self.entries.lock().remove(&serial)
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn snapshot(&self) -> Vec<(Symbol, Arc<V>)> {
        self.entries
            .lock()
            .values()
            .map(|(symbol, value)| (symbol.clone(), Arc::clone(value)))
            .collect()
    }

    fn take_all(&self) -> HashMap<u64, (Symbol, Arc<V>)> {
        self.entries.replace(HashMap::new())
    }
}

pub struct ThreadContext {
    id: u64,
    parent: Option<Arc<ThreadContext>>,
    rules: LocalStore<SymbolRules>,
    values: LocalStore<ValueCell>,
}

impl ThreadContext {
    /// A context with no parent: unwritten ThreadLocal symbols read the
    /// global state.
    pub fn root() -> Arc<ThreadContext> {
        Arc::new(Self::with_parent(None))
    }

    fn with_parent(parent: Option<Arc<ThreadContext>>) -> ThreadContext {
        ThreadContext {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            parent,
            rules: LocalStore::new(),
            values: LocalStore::new(),
        }
    }

    /// A context inheriting from this one. The child sees the entries
    /// visible here at the time of the call; later writes on either side
    /// stay private.
    pub fn child(&self) -> Arc<ThreadContext> {
        let inherited = Self::with_parent(None);
        for (symbol, rules) in self.visible(|ctx| &ctx.rules) {
            inherited.rules.install(&symbol, rules.copy());
        }
        for (symbol, cell) in self.visible(|ctx| &ctx.values) {
            inherited.values.install(&symbol, cell.copy());
        }
        debug!(
            target: "symtable::threads::child",
            parent = self.id, inherited = inherited.entry_count(), "child context created"
        );
        Arc::new(Self::with_parent(Some(Arc::new(inherited))))
    }

    /// Nearest entry per symbol over this context and its ancestors.
    fn visible<V>(
        &self,
        store: impl Fn(&ThreadContext) -> &LocalStore<V>,
    ) -> Vec<(Symbol, Arc<V>)> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for ctx in self.ancestry() {
            for (symbol, value) in store(ctx).snapshot() {
                if seen.insert(symbol.serial()) {
                    entries.push((symbol, value));
                }
            }
        }
        entries
    }

    /// Runs `f` on a new OS thread with a child context.
    pub fn spawn<F, T>(&self, f: F) -> std::io::Result<JoinHandle<T>>
    where
        F: FnOnce(Arc<ThreadContext>) -> T + Send + 'static,
        T: Send + 'static,
    {
        let child = self.child();
        thread::Builder::new()
            .name(format!("symtable-worker-{}", child.id))
            .spawn(move || f(child))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    fn ancestry(&self) -> impl Iterator<Item = &ThreadContext> {
        std::iter::successors(Some(self), |ctx| ctx.parent.as_deref())
    }

    /// Nearest entry up the parent chain; `true` when it is our own.
    fn lookup<V>(
        &self,
        store: impl Fn(&ThreadContext) -> &LocalStore<V>,
        serial: u64,
    ) -> Option<(bool, Arc<V>)> {
        self.ancestry().find_map(|ctx| {
            store(ctx)
                .get(serial)
                .map(|entry| (std::ptr::eq(ctx, self), entry))
        })
    }

    /// Resolves the rule set a ThreadLocal symbol uses in this context.
    ///
    /// `global` yields the symbol's shared rule set, if it has one. Reads
    /// never copy; a write copies the nearest visible rule set into this
    /// context first. `None` on read means no rules exist anywhere.
    pub(crate) fn resolve_rules(
        &self,
        symbol: &Symbol,
        access: Access,
        global: impl FnOnce() -> Option<Arc<SymbolRules>>,
    ) -> Option<Arc<SymbolRules>> {
        match (self.lookup(|ctx| &ctx.rules, symbol.serial()), access) {
            (Some((true, rules)), _) | (Some((false, rules)), Access::Read) => Some(rules),
            (None, Access::Read) => global(),
            (inherited, Access::Write) => {
                let seed = match inherited {
                    Some((_, rules)) => rules.copy(),
                    None => global().map_or_else(SymbolRules::new, |rules| rules.copy()),
                };
                debug!(
                    target: "symtable::threads::resolve_rules",
                    context = self.id, symbol = symbol.name(), "private rule set created"
                );
                self.rules.install(symbol, seed)
            }
        }
    }

    /// Resolves the value cell of a ThreadLocal symbol. On read, `None`
    /// means "use the global value".
    pub(crate) fn resolve_value(
        &self,
        symbol: &Symbol,
        access: Access,
        global: &ValueCell,
    ) -> Option<Arc<ValueCell>> {
        match (self.lookup(|ctx| &ctx.values, symbol.serial()), access) {
            (Some((true, cell)), _) | (Some((false, cell)), Access::Read) => Some(cell),
            (None, Access::Read) => None,
            (inherited, Access::Write) => {
                let seed = match inherited {
                    Some((_, cell)) => cell.copy(),
                    None => global.copy(),
                };
                debug!(
                    target: "symtable::threads::resolve_value",
                    context = self.id, symbol = symbol.name(), "private value created"
                );
                self.values.install(symbol, seed)
            }
        }
    }

    /// Drops this context's own entries for `symbol`. Inherited entries stay.
    pub fn forget(&self, symbol: &Symbol) {
        let rules = self.rules.remove(symbol.serial());
        let value = self.values.remove(symbol.serial());
        drop((rules, value));
    }

    /// Private rule sets plus private values held by this context.
    pub fn entry_count(&self) -> usize {
        self.rules.len() + self.values.len()
    }

    pub fn has_local(&self, symbol: &Symbol) -> bool {
        self.rules.get(symbol.serial()).is_some() || self.values.get(symbol.serial()).is_some()
    }

    /// Drops every private entry of this context.
    pub fn clear(&self) {
        let rules = self.rules.take_all();
        let values = self.values.take_all();
        drop((rules, values));
    }
}

impl std::fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadContext")
            .field("id", &self.id)
            .field("parent", &self.parent.as_ref().map(|p| p.id))
            .field("rules", &self.rules.len())
            .field("values", &self.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::models::Term;
    use crate::backend::rules::RuleCategory;
    use crate::backend::symbol::{Attributes, SymbolTable};

    fn local_symbol(table: &SymbolTable, name: &str) -> Symbol {
        let symbol = table.lookup_or_create(name).unwrap();
        symbol.add_attributes(Attributes::THREAD_LOCAL);
        symbol
    }

    fn g(arg: i64) -> Term {
        Term::call("Global`g", [Term::Integer(arg)])
    }

    #[test]
    fn test_write_stays_in_context() {
        let table = SymbolTable::new();
        let x = local_symbol(&table, "Global`x");
        let root = ThreadContext::root();
        let a = root.child();
        let b = root.child();

        x.set_value(&a, Term::Integer(1)).unwrap();
        assert_eq!(*x.value(&a), Term::Integer(1));
        assert!(x.value(&b).is_undefined());
        assert!(x.value(&root).is_undefined());
        assert!(a.has_local(&x));
        assert!(!b.has_local(&x));
    }

    #[test]
    fn test_child_inherits_writes_made_before_it() {
        let table = SymbolTable::new();
        let x = local_symbol(&table, "Global`x");
        let parent = ThreadContext::root();
        let early = parent.child();
        x.set_value(&parent, Term::Integer(1)).unwrap();

        let child = parent.child();
        assert!(child.has_parent());
        assert_eq!(*x.value(&child), Term::Integer(1));
        assert!(!child.has_local(&x));
        assert!(x.value(&early).is_undefined());

        x.set_value(&parent, Term::Integer(2)).unwrap();
        assert_eq!(*x.value(&child), Term::Integer(1));

        x.set_value(&child, Term::Integer(3)).unwrap();
        assert!(child.has_local(&x));
        assert_eq!(*x.value(&child), Term::Integer(3));
        assert_eq!(*x.value(&parent), Term::Integer(2));
    }

    #[test]
    fn test_grandchild_sees_nearest_entry() {
        let table = SymbolTable::new();
        let x = local_symbol(&table, "Global`x");
        let root = ThreadContext::root();
        x.set_value(&root, Term::Integer(1)).unwrap();
        let middle = root.child();
        x.set_value(&middle, Term::Integer(2)).unwrap();

        let leaf = middle.child();
        assert_eq!(*x.value(&leaf), Term::Integer(2));
    }

    #[test]
    fn test_rule_write_copies_global_rules() {
        let table = SymbolTable::new();
        let f = table.lookup_or_create("Global`f").unwrap();
        let root = ThreadContext::root();
        f.define(&root, RuleCategory::Down, Term::call("Global`f", [Term::Integer(1)]), g(1))
            .unwrap();

        f.add_attributes(Attributes::THREAD_LOCAL);
        let worker = root.child();
        f.define(&worker, RuleCategory::Down, Term::call("Global`f", [Term::Integer(2)]), g(2))
            .unwrap();

        let one = Term::call("Global`f", [Term::Integer(1)]);
        let two = Term::call("Global`f", [Term::Integer(2)]);
        assert_eq!(f.find(&worker, RuleCategory::Down, &one).as_deref(), Some(&g(1)));
        assert_eq!(f.find(&worker, RuleCategory::Down, &two).as_deref(), Some(&g(2)));
        assert!(f.find(&root, RuleCategory::Down, &two).is_none());
    }

    #[test]
    fn test_read_never_creates_entries() {
        let table = SymbolTable::new();
        let x = local_symbol(&table, "Global`x");
        let ctx = ThreadContext::root();
        assert!(x.value(&ctx).is_undefined());
        assert!(x.rules(&ctx, Access::Read).unwrap().is_none());
        assert_eq!(ctx.entry_count(), 0);
    }

    #[test]
    fn test_forget_and_clear() {
        let table = SymbolTable::new();
        let x = local_symbol(&table, "Global`x");
        let y = local_symbol(&table, "Global`y");
        let ctx = ThreadContext::root();
        x.set_value(&ctx, Term::Integer(1)).unwrap();
        y.set_value(&ctx, Term::Integer(2)).unwrap();
        assert_eq!(ctx.entry_count(), 2);

        ctx.forget(&x);
        assert!(x.value(&ctx).is_undefined());
        assert_eq!(ctx.entry_count(), 1);

        ctx.clear();
        assert_eq!(ctx.entry_count(), 0);
        assert_eq!(y.ref_count(), 1);
    }

    #[test]
    fn test_spawned_workers_are_isolated() {
        let table = SymbolTable::new();
        let x = local_symbol(&table, "Global`x");
        let root = ThreadContext::root();

        let handles: Vec<_> = (0..4i64)
            .map(|i| {
                let x = x.clone();
                root.spawn(move |ctx| {
                    x.set_value(&ctx, Term::Integer(i)).unwrap();
                    std::thread::yield_now();
                    x.value(&ctx).as_integer()
                })
                .unwrap()
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), Some(i as i64));
        }
        assert!(x.value(&root).is_undefined());
    }
}
