//! Symbols: named bindings with attributes, a value and rule sets.
//!
//! A [`Symbol`] is a counted handle on shared symbol data owned by a
//! [`SymbolTable`]. The table keeps every live symbol reachable by name;
//! Temporary symbols leave the table when their last handle is dropped.

mod attributes;
mod namespace;
mod table;
mod value;


pub use attributes::Attributes;
pub use namespace::{split_name, NamespaceContext, NAMESPACE_SEPARATOR};
pub use table::{SymbolIter, SymbolTable};
pub use value::ValueCell;

pub(crate) use table::TableShared;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::ReentrantMutex;
use tracing::{trace, warn};

use crate::backend::atomic::AtomicSlot;
use crate::backend::dynamic::TrackerId;
use crate::backend::error::{Diagnostic, DiagnosticKind, SymbolError, SymbolResult};
use crate::backend::models::{Rule, Term};
use crate::backend::rules::{RuleCategory, SymbolRules};
use crate::backend::threads::{Access, ThreadContext};

pub(crate) struct SymbolData {
    /// Drawn from the table counter when the symbol enters the table.
    serial: AtomicU64,
    name: Arc<str>,
    attributes: AtomicU32,
    /// Live `Symbol` handles. The table's own reference is not counted.
    refs: AtomicUsize,
    rules: AtomicSlot<SymbolRules>,
    value: ValueCell,
    current_tracker: AtomicU64,
    ignored_tracker: AtomicU64,
    last_change: AtomicU64,
    monitor: ReentrantMutex<()>,
    table: Weak<TableShared>,
}

impl SymbolData {
    fn new(name: Arc<str>, attributes: Attributes, table: Weak<TableShared>) -> Self {
        SymbolData {
            serial: AtomicU64::new(0),
            name,
            attributes: AtomicU32::new(attributes.bits()),
            refs: AtomicUsize::new(0),
            rules: AtomicSlot::empty(),
            value: ValueCell::new(),
            current_tracker: AtomicU64::new(0),
            ignored_tracker: AtomicU64::new(0),
            last_change: AtomicU64::new(0),
            monitor: ReentrantMutex::new(()),
            table,
        }
    }

    fn serial(&self) -> u64 {
        self.serial.load(Ordering::Relaxed)
    }

    fn attributes(&self) -> Attributes {
        Attributes::from_bits_retain(self.attributes.load(Ordering::Acquire))
    }

    /// Drops the value and the rule set of a symbol leaving the table.
    fn release_contents(&self) {
        self.value.clear();
        drop(self.rules.take());
    }
}

/// Counted handle on a symbol.
///
/// Equality and hashing are by identity: two handles are equal when they
/// refer to the same symbol.
pub struct Symbol {
    data: ManuallyDrop<Arc<SymbolData>>,
}

impl Symbol {
    /// New handle; the table lock must be held when `data` comes from the
    /// table, so a concurrent reclamation sees the raised count.
    fn acquire(data: &Arc<SymbolData>) -> Symbol {
        data.refs.fetch_add(1, Ordering::AcqRel);
        Symbol {
            data: ManuallyDrop::new(Arc::clone(data)),
        }
    }

    fn table(&self) -> SymbolResult<Arc<TableShared>> {
        self.data.table.upgrade().ok_or(SymbolError::TableClosed)
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn namespace(&self) -> &str {
        split_name(&self.data.name).0
    }

    pub fn short_name(&self) -> &str {
        split_name(&self.data.name).1
    }

    /// Process-unique number of this symbol, stable for its lifetime.
    pub fn serial(&self) -> u64 {
        self.data.serial()
    }

    /// Number of live handles, this one included.
    pub fn ref_count(&self) -> usize {
        self.data.refs.load(Ordering::Acquire)
    }

    pub fn to_term(&self) -> Term {
        Term::Atom(self.data.name.to_string())
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub fn attributes(&self) -> Attributes {
        self.data.attributes()
    }

    pub fn has(&self, attributes: Attributes) -> bool {
        self.attributes().contains(attributes)
    }

    pub fn is_protected(&self) -> bool {
        self.has(Attributes::PROTECTED)
    }

    pub fn is_temporary(&self) -> bool {
        self.has(Attributes::TEMPORARY)
    }

    pub fn is_removed(&self) -> bool {
        self.has(Attributes::REMOVED)
    }

    pub fn is_thread_local(&self) -> bool {
        self.has(Attributes::THREAD_LOCAL)
    }

    pub fn set_attributes(&self, attributes: Attributes) {
        self.data.attributes.store(attributes.bits(), Ordering::Release);
        self.update();
    }

    pub fn add_attributes(&self, attributes: Attributes) {
        self.data.attributes.fetch_or(attributes.bits(), Ordering::AcqRel);
        self.update();
    }

    pub fn remove_attributes(&self, attributes: Attributes) {
        self.data.attributes.fetch_and(!attributes.bits(), Ordering::AcqRel);
        self.update();
    }

    fn check_writable(&self) -> SymbolResult<()> {
        if !self.is_protected() {
            return Ok(());
        }
        warn!(
            target: "symtable::symbol::write",
            symbol = self.name(), "write to protected symbol refused"
        );
        if let Ok(table) = self.table() {
            let diagnostic = Diagnostic::new(DiagnosticKind::WriteProtected, self.name());
            table.semantics.evaluator.message(&diagnostic);
        }
        Err(SymbolError::Protected {
            symbol: self.name().to_string(),
        })
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    /// The symbol's value as seen from `ctx`. Guarded value definitions are
    /// tested here; Undefined when nothing applies.
    pub fn value(&self, ctx: &ThreadContext) -> Arc<Term> {
        let Ok(table) = self.table() else {
            return self.data.value.stored();
        };
        let owner = self.to_term();
        let matcher = &*table.semantics.matcher;
        let evaluator = &*table.semantics.evaluator;
        if self.is_thread_local() {
            if let Some(cell) = ctx.resolve_value(self, Access::Read, &self.data.value) {
                return cell.get(&owner, matcher, evaluator);
            }
        }
        self.data.value.get(&owner, matcher, evaluator)
    }

    /// Stores `value` as is: no protection check, guarded definitions are
    /// discarded. Meant for built-in initialization.
    pub fn set_value(&self, ctx: &ThreadContext, value: Term) -> SymbolResult<()> {
        let value = Arc::new(value);
        if self.is_thread_local() {
            let Some(cell) = ctx.resolve_value(self, Access::Write, &self.data.value) else {
                return Ok(());
            };
            cell.set(value);
        } else {
            self.data.value.set(value);
        }
        self.update();
        Ok(())
    }

    /// `symbol := value`. A body of the form `v /; c` adds a guarded
    /// definition; Undefined removes the current definition.
    pub fn assign(&self, ctx: &ThreadContext, value: Term) -> SymbolResult<bool> {
        self.check_writable()?;
        let table = self.table()?;
        let owner = Arc::new(self.to_term());
        let matcher = &*table.semantics.matcher;
        let changed = if self.is_thread_local() {
            match ctx.resolve_value(self, Access::Write, &self.data.value) {
                Some(cell) => cell.assign(&owner, value, matcher),
                None => false,
            }
        } else {
            self.data.value.assign(&owner, value, matcher)
        };
        if changed {
            self.update();
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------

    /// The rule set used in `ctx`.
    ///
    /// Read access never allocates and yields `None` for a symbol without
    /// rules. Write access fails on Protected symbols, allocates the rule
    /// set on first use and, for ThreadLocal symbols, copies it into `ctx`.
    pub fn rules(
        &self,
        ctx: &ThreadContext,
        access: Access,
    ) -> SymbolResult<Option<Arc<SymbolRules>>> {
        if access == Access::Write {
            self.check_writable()?;
        }
        Ok(self.resolve_rules(ctx, access))
    }

    fn resolve_rules(&self, ctx: &ThreadContext, access: Access) -> Option<Arc<SymbolRules>> {
        if self.is_thread_local() {
            return ctx.resolve_rules(self, access, || self.global_rules(Access::Read));
        }
        self.global_rules(access)
    }

    fn global_rules(&self, access: Access) -> Option<Arc<SymbolRules>> {
        if let Some(rules) = self.data.rules.read() {
            return Some(rules);
        }
        if access == Access::Read {
            return None;
        }
        let fresh = Arc::new(SymbolRules::new());
        let guard = self.data.rules.read_start();
        if let Some(existing) = guard.get() {
            // Another writer installed one first.
            return Some(Arc::clone(existing));
        }
        drop(guard.read_end(Some(Arc::clone(&fresh))));
        trace!(target: "symtable::symbol::rules", symbol = self.name(), "rule set allocated");
        Some(fresh)
    }

    /// Defines `pattern -> body` in one of the symbol's rule caches.
    /// An Undefined body removes the rule.
    pub fn define(
        &self,
        ctx: &ThreadContext,
        category: RuleCategory,
        pattern: Term,
        body: Term,
    ) -> SymbolResult<bool> {
        self.check_writable()?;
        let table = self.table()?;
        let matcher = &*table.semantics.matcher;
        if !matcher.is_valid(&pattern) {
            warn!(
                target: "symtable::symbol::define",
                symbol = self.name(), %pattern, "rejecting invalid rule pattern"
            );
            return Err(SymbolError::InvalidPattern {
                pattern: pattern.to_string(),
            });
        }
        let Some(rules) = self.resolve_rules(ctx, Access::Write) else {
            return Ok(false);
        };
        let changed = rules.cache(category).try_change(pattern, body, matcher)?;
        if changed {
            self.update();
        }
        Ok(changed)
    }

    pub fn undefine(
        &self,
        ctx: &ThreadContext,
        category: RuleCategory,
        pattern: Term,
    ) -> SymbolResult<bool> {
        self.define(ctx, category, pattern, Term::Undefined)
    }

    /// Rewrites `term` with the most specific applicable rule of `category`.
    pub fn find(
        &self,
        ctx: &ThreadContext,
        category: RuleCategory,
        term: &Term,
    ) -> Option<Arc<Term>> {
        let table = self.table().ok()?;
        let rules = self.rules(ctx, Access::Read).ok()??;
        rules
            .cache(category)
            .find(term, &*table.semantics.matcher, &*table.semantics.evaluator)
    }

    pub fn rule_list(&self, ctx: &ThreadContext, category: RuleCategory) -> Vec<Rule> {
        match self.rules(ctx, Access::Read) {
            Ok(Some(rules)) => rules.cache(category).rules(),
            _ => Vec::new(),
        }
    }

    pub fn set_message(
        &self,
        ctx: &ThreadContext,
        tag: &str,
        template: Option<Term>,
    ) -> SymbolResult<bool> {
        let Some(rules) = self.rules(ctx, Access::Write)? else {
            return Ok(false);
        };
        let changed = rules.set_message(tag, template);
        if changed {
            self.update();
        }
        Ok(changed)
    }

    pub fn message(&self, ctx: &ThreadContext, tag: &str) -> Option<Arc<Term>> {
        self.rules(ctx, Access::Read).ok()??.message(tag)
    }

    /// Drops the value, every rule and every message.
    pub fn clear(&self, ctx: &ThreadContext) -> SymbolResult<()> {
        self.check_writable()?;
        self.clear_unchecked(ctx);
        Ok(())
    }

    fn clear_unchecked(&self, ctx: &ThreadContext) {
        if self.is_thread_local() {
            ctx.forget(self);
        }
        self.data.release_contents();
        self.update();
    }

    // ------------------------------------------------------------------
    // Dynamic tracking
    // ------------------------------------------------------------------

    pub fn current_tracker(&self) -> TrackerId {
        self.data.current_tracker.load(Ordering::Acquire)
    }

    pub fn ignored_tracker(&self) -> TrackerId {
        self.data.ignored_tracker.load(Ordering::Acquire)
    }

    /// Prevents `id` from ever being bound to this symbol.
    pub fn set_ignored_tracker(&self, id: TrackerId) {
        self.data.ignored_tracker.store(id, Ordering::Release);
    }

    /// Registers `id` as an observer of this symbol.
    pub fn track(&self, id: TrackerId) {
        if id == 0 || id == self.ignored_tracker() {
            return;
        }
        if self.data.current_tracker.swap(id, Ordering::AcqRel) == id {
            return;
        }
        if let Ok(table) = self.table() {
            table.dynamic.bind(self.data.serial(), id);
        }
    }

    /// Hands the symbol from observer `old` to `other`, unless it has
    /// already moved on to a different observer.
    pub fn lost_tracker(&self, old: TrackerId, other: TrackerId) -> bool {
        self.data
            .current_tracker
            .compare_exchange(old, other, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Change stamp of the most recent mutation.
    pub fn last_change(&self) -> u64 {
        self.data.last_change.load(Ordering::Acquire)
    }

    /// Marks the symbol as changed: stamps it and notifies its observers.
    pub fn update(&self) {
        let Ok(table) = self.table() else {
            return;
        };
        self.data.last_change.store(table.next_stamp(), Ordering::Release);
        let prior = self.data.current_tracker.swap(0, Ordering::AcqRel);
        if prior == 0 {
            return;
        }
        let mut trackers = table.dynamic.update(self.data.serial());
        if !trackers.contains(&prior) {
            trackers.push(prior);
        }
        trace!(
            target: "symtable::symbol::update",
            symbol = self.name(), trackers = trackers.len(), "notifying observers"
        );
        table.semantics.evaluator.dynamic_updated(&trackers);
    }

    /// Runs `f` while holding this symbol's re-entrant monitor.
    pub fn synchronized<R>(&self, f: impl FnOnce() -> R) -> R {
        let _held = self.data.monitor.lock();
        f()
    }
}

impl Clone for Symbol {
    fn clone(&self) -> Self {
        Symbol::acquire(&self.data)
    }
}

impl Drop for Symbol {
    fn drop(&mut self) {
        // SAFETY: `data` is not used again after being taken here.
        let data = unsafe { ManuallyDrop::take(&mut self.data) };
        if data.refs.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        if let Some(table) = data.table.upgrade() {
            table.remove(data);
        }
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.data).hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Symbol")
            .field("name", &self.name())
            .field("attributes", &self.attributes())
            .field("refs", &self.ref_count())
            .finish()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
