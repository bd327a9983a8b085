use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_utils::Backoff;
use tracing::{trace, warn};

use super::chain::RuleChain;
use crate::backend::atomic::{SwapGuard, SwapLock};
use crate::backend::error::{SymbolError, SymbolResult};
use crate::backend::matcher::{Evaluator, PatternMatcher};
use crate::backend::models::{Rule, Term};

/// Bookkeeping for a constant pattern whose rules live in the chain
/// because at least one of them is guarded.
#[derive(Debug, Default, Clone, Copy)]
struct Chained {
    /// Chain edits for the pattern that have started and not yet settled.
    pending: usize,
    /// Chain nodes for the pattern, as reported by settled edits.
    live: isize,
    /// The map rule is being copied into the chain. It stays in the map
    /// until the copy is linked; other edits of the pattern wait.
    migrating: bool,
}

#[derive(Default, Clone)]
struct ConstTable {
    rules: HashMap<Arc<Term>, Arc<Term>>,
    /// A pattern is either a key of `rules` or of `chained`, never both,
    /// except while `migrating`.
    chained: HashMap<Arc<Term>, Chained>,
}

impl ConstTable {
    fn is_quiet(&self) -> bool {
        self.chained.values().all(|c| c.pending == 0)
    }
}

/// Per-symbol rule store: constant patterns in a hash map, everything else
/// in a specificity-ordered [`RuleChain`].
#[derive(Default)]
pub struct RuleCache {
    table: SwapLock<ConstTable>,
    chain: RuleChain,
}

/// Where an edit of a constant pattern goes once the table has been read.
enum Route {
    /// Handled in the map with this result.
    Done(bool),
    /// Registered as pending on the chain, carrying the map rule to migrate.
    Chain(Option<Arc<Term>>),
}

impl RuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().rules.is_empty() && self.chain.is_empty()
    }

    pub fn len(&self) -> usize {
        self.table.lock().rules.len() + self.chain.len()
    }

    /// The right-hand side for the most specific rule matching `term`.
    pub fn find(
        &self,
        term: &Term,
        matcher: &dyn PatternMatcher,
        evaluator: &dyn Evaluator,
    ) -> Option<Arc<Term>> {
        let hit = {
            let table = self.table.lock();
            table.rules.get(term).cloned()
        };
        hit.or_else(|| self.chain.find(term, matcher, evaluator))
    }

    /// Defines, replaces or (for an undefined body) removes a rule.
    ///
    /// Returns whether anything changed. An invalid pattern changes nothing
    /// and is reported through `tracing`.
    pub fn change(&self, pattern: Term, body: Term, matcher: &dyn PatternMatcher) -> bool {
        self.try_change(pattern, body, matcher).unwrap_or(false)
    }

    pub fn try_change(
        &self,
        pattern: Term,
        body: Term,
        matcher: &dyn PatternMatcher,
    ) -> SymbolResult<bool> {
        if !matcher.is_valid(&pattern) {
            warn!(
                target: "symtable::rules::cache::change",
                %pattern, "rejecting invalid rule pattern"
            );
            return Err(SymbolError::InvalidPattern {
                pattern: pattern.to_string(),
            });
        }
        let pattern = Arc::new(pattern);
        let body = Arc::new(body);
        if !matcher.is_constant(&pattern) {
            return Ok(self.chain.change(&pattern, &body, matcher));
        }

        let staged = match self.route(&pattern, &body) {
            Route::Done(changed) => return Ok(changed),
            Route::Chain(staged) => staged,
        };

        let mut live = 0;
        if let Some(plain) = staged {
            live += self.chain.apply(&pattern, &plain, matcher).delta();
            let old = {
                let mut table = self.table.lock();
                if let Some(state) = table.chained.get_mut(&*pattern) {
                    state.migrating = false;
                }
                table.rules.remove(&*pattern)
            };
            drop(old);
            trace!(
                target: "symtable::rules::cache::migrate",
                %pattern, "constant rule moved into chain"
            );
        }
        let edit = self.chain.apply(&pattern, &body, matcher);
        live += edit.delta();
        self.settle(&pattern, live);
        Ok(edit.changed())
    }

    /// Decides under the map lock whether a constant-pattern edit stays in
    /// the map or goes to the chain. Chain-bound edits are counted as
    /// pending until [`RuleCache::settle`].
    fn route(&self, pattern: &Arc<Term>, body: &Arc<Term>) -> Route {
        let backoff = Backoff::new();
        loop {
            let mut table = self.table.lock();
            match table.chained.get_mut(&**pattern) {
                Some(state) if state.migrating => {}
                Some(state) => {
                    state.pending += 1;
                    return Route::Chain(None);
                }
                None if !body.has_condition() => {
                    return Route::Done(Self::change_mapped(table, pattern, body));
                }
                None => {
                    if table.chained.try_reserve(1).is_err() {
                        warn!(
                            target: "symtable::rules::cache::change",
                            %pattern, "chained pattern table is full"
                        );
                        return Route::Done(false);
                    }
                    let staged = table.rules.get(&**pattern).cloned();
                    let state = Chained {
                        pending: 1,
                        live: 0,
                        migrating: staged.is_some(),
                    };
                    table.chained.insert(Arc::clone(pattern), state);
                    return Route::Chain(staged);
                }
            }
            drop(table);
            backoff.snooze();
        }
    }

    /// Plain edit of a constant pattern that has no chain rules.
    fn change_mapped(
        mut table: SwapGuard<'_, ConstTable>,
        pattern: &Arc<Term>,
        body: &Arc<Term>,
    ) -> bool {
        if body.is_undefined() {
            let old = table.rules.remove(&**pattern);
            drop(table);
            return old.is_some();
        }
        if let Some(slot) = table.rules.get_mut(&**pattern) {
            let changed = **slot != **body;
            let old = std::mem::replace(slot, Arc::clone(body));
            drop(table);
            drop(old);
            return changed;
        }
        if table.rules.try_reserve(1).is_err() {
            warn!(
                target: "symtable::rules::cache::change",
                %pattern, "constant rule table is full"
            );
            return false;
        }
        table.rules.insert(Arc::clone(pattern), Arc::clone(body));
        true
    }

    /// Ends a chain-bound edit. Once no edit is pending and no chain rule is
    /// left for the pattern, its definitions go back to the map.
    fn settle(&self, pattern: &Term, live: isize) {
        let mut table = self.table.lock();
        let Some(state) = table.chained.get_mut(pattern) else {
            return;
        };
        state.pending -= 1;
        state.live += live;
        if state.pending == 0 && state.live <= 0 {
            let key = table.chained.remove_entry(pattern);
            drop(table);
            drop(key);
            trace!(
                target: "symtable::rules::cache::settle",
                %pattern, "constant pattern back in map"
            );
        }
    }

    /// Takes the map lock at a moment with no chain-bound constant edit in
    /// flight, so the map and the chain agree for as long as it is held.
    fn quiet_table(&self) -> SwapGuard<'_, ConstTable> {
        let backoff = Backoff::new();
        loop {
            let table = self.table.lock();
            if table.is_quiet() {
                return table;
            }
            drop(table);
            backoff.snooze();
        }
    }

    /// All rules: constant patterns first (in no particular order), then
    /// the chain from most to least specific.
    pub fn rules(&self) -> Vec<Rule> {
        let (mut out, staged): (Vec<Rule>, Vec<Arc<Term>>) = {
            let table = self.table.lock();
            let rules = table
                .rules
                .iter()
                .map(|(p, b)| Rule::from_arc(Arc::clone(p), Arc::clone(b)))
                .collect();
            let staged = table
                .chained
                .iter()
                .filter(|(_, state)| state.migrating)
                .filter_map(|(p, _)| table.rules.get(p).cloned())
                .collect();
            (rules, staged)
        };
        // A rule being migrated is reported once, from the map.
        out.extend(
            self.chain
                .iter()
                .filter(|rule| !staged.iter().any(|b| Arc::ptr_eq(b, &rule.body))),
        );
        out
    }

    pub fn clear(&self) {
        let (old, detached) = {
            let mut table = self.quiet_table();
            (std::mem::take(&mut *table), self.chain.detach())
        };
        drop(old);
        drop(detached);
    }

    /// An independent cache with the same content.
    pub fn copy(&self) -> RuleCache {
        let table = self.quiet_table();
        RuleCache {
            table: SwapLock::new(table.clone()),
            chain: self.chain.deep_copy(),
        }
    }
}

impl std::fmt::Debug for RuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleCache")
            .field("constant", &self.table.lock().rules.len())
            .field("general", &self.chain.len())
            .finish()
    }
}
