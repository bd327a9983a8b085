use std::sync::{Arc, LazyLock};

use tracing::trace;

use crate::backend::atomic::AtomicSlot;
use crate::backend::matcher::{Evaluator, PatternMatcher};
use crate::backend::models::Term;
use crate::backend::rules::RuleChain;

static UNDEFINED: LazyLock<Arc<Term>> = LazyLock::new(|| Arc::new(Term::Undefined));

pub(crate) fn undefined() -> Arc<Term> {
    Arc::clone(&UNDEFINED)
}

/// What a [`ValueCell`] currently holds.
enum Stored {
    Plain(Arc<Term>),
    /// Guarded definitions keyed on the symbol, tried in chain order.
    Guarded(RuleChain),
}

/// Storage for a symbol's own value.
///
/// A plain value sits in a single slot. Once a guarded value (`x := v /; c`)
/// is assigned, the definitions move into a rule chain keyed on the symbol
/// itself, and reading the value runs that chain. The mode lives in the
/// same slot as the content, and writers hold the slot for the whole edit,
/// so a switch between modes is never observed half done.
pub struct ValueCell {
    state: AtomicSlot<Stored>,
}

impl ValueCell {
    pub fn new() -> Self {
        Self::with_value(undefined())
    }

    pub fn with_value(value: Arc<Term>) -> Self {
        ValueCell {
            state: AtomicSlot::new(Some(Arc::new(Stored::Plain(value)))),
        }
    }

    /// The current value of `owner`, Undefined when unset or when no guard holds.
    pub fn get(
        &self,
        owner: &Term,
        matcher: &dyn PatternMatcher,
        evaluator: &dyn Evaluator,
    ) -> Arc<Term> {
        match self.state.read().as_deref() {
            Some(Stored::Plain(value)) => Arc::clone(value),
            Some(Stored::Guarded(chain)) => chain
                .find(owner, matcher, evaluator)
                .unwrap_or_else(undefined),
            None => undefined(),
        }
    }

    /// The raw stored value, without running guarded definitions.
    pub fn stored(&self) -> Arc<Term> {
        match self.state.read().as_deref() {
            Some(Stored::Plain(value)) => Arc::clone(value),
            _ => undefined(),
        }
    }

    pub fn is_guarded(&self) -> bool {
        matches!(self.state.read().as_deref(), Some(Stored::Guarded(_)))
    }

    /// Assigns a value definition. Returns whether anything changed.
    pub fn assign(&self, owner: &Arc<Term>, value: Term, matcher: &dyn PatternMatcher) -> bool {
        let value = Arc::new(value);
        let guard = self.state.read_start();
        let current = guard.get().cloned();

        if let Some(Stored::Guarded(chain)) = current.as_deref() {
            let changed = chain.change(owner, &value, matcher);
            if chain.is_empty() {
                drop(guard.read_end(Some(Arc::new(Stored::Plain(undefined())))));
            }
            return changed;
        }

        let plain = match current.as_deref() {
            Some(Stored::Plain(plain)) => Arc::clone(plain),
            _ => undefined(),
        };
        if !value.has_condition() {
            let changed = plain != value;
            drop(guard.read_end(Some(Arc::new(Stored::Plain(value)))));
            return changed;
        }

        // The chain is private until published, readers keep seeing `plain`.
        let chain = RuleChain::new();
        if !plain.is_undefined() {
            trace!(
                target: "symtable::symbol::value::assign",
                owner = %owner, "plain value moved behind guard"
            );
            chain.change(owner, &plain, matcher);
        }
        let changed = chain.change(owner, &value, matcher);
        drop(guard.read_end(Some(Arc::new(Stored::Guarded(chain)))));
        changed
    }

    /// Replaces the value unconditionally, dropping guarded definitions.
    /// Returns the previous plain value.
    pub fn set(&self, value: Arc<Term>) -> Arc<Term> {
        let old = self.state.write(Some(Arc::new(Stored::Plain(value))));
        match old.as_deref() {
            Some(Stored::Plain(old)) => Arc::clone(old),
            _ => undefined(),
        }
    }

    pub fn clear(&self) {
        self.set(undefined());
    }

    pub fn copy(&self) -> ValueCell {
        let copied = match self.state.read().as_deref() {
            Some(Stored::Guarded(chain)) => Stored::Guarded(chain.deep_copy()),
            Some(Stored::Plain(value)) => Stored::Plain(Arc::clone(value)),
            None => Stored::Plain(undefined()),
        };
        ValueCell {
            state: AtomicSlot::new(Some(Arc::new(copied))),
        }
    }
}

impl Default for ValueCell {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ValueCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guarded = match self.state.read().as_deref() {
            Some(Stored::Guarded(chain)) => chain.len(),
            _ => 0,
        };
        f.debug_struct("ValueCell")
            .field("value", &self.stored())
            .field("guarded", &guarded)
            .finish()
    }
}
