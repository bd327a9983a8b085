//! Seams to the pattern engine and evaluator.
//!
//! The symbol table never interprets terms itself. Ordering rules by
//! specificity, matching terms, and testing conditions are delegated to a
//! [`PatternMatcher`]. Notifications go out through an [`Evaluator`].
//! A [`Semantics`] bundles both for a table.

mod evaluator;
mod structural;

pub use evaluator::BasicEvaluator;
pub use structural::StructuralMatcher;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::backend::dynamic::TrackerId;
use crate::backend::error::Diagnostic;
use crate::backend::models::{Bindings, Term};

/// Pattern engine used by rule caches.
pub trait PatternMatcher: Send + Sync {
    /// Whether `pattern` may be stored as a rule pattern at all.
    fn is_valid(&self, pattern: &Term) -> bool;

    /// Whether `pattern` contains no pattern constructs, so it only ever
    /// matches a term equal to itself.
    fn is_constant(&self, pattern: &Term) -> bool;

    /// Total order on patterns. `Less` means `a` is more specific than `b`;
    /// `Equal` means the two patterns are interchangeable.
    fn compare(&self, a: &Term, b: &Term) -> Ordering;

    /// Matches `term` against `pattern`, returning the variable bindings.
    fn matches(&self, term: &Term, pattern: &Term) -> Option<Bindings>;

    /// Instantiates `body` with `bindings`.
    fn substitute(&self, body: &Term, bindings: &Bindings) -> Term;
}

/// Evaluator hooks the table calls back into.
pub trait Evaluator: Send + Sync {
    /// Tests the (already instantiated) condition of a guarded rule.
    fn condition_holds(&self, condition: &Term) -> bool;

    /// Called once for every symbol created while the table is running.
    fn new_symbol(&self, _namespace: &str, _name: &str) {}

    /// The listed trackers observed a symbol that has just changed.
    fn dynamic_updated(&self, _trackers: &[TrackerId]) {}

    fn message(&self, _diagnostic: &Diagnostic) {}
}

/// The matcher and evaluator a symbol table works with.
#[derive(Clone)]
pub struct Semantics {
    pub matcher: Arc<dyn PatternMatcher>,
    pub evaluator: Arc<dyn Evaluator>,
}

impl Semantics {
    pub fn new(matcher: Arc<dyn PatternMatcher>, evaluator: Arc<dyn Evaluator>) -> Self {
        Semantics { matcher, evaluator }
    }

    pub fn with_evaluator(evaluator: Arc<dyn Evaluator>) -> Self {
        Semantics {
            matcher: Arc::new(StructuralMatcher),
            evaluator,
        }
    }
}

impl Default for Semantics {
    fn default() -> Self {
        Semantics::new(Arc::new(StructuralMatcher), Arc::new(BasicEvaluator))
    }
}

impl fmt::Debug for Semantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semantics").finish_non_exhaustive()
    }
}
