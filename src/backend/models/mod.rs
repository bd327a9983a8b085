pub mod bindings;
pub mod term;

pub use bindings::Bindings;
pub use term::Term;

use std::sync::Arc;

/// A stored definition `pattern -> body`.
/// Both sides are shared with the cache that holds them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub pattern: Arc<Term>,
    pub body: Arc<Term>,
}

impl Rule {
    pub fn new(pattern: Term, body: Term) -> Self {
        Rule {
            pattern: Arc::new(pattern),
            body: Arc::new(body),
        }
    }

    pub fn from_arc(pattern: Arc<Term>, body: Arc<Term>) -> Self {
        Rule { pattern, body }
    }

    #[inline]
    pub fn is_conditional(&self) -> bool {
        self.body.has_condition()
    }
}
