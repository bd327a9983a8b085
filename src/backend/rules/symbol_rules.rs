use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::RuleCache;
use crate::backend::atomic::SwapLock;
use crate::backend::models::Term;

/// Which of a symbol's rule caches a definition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleCategory {
    /// `f /: g(f) := ...`
    Up,
    /// `f(...) := ...`
    Down,
    /// `f(...)(...) := ...`
    Sub,
    /// Numeric approximation rules
    Approximate,
    /// Default values
    Default,
    /// Output formatting rules
    Format,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 6] = [
        RuleCategory::Up,
        RuleCategory::Down,
        RuleCategory::Sub,
        RuleCategory::Approximate,
        RuleCategory::Default,
        RuleCategory::Format,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// The complete rule state of one symbol: six rule caches plus the
/// message templates keyed by tag (`f::usage`, `f::argx`, ...).
#[derive(Default)]
pub struct SymbolRules {
    caches: [RuleCache; 6],
    messages: SwapLock<HashMap<String, Arc<Term>>>,
}

impl SymbolRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self, category: RuleCategory) -> &RuleCache {
        &self.caches[category.index()]
    }

    /// Sets (or with `None` removes) a message template.
    pub fn set_message(&self, tag: &str, template: Option<Term>) -> bool {
        let mut messages = self.messages.lock();
        match template {
            Some(template) => {
                let template = Arc::new(template);
                match messages.insert(tag.to_string(), Arc::clone(&template)) {
                    Some(old) => old != template,
                    None => true,
                }
            }
            None => messages.remove(tag).is_some(),
        }
    }

    pub fn message(&self, tag: &str) -> Option<Arc<Term>> {
        self.messages.lock().get(tag).cloned()
    }

    pub fn message_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.messages.lock().keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn rule_count(&self) -> usize {
        self.caches.iter().map(RuleCache::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.iter().all(RuleCache::is_empty) && self.messages.lock().is_empty()
    }

    /// A deep copy of every cache, the format rules included.
    pub fn copy(&self) -> SymbolRules {
        let messages = self.messages.lock().clone();
        SymbolRules {
            caches: std::array::from_fn(|i| self.caches[i].copy()),
            messages: SwapLock::new(messages),
        }
    }

    pub fn clear(&self) {
        for cache in &self.caches {
            cache.clear();
        }
        let old = self.messages.replace(HashMap::new());
        drop(old);
    }
}

impl fmt::Debug for SymbolRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("SymbolRules");
        for category in RuleCategory::ALL {
            out.field(&format!("{:?}", category).to_lowercase(), self.cache(category));
        }
        out.finish_non_exhaustive()
    }
}
