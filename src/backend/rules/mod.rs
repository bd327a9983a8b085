//! Rule caches: per-symbol definition stores.
//!
//! A [`RuleCache`] keeps rules with constant patterns in a hash map for
//! O(1) lookup and everything else in a [`RuleChain`] ordered from most to
//! least specific pattern. [`SymbolRules`] groups the six caches a symbol
//! owns together with its message templates.

mod cache;
mod chain;
mod symbol_rules;


pub use cache::RuleCache;
pub use chain::{ChainIter, RuleChain};
pub use symbol_rules::{RuleCategory, SymbolRules};
