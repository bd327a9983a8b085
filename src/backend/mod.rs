// Backend module for the symbol table and rule caches
//
// Layering, bottom-up:
// - `atomic`: pointer-swap locks and the lock-free free list
// - `models`: terms, bindings and rules
// - `matcher`: pattern engine and evaluator seams
// - `rules`: rule chains, rule caches, per-symbol rule sets
// - `dynamic`: observer registry for change tracking
// - `threads`: thread-local override store
// - `symbol`: symbols and the global symbol table

pub mod atomic;
pub mod config;
pub mod dynamic;
pub mod error;
pub mod matcher;
pub mod models;
pub mod rules;
pub mod symbol;
pub mod threads;

pub use config::TableConfig;
pub use dynamic::{DynamicRegistry, TrackerId};
pub use error::{Diagnostic, DiagnosticKind, SymbolError, SymbolResult};
pub use matcher::{BasicEvaluator, Evaluator, PatternMatcher, Semantics, StructuralMatcher};
pub use models::{Bindings, Rule, Term};
pub use rules::{RuleCache, RuleCategory, RuleChain, SymbolRules};
pub use symbol::{
    split_name, Attributes, NamespaceContext, Symbol, SymbolIter, SymbolTable, ValueCell,
    NAMESPACE_SEPARATOR,
};
pub use threads::{Access, ThreadContext};
