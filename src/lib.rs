/// symtable - Concurrent symbol table and rule caches
///
/// This library holds the bindings of a symbolic rewriting evaluator: every
/// named symbol, its attributes, its value and its rule sets, shared by any
/// number of evaluator threads.
///
/// # Architecture
///
/// 1. **Symbol table** (`backend::symbol`)
///    - Qualified name → symbol map behind a pointer-swap spinlock
///    - Creation-order enumeration, weakly consistent under concurrent change
///    - Temporary symbols reclaimed when their last handle is dropped
///
/// 2. **Rule caches** (`backend::rules`)
///    - Constant patterns in a hash map for O(1) lookup
///    - Everything else in a chain ordered from most to least specific
///    - Concurrent edits by optimistic retry, never a lock around the chain
///
/// 3. **Thread-local overrides** (`backend::threads`)
///    - ThreadLocal symbols get private copies per evaluator thread
///    - Copy-on-write inheritance from the parent thread context
///
/// 4. **Dynamic tracking** (`backend::dynamic`)
///    - Observers registered per symbol, notified once per change
///
/// # Example
///
/// ```rust
/// use symtable::*;
///
/// let table = SymbolTable::new();
/// let ctx = ThreadContext::root();
///
/// let f = table.lookup_or_create("Global`f").unwrap();
/// f.define(
///     &ctx,
///     RuleCategory::Down,
///     Term::call("Global`f", [Term::pattern("x")]),
///     Term::call("Global`g", [Term::atom("x")]),
/// )
/// .unwrap();
///
/// let rewritten = f
///     .find(&ctx, RuleCategory::Down, &Term::call("Global`f", [Term::Integer(2)]))
///     .unwrap();
/// assert_eq!(*rewritten, Term::call("Global`g", [Term::Integer(2)]));
/// ```
///
/// The pattern engine and the condition evaluator are collaborators: supply
/// your own through [`Semantics`] and [`SymbolTable::with_config`]. The
/// bundled [`StructuralMatcher`] and [`BasicEvaluator`] cover purely
/// syntactic matching and integer comparisons.

pub mod backend;

pub use backend::*;
