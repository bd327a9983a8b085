//! Ordered list of general rules.
//!
//! Nodes are immutable once linked: a redefinition splices in a fresh node.
//! A link is edited only while its slot is held, and a node being unlinked
//! is marked retired while its own `next` slot is held, so an insertion
//! behind a node that is concurrently going away observes that and rescans.
//! Readers never hold more than one slot at a time.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use tracing::trace;

use crate::backend::atomic::AtomicSlot;
use crate::backend::matcher::{Evaluator, PatternMatcher};
use crate::backend::models::{Rule, Term};

pub(crate) struct ChainNode {
    pattern: Arc<Term>,
    body: Arc<Term>,
    next: AtomicSlot<ChainNode>,
    retired: AtomicBool,
}

impl ChainNode {
    fn new(pattern: Arc<Term>, body: Arc<Term>, next: Option<Arc<ChainNode>>) -> Self {
        ChainNode {
            pattern,
            body,
            next: AtomicSlot::new(next),
            retired: AtomicBool::new(false),
        }
    }

    fn is_retired(&self) -> bool {
        self.retired.load(AtomicOrdering::Acquire)
    }
}

fn same_node(a: Option<&Arc<ChainNode>>, b: Option<&Arc<ChainNode>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// Outcome of one [`RuleChain::apply`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChainEdit {
    pub inserted: usize,
    pub removed: usize,
    pub replaced: bool,
}

impl ChainEdit {
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.removed > 0 || self.replaced
    }

    /// Net change in the number of nodes for the edited pattern.
    pub fn delta(&self) -> isize {
        self.inserted as isize - self.removed as isize
    }
}

/// Rules sorted from most to least specific pattern.
#[derive(Default)]
pub struct RuleChain {
    head: AtomicSlot<ChainNode>,
}

impl RuleChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_empty()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Snapshot-free walk in chain order. Concurrent edits may or may not be
    /// observed, but every rule seen was linked at some point of the walk.
    pub fn iter(&self) -> ChainIter {
        ChainIter {
            next: self.head.read(),
        }
    }

    /// First matching rule whose condition (if any) holds, instantiated.
    pub fn find(
        &self,
        term: &Term,
        matcher: &dyn PatternMatcher,
        evaluator: &dyn Evaluator,
    ) -> Option<Arc<Term>> {
        for rule in self.iter() {
            let Some(bindings) = matcher.matches(term, &rule.pattern) else {
                continue;
            };
            match rule.body.split_condition() {
                Some((value, test)) => {
                    let test = matcher.substitute(test, &bindings);
                    if evaluator.condition_holds(&test) {
                        return Some(Arc::new(matcher.substitute(value, &bindings)));
                    }
                }
                None if bindings.is_empty() => return Some(rule.body),
                None => return Some(Arc::new(matcher.substitute(&rule.body, &bindings))),
            }
        }
        None
    }

    /// Inserts, replaces or (for an undefined body) removes the rule for
    /// `pattern`. Returns whether the chain changed.
    pub fn change(
        &self,
        pattern: &Arc<Term>,
        body: &Arc<Term>,
        matcher: &dyn PatternMatcher,
    ) -> bool {
        self.apply(pattern, body, matcher).changed()
    }

    /// Same as [`RuleChain::change`], reporting how many nodes for the
    /// pattern were linked or unlinked.
    pub(crate) fn apply(
        &self,
        pattern: &Arc<Term>,
        body: &Arc<Term>,
        matcher: &dyn PatternMatcher,
    ) -> ChainEdit {
        let mut edit = ChainEdit::default();
        let mut attempts = 0u32;
        while !self.try_change(pattern, body, matcher, &mut edit) {
            attempts += 1;
            trace!(
                target: "symtable::rules::chain::change",
                pattern = %pattern, attempts, "chain edited concurrently, rescanning"
            );
        }
        edit
    }

    /// One scan of the chain. Returns false when a link under edit changed
    /// between traversal and locking; `edit` accumulates across scans.
    fn try_change(
        &self,
        pattern: &Arc<Term>,
        body: &Arc<Term>,
        matcher: &dyn PatternMatcher,
        edit: &mut ChainEdit,
    ) -> bool {
        let removing = body.is_undefined();
        let conditioned = body.has_condition();

        let mut prev: Option<Arc<ChainNode>> = None;
        let mut current = self.head.read();

        while let Some(node) = current {
            let mut order = matcher.compare(pattern, &node.pattern);
            if order == Ordering::Equal {
                if node.body.has_condition() {
                    if removing {
                        // Removal takes every rule for the pattern, guarded or not.
                        if !self.unlink(prev.as_ref(), &node, None) {
                            return false;
                        }
                        edit.removed += 1;
                        current = node.next.read();
                        continue;
                    }
                    if *node.body == **body {
                        return true;
                    }
                    // Guarded rules for one pattern keep definition order.
                    order = Ordering::Greater;
                } else if conditioned {
                    // Guarded rules precede the unguarded fallback.
                    order = Ordering::Less;
                }
            }

            match order {
                Ordering::Equal => {
                    if !removing && *node.body == **body {
                        return true;
                    }
                    let replacement = (!removing).then(|| (Arc::clone(pattern), Arc::clone(body)));
                    if !self.unlink(prev.as_ref(), &node, replacement) {
                        return false;
                    }
                    if removing {
                        edit.removed += 1;
                    } else {
                        edit.replaced = true;
                    }
                    return true;
                }
                Ordering::Less => {
                    if removing {
                        return true;
                    }
                    let fresh = ChainNode::new(
                        Arc::clone(pattern),
                        Arc::clone(body),
                        Some(Arc::clone(&node)),
                    );
                    if !self.relink(prev.as_ref(), Some(&node), Arc::new(fresh)) {
                        return false;
                    }
                    edit.inserted += 1;
                    return true;
                }
                Ordering::Greater => {
                    current = node.next.read();
                    prev = Some(node);
                }
            }
        }

        if removing {
            return true;
        }
        let fresh = ChainNode::new(Arc::clone(pattern), Arc::clone(body), None);
        if !self.relink(prev.as_ref(), None, Arc::new(fresh)) {
            return false;
        }
        edit.inserted += 1;
        true
    }

    fn link<'a>(&'a self, prev: Option<&'a Arc<ChainNode>>) -> &'a AtomicSlot<ChainNode> {
        match prev {
            Some(node) => &node.next,
            None => &self.head,
        }
    }

    /// Stores `fresh` into the link owned by `prev` if it still points at
    /// `expected` and `prev` is still part of the chain.
    fn relink(
        &self,
        prev: Option<&Arc<ChainNode>>,
        expected: Option<&Arc<ChainNode>>,
        fresh: Arc<ChainNode>,
    ) -> bool {
        let guard = self.link(prev).read_start();
        if prev.is_some_and(|p| p.is_retired()) || !same_node(guard.get(), expected) {
            return false;
        }
        drop(guard.read_end(Some(fresh)));
        true
    }

    /// Detaches `node` from the link owned by `prev`, splicing in a
    /// replacement rule in its place when one is given.
    fn unlink(
        &self,
        prev: Option<&Arc<ChainNode>>,
        node: &Arc<ChainNode>,
        replacement: Option<(Arc<Term>, Arc<Term>)>,
    ) -> bool {
        let guard = self.link(prev).read_start();
        if prev.is_some_and(|p| p.is_retired()) || !same_node(guard.get(), Some(node)) {
            return false;
        }
        let successor = {
            let next = node.next.read_start();
            node.retired.store(true, AtomicOrdering::Release);
            next.get().cloned()
        };
        let link = match replacement {
            Some((pattern, body)) => Some(Arc::new(ChainNode::new(pattern, body, successor))),
            None => successor,
        };
        drop(guard.read_end(link));
        true
    }

    /// Removes every rule.
    pub fn clear(&self) {
        let detached = self.head.take();
        drop_iteratively(detached);
    }

    /// Moves every rule into a new chain, leaving this one empty.
    pub(crate) fn detach(&self) -> RuleChain {
        RuleChain {
            head: AtomicSlot::new(self.head.take()),
        }
    }

    /// An independent chain holding the same rules in the same order.
    pub fn deep_copy(&self) -> RuleChain {
        let rules: Vec<Rule> = self.iter().collect();
        let mut next = None;
        for rule in rules.into_iter().rev() {
            next = Some(Arc::new(ChainNode::new(rule.pattern, rule.body, next)));
        }
        RuleChain {
            head: AtomicSlot::new(next),
        }
    }
}

impl Drop for RuleChain {
    fn drop(&mut self) {
        drop_iteratively(self.head.take());
    }
}

// Long chains would otherwise recurse once per node through `Drop`.
fn drop_iteratively(mut next: Option<Arc<ChainNode>>) {
    while let Some(node) = next {
        next = match Arc::try_unwrap(node) {
            Ok(node) => node.next.take(),
            Err(_) => None,
        };
    }
}

pub struct ChainIter {
    next: Option<Arc<ChainNode>>,
}

impl Iterator for ChainIter {
    type Item = Rule;

    fn next(&mut self) -> Option<Rule> {
        let node = self.next.take()?;
        self.next = node.next.read();
        Some(Rule::from_arc(Arc::clone(&node.pattern), Arc::clone(&node.body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::matcher::{BasicEvaluator, StructuralMatcher};

    fn rule(pattern: Term, body: Term) -> (Arc<Term>, Arc<Term>) {
        (Arc::new(pattern), Arc::new(body))
    }

    fn define(chain: &RuleChain, pattern: Term, body: Term) -> bool {
        let (p, b) = rule(pattern, body);
        chain.change(&p, &b, &StructuralMatcher)
    }

    fn patterns(chain: &RuleChain) -> Vec<String> {
        chain.iter().map(|r| r.pattern.to_string()).collect()
    }

    fn f(arg: Term) -> Term {
        Term::call("f", [arg])
    }

    #[test]
    fn test_specific_rules_sort_first() {
        let chain = RuleChain::new();
        assert!(define(&chain, f(Term::pattern("x")), Term::Integer(0)));
        assert!(define(&chain, f(Term::Integer(1)), Term::Integer(1)));
        assert_eq!(patterns(&chain), ["f(1)", "f(~x)"]);
    }

    #[test]
    fn test_redefinition_replaces_in_place() {
        let chain = RuleChain::new();
        define(&chain, f(Term::pattern("x")), Term::Integer(0));
        assert!(define(&chain, f(Term::pattern("y")), Term::Integer(9)));
        assert_eq!(chain.len(), 1);
        let found = chain.find(&f(Term::Integer(3)), &StructuralMatcher, &BasicEvaluator);
        assert_eq!(found.as_deref(), Some(&Term::Integer(9)));
        assert!(!define(&chain, f(Term::pattern("z")), Term::Integer(9)));
    }

    #[test]
    fn test_guarded_rule_precedes_fallback() {
        let chain = RuleChain::new();
        let guarded = Term::condition(
            Term::atom("x"),
            Term::call("Greater", [Term::atom("x"), Term::Integer(0)]),
        );
        define(&chain, f(Term::pattern("x")), Term::string("other"));
        define(&chain, f(Term::pattern("x")), guarded.clone());
        assert_eq!(chain.len(), 2);

        let m = StructuralMatcher;
        let e = BasicEvaluator;
        assert_eq!(
            chain.find(&f(Term::Integer(5)), &m, &e).as_deref(),
            Some(&Term::Integer(5))
        );
        assert_eq!(
            chain.find(&f(Term::Integer(-1)), &m, &e).as_deref(),
            Some(&Term::string("other"))
        );
        // The same guarded rule again is not a change.
        assert!(!define(&chain, f(Term::pattern("x")), guarded));
    }

    #[test]
    fn test_remove_takes_guarded_and_plain() {
        let chain = RuleChain::new();
        let guarded = |i| Term::condition(Term::Integer(i), Term::boolean(true));
        define(&chain, f(Term::pattern("x")), guarded(1));
        define(&chain, f(Term::pattern("x")), guarded(2));
        define(&chain, f(Term::pattern("x")), Term::Integer(3));
        define(&chain, Term::call("g", []), Term::Integer(4));
        assert_eq!(chain.len(), 4);

        assert!(define(&chain, f(Term::pattern("x")), Term::Undefined));
        assert_eq!(patterns(&chain), ["g()"]);
        assert!(!define(&chain, f(Term::pattern("x")), Term::Undefined));
    }

    #[test]
    fn test_apply_counts_nodes_for_pattern() {
        let chain = RuleChain::new();
        let m = StructuralMatcher;
        let (p, plain) = rule(f(Term::Integer(1)), Term::Integer(1));
        let guarded = Arc::new(Term::condition(Term::Integer(2), Term::boolean(false)));
        let other = Arc::new(Term::Integer(3));
        let gone = Arc::new(Term::Undefined);

        assert_eq!(chain.apply(&p, &plain, &m).delta(), 1);
        assert_eq!(chain.apply(&p, &guarded, &m).delta(), 1);
        let replaced = chain.apply(&p, &other, &m);
        assert!(replaced.replaced);
        assert_eq!(replaced.delta(), 0);
        assert!(!chain.apply(&p, &guarded, &m).changed());

        let removed = chain.apply(&p, &gone, &m);
        assert_eq!(removed.removed, 2);
        assert!(chain.is_empty());
    }

    #[test]
    fn test_detach_empties_source() {
        let chain = RuleChain::new();
        define(&chain, f(Term::pattern("x")), Term::Integer(0));
        let detached = chain.detach();
        assert!(chain.is_empty());
        assert_eq!(patterns(&detached), ["f(~x)"]);
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let chain = RuleChain::new();
        define(&chain, f(Term::Integer(1)), Term::Integer(1));
        define(&chain, f(Term::pattern("x")), Term::Integer(0));
        let copy = chain.deep_copy();
        chain.clear();
        assert!(chain.is_empty());
        assert_eq!(patterns(&copy), ["f(1)", "f(~x)"]);
    }

    #[test]
    fn test_long_chain_drops_without_recursion() {
        let mut next = None;
        for i in (0..200_000).rev() {
            next = Some(Arc::new(ChainNode::new(
                Arc::new(f(Term::Integer(i))),
                Arc::new(Term::Integer(i)),
                next,
            )));
        }
        let chain = RuleChain {
            head: AtomicSlot::new(next),
        };
        assert_eq!(chain.iter().take(3).count(), 3);
        drop(chain);
    }
}
