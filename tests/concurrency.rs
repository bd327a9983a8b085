//! Multi-threaded stress tests for the symbol table and rule caches
//!
//! Threads start together behind a barrier so the interesting interleavings
//! actually happen; every assertion checks the quiescent state afterwards.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use symtable::*;

const THREADS: usize = 8;

fn f(arg: Term) -> Term {
    Term::call("Global`f", [arg])
}

fn pair(a: Term, b: Term) -> Term {
    Term::call("Global`f", [a, b])
}

#[test]
fn test_lookup_or_create_is_unique_per_name() {
    let table = SymbolTable::new();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let table = table.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..100)
                    .map(|i| table.lookup_or_create(&format!("Global`s{}", i)).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let results: Vec<Vec<Symbol>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for i in 0..100 {
        let first = &results[0][i];
        assert!(results.iter().all(|symbols| symbols[i] == *first));
    }
    assert_eq!(table.len(), 100);
    assert_eq!(table.iter().count(), 100);
}

#[test]
fn test_distinct_patterns_are_never_lost() {
    let table = SymbolTable::new();
    let sym = table.lookup_or_create("Global`f").unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));
    let per_thread = 40i64;

    let handles: Vec<_> = (0..THREADS as i64)
        .map(|t| {
            let sym = sym.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let ctx = ThreadContext::root();
                barrier.wait();
                for i in 0..per_thread {
                    // Each pattern has one literal argument, so none of them
                    // is constant and all of them go to the chain.
                    let pattern = pair(Term::pattern("x"), Term::Integer(t * per_thread + i));
                    let changed = sym.define(&ctx, RuleCategory::Down, pattern, Term::Integer(i));
                    assert!(changed.unwrap());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let ctx = ThreadContext::root();
    let rules = sym.rule_list(&ctx, RuleCategory::Down);
    assert_eq!(rules.len(), THREADS * per_thread as usize);

    let matcher = StructuralMatcher;
    for window in rules.windows(2) {
        assert_ne!(matcher.compare(&window[0].pattern, &window[1].pattern), Ordering::Greater);
    }
    let distinct: HashSet<_> = rules.iter().map(|rule| rule.pattern.to_string()).collect();
    assert_eq!(distinct.len(), rules.len());
}

#[test]
fn test_concurrent_insert_and_remove_reach_expected_state() {
    let table = SymbolTable::new();
    let sym = table.lookup_or_create("Global`f").unwrap();
    let ctx = ThreadContext::root();
    for i in 0..100 {
        let pattern = pair(Term::pattern("x"), Term::Integer(i));
        sym.define(&ctx, RuleCategory::Down, pattern, Term::Integer(i))
            .unwrap();
    }

    let barrier = Arc::new(Barrier::new(2));
    let remover = {
        let sym = sym.clone();
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let ctx = ThreadContext::root();
            barrier.wait();
            for i in (0..100).step_by(2) {
                sym.undefine(&ctx, RuleCategory::Down, pair(Term::pattern("x"), Term::Integer(i)))
                    .unwrap();
            }
        })
    };
    let inserter = {
        let sym = sym.clone();
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let ctx = ThreadContext::root();
            barrier.wait();
            for i in 100..150 {
                let pattern = pair(Term::pattern("x"), Term::Integer(i));
                sym.define(&ctx, RuleCategory::Down, pattern, Term::Integer(i))
                    .unwrap();
            }
        })
    };
    remover.join().unwrap();
    inserter.join().unwrap();

    let rules = sym.rule_list(&ctx, RuleCategory::Down);
    assert_eq!(rules.len(), 100);
    for i in 0..150 {
        let found = sym.find(&ctx, RuleCategory::Down, &pair(Term::Integer(0), Term::Integer(i)));
        let expect_present = i >= 100 || i % 2 == 1;
        assert_eq!(found.is_some(), expect_present, "rule {}", i);
    }
}

#[test]
fn test_readers_always_see_stable_rule() {
    let table = SymbolTable::new();
    let sym = table.lookup_or_create("Global`f").unwrap();
    let ctx = ThreadContext::root();
    sym.define(&ctx, RuleCategory::Down, f(Term::pattern("x")), Term::string("fallback"))
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS as i64)
        .map(|t| {
            let sym = sym.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let ctx = ThreadContext::root();
                barrier.wait();
                for i in 0..200 {
                    if t % 2 == 0 {
                        let pattern = f(Term::Integer(t * 1000 + i));
                        sym.define(&ctx, RuleCategory::Down, pattern.clone(), Term::Integer(i))
                            .unwrap();
                        sym.undefine(&ctx, RuleCategory::Down, pattern).unwrap();
                    } else {
                        let term = f(Term::string("anything"));
                        let found = sym.find(&ctx, RuleCategory::Down, &term);
                        assert_eq!(found.as_deref(), Some(&Term::string("fallback")));
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_temporary_churn_leaves_no_symbols() {
    let table = SymbolTable::with_config(
        TableConfig::default().with_free_list_capacity(16),
        Semantics::default(),
    );
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let table = table.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let ctx = ThreadContext::root();
                barrier.wait();
                for i in 0..200 {
                    // Shared names force reclamation to race with revival.
                    let sym = table.create_temporary(&format!("Global`t{}", i % 5), false).unwrap();
                    sym.assign(&ctx, Term::Integer(i)).unwrap();
                    drop(sym);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(table.len(), 0);
    assert!(table.spare_count() <= 16);
}

#[test]
fn test_thread_local_writes_do_not_leak_between_workers() {
    let table = SymbolTable::new();
    let x = table.lookup_or_create("Global`x").unwrap();
    x.add_attributes(Attributes::THREAD_LOCAL);
    let root = ThreadContext::root();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS as i64)
        .map(|t| {
            let x = x.clone();
            let barrier = Arc::clone(&barrier);
            root.spawn(move |ctx| {
                barrier.wait();
                for i in 0..50 {
                    x.set_value(&ctx, Term::Integer(t * 100 + i)).unwrap();
                    assert_eq!(x.value(&ctx).as_integer(), Some(t * 100 + i));
                }
            })
            .unwrap()
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(x.value(&root).is_undefined());
}

#[test]
fn test_guarded_constant_definitions_race_with_plain_and_removal() {
    let table = SymbolTable::new();
    let key = || f(Term::Integer(1));
    let never = || Term::condition(Term::atom("i"), Term::boolean(false));

    for round in 0..200 {
        let sym = table.lookup_or_create(&format!("Global`f{}", round)).unwrap();
        let ctx = ThreadContext::root();
        sym.define(&ctx, RuleCategory::Down, key(), Term::string("plain"))
            .unwrap();

        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let sym = sym.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let ctx = ThreadContext::root();
                    barrier.wait();
                    let body = match t {
                        0 | 1 => never(),
                        2 => Term::string("newer"),
                        _ => Term::condition(Term::string("guarded"), Term::boolean(true)),
                    };
                    sym.define(&ctx, RuleCategory::Down, key(), body).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Both guarded rules and exactly one plain rule survive, and the
        // guard that holds wins over the plain rule.
        let rules = sym.rule_list(&ctx, RuleCategory::Down);
        assert_eq!(rules.len(), 3);
        assert_eq!(rules.iter().filter(|r| r.is_conditional()).count(), 2);
        assert_eq!(
            sym.find(&ctx, RuleCategory::Down, &key()).as_deref(),
            Some(&Term::string("guarded"))
        );

        sym.undefine(&ctx, RuleCategory::Down, key()).unwrap();
        assert!(sym.rule_list(&ctx, RuleCategory::Down).is_empty());
        sym.define(&ctx, RuleCategory::Down, key(), Term::string("again"))
            .unwrap();
        assert_eq!(
            sym.find(&ctx, RuleCategory::Down, &key()).as_deref(),
            Some(&Term::string("again"))
        );
    }
}
