use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use symtable::*;

fn f(args: impl IntoIterator<Item = Term>) -> Term {
    Term::call("f", args)
}

/// Cache with `n` constant rules `f(i) -> i`.
fn constant_cache(n: i64) -> RuleCache {
    let cache = RuleCache::new();
    for i in 0..n {
        cache.change(f([Term::Integer(i)]), Term::Integer(i), &StructuralMatcher);
    }
    cache
}

/// Cache with `n` general rules `f(~x, i) -> x`; the worst case lookup has
/// to walk the whole chain.
fn chain_cache(n: i64) -> RuleCache {
    let cache = RuleCache::new();
    for i in 0..n {
        cache.change(
            f([Term::pattern("x"), Term::Integer(i)]),
            Term::atom("x"),
            &StructuralMatcher,
        );
    }
    cache
}

/// Constant-map hits vs chain walks for growing rule counts
fn bench_rule_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_lookup");

    for rule_count in [10i64, 100, 1000].iter() {
        let constants = constant_cache(*rule_count);
        let query = f([Term::Integer(rule_count - 1)]);
        group.bench_with_input(BenchmarkId::new("constant_map", rule_count), rule_count, |b, _| {
            b.iter(|| constants.find(black_box(&query), &StructuralMatcher, &BasicEvaluator))
        });

        let chain = chain_cache(*rule_count);
        let query = f([Term::Integer(0), Term::Integer(rule_count - 1)]);
        group.bench_with_input(BenchmarkId::new("chain_walk", rule_count), rule_count, |b, _| {
            b.iter(|| chain.find(black_box(&query), &StructuralMatcher, &BasicEvaluator))
        });
    }

    group.finish();
}

/// Symbol creation and lookup through the table lock
fn bench_symbol_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("symbol_lookup");
    let table = SymbolTable::new();
    let names: Vec<String> = (0..1000).map(|i| format!("Global`s{}", i)).collect();
    let held: Vec<Symbol> = names.iter().filter_map(|n| table.lookup_or_create(n)).collect();

    group.bench_function("lookup_existing", |b| {
        b.iter(|| {
            for name in &names {
                black_box(table.lookup(name));
            }
        })
    });

    group.bench_function("temporary_churn", |b| {
        b.iter(|| {
            let tmp = table.create_temporary("Global`tmp", true);
            black_box(tmp)
        })
    });

    drop(held);
    group.finish();
}

criterion_group!(benches, bench_rule_lookup, bench_symbol_lookup);
criterion_main!(benches);
