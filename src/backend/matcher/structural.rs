use std::cmp::Ordering;
use std::collections::HashMap;

use super::PatternMatcher;
use crate::backend::models::{Bindings, Term};

/// Purely syntactic matcher.
///
/// `~x` matches anything and binds `x`; a repeated `~x` must match equal
/// subterms; `~` matches anything without binding. Everything else matches
/// only an equal term. Substitution replaces atoms named after a bound
/// variable, so `f(~x) -> g(x)` rewrites `f(1)` to `g(1)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralMatcher;

impl PatternMatcher for StructuralMatcher {
    fn is_valid(&self, pattern: &Term) -> bool {
        match pattern {
            Term::Undefined | Term::Condition(..) => false,
            Term::Expr(items) => !items.is_empty() && items.iter().all(|t| self.is_valid(t)),
            _ => true,
        }
    }

    fn is_constant(&self, pattern: &Term) -> bool {
        !pattern.contains_pattern()
    }

    fn compare(&self, a: &Term, b: &Term) -> Ordering {
        let mut left = Canonical::default();
        let mut right = Canonical::default();
        compare_terms(a, b, &mut left, &mut right)
    }

    fn matches(&self, term: &Term, pattern: &Term) -> Option<Bindings> {
        let mut bindings = Bindings::new();
        match_into(term, pattern, &mut bindings).then_some(bindings)
    }

    fn substitute(&self, body: &Term, bindings: &Bindings) -> Term {
        if bindings.is_empty() {
            return body.clone();
        }
        substitute(body, bindings)
    }
}

fn match_into(term: &Term, pattern: &Term, bindings: &mut Bindings) -> bool {
    match (term, pattern) {
        (_, Term::Pattern(name)) if name.is_empty() => true,
        (_, Term::Pattern(name)) => bindings.bind(name, term),
        (Term::Expr(items), Term::Expr(patterns)) => {
            items.len() == patterns.len()
                && items
                    .iter()
                    .zip(patterns)
                    .all(|(t, p)| match_into(t, p, bindings))
        }
        _ => term == pattern,
    }
}

fn substitute(body: &Term, bindings: &Bindings) -> Term {
    match body {
        Term::Atom(name) => bindings.get(name).cloned().unwrap_or_else(|| body.clone()),
        Term::Expr(items) => Term::Expr(items.iter().map(|t| substitute(t, bindings)).collect()),
        Term::Condition(value, test) => Term::Condition(
            Box::new(substitute(value, bindings)),
            Box::new(substitute(test, bindings)),
        ),
        _ => body.clone(),
    }
}

/// First-occurrence numbering of pattern variables, so `f(~x)` and `f(~y)`
/// compare equal while `f(~x, ~x)` stays more specific than `f(~x, ~y)`.
#[derive(Default)]
struct Canonical<'a> {
    seen: HashMap<&'a str, usize>,
    next: usize,
}

impl<'a> Canonical<'a> {
    fn index(&mut self, name: &'a str) -> usize {
        if name.is_empty() {
            self.next += 1;
            return self.next - 1;
        }
        let next = &mut self.next;
        *self.seen.entry(name).or_insert_with(|| {
            *next += 1;
            *next - 1
        })
    }
}

/// Coarse specificity class; lower ranks sort first.
fn rank(term: &Term) -> u8 {
    match term {
        Term::Undefined => 0,
        Term::Integer(_) => 1,
        Term::String(_) => 2,
        Term::Atom(_) => 3,
        Term::Expr(_) => 4,
        Term::Condition(..) => 5,
        Term::Pattern(_) => 6,
    }
}

fn compare_terms<'a>(
    a: &'a Term,
    b: &'a Term,
    left: &mut Canonical<'a>,
    right: &mut Canonical<'a>,
) -> Ordering {
    match (a, b) {
        (Term::Pattern(x), Term::Pattern(y)) => left.index(x).cmp(&right.index(y)),
        (Term::Integer(x), Term::Integer(y)) => x.cmp(y),
        (Term::String(x), Term::String(y)) | (Term::Atom(x), Term::Atom(y)) => x.cmp(y),
        (Term::Expr(xs), Term::Expr(ys)) => {
            let by_len = xs.len().cmp(&ys.len());
            if by_len != Ordering::Equal {
                return by_len;
            }
            for (x, y) in xs.iter().zip(ys) {
                let order = compare_terms(x, y, left, right);
                if order != Ordering::Equal {
                    return order;
                }
            }
            Ordering::Equal
        }
        (Term::Condition(xv, xt), Term::Condition(yv, yt)) => {
            compare_terms(xv, yv, left, right).then_with(|| compare_terms(xt, yt, left, right))
        }
        _ => rank(a).cmp(&rank(b)),
    }
}
