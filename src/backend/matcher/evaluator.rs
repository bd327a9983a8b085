use super::Evaluator;
use crate::backend::models::Term;

/// Evaluates conditions built from `True`/`False`, integer comparisons and
/// the boolean connectives. Anything else is treated as false.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicEvaluator;

impl Evaluator for BasicEvaluator {
    fn condition_holds(&self, condition: &Term) -> bool {
        truth(condition).unwrap_or(false)
    }
}

fn truth(term: &Term) -> Option<bool> {
    match term {
        Term::Atom(name) if name == "True" => Some(true),
        Term::Atom(name) if name == "False" => Some(false),
        Term::Expr(items) => {
            let (head, args) = items.split_first()?;
            match (head.as_atom()?, args) {
                ("Not", [x]) => truth(x).map(|b| !b),
                ("And", args) => args.iter().map(truth).try_fold(true, |acc, b| Some(acc && b?)),
                ("Or", args) => args.iter().map(truth).try_fold(false, |acc, b| Some(acc || b?)),
                (op, [x, y]) => compare(op, x.as_integer()?, y.as_integer()?),
                _ => None,
            }
        }
        _ => None,
    }
}

fn compare(op: &str, x: i64, y: i64) -> Option<bool> {
    Some(match op {
        "Greater" | ">" => x > y,
        "GreaterEqual" | ">=" => x >= y,
        "Less" | "<" => x < y,
        "LessEqual" | "<=" => x <= y,
        "Equal" | "==" => x == y,
        "Unequal" | "!=" => x != y,
        _ => return None,
    })
}
