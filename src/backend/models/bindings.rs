//! Pattern-variable bindings produced by a successful match.
//!
//! Most rule patterns bind zero or one variable, so the representation
//! adapts to the count:
//! - Empty: no allocation
//! - Single: one inline pair
//! - Small: SmallVec for the rest, spilling to the heap past 4 entries

use super::Term;
use smallvec::SmallVec;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Bindings {
    #[default]
    Empty,
    Single((String, Term)),
    Small(Box<SmallVec<[(String, Term); 4]>>),
}

impl Bindings {
    #[inline]
    pub fn new() -> Self {
        Bindings::Empty
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Term> {
        match self {
            Bindings::Empty => None,
            Bindings::Single((n, v)) => (n == name).then_some(v),
            Bindings::Small(vec) => vec.iter().find(|(n, _)| n == name).map(|(_, v)| v),
        }
    }

    /// Binds `name` to `value`, or checks it against an existing binding.
    ///
    /// Returns false when the variable is already bound to something else,
    /// which is how `f(~x, ~x)` rejects `f(1, 2)`.
    pub fn bind(&mut self, name: &str, value: &Term) -> bool {
        if let Some(existing) = self.get(name) {
            return existing == value;
        }
        self.insert(name.to_string(), value.clone());
        true
    }

    /// Transitions Empty → Single → Small.
    #[inline]
    pub fn insert(&mut self, name: String, value: Term) {
        match self {
            Bindings::Empty => *self = Bindings::Single((name, value)),
            Bindings::Single(_) => {
                let Bindings::Single(first) = std::mem::take(self) else {
                    unreachable!()
                };
                let mut vec = SmallVec::new();
                vec.push(first);
                vec.push((name, value));
                *self = Bindings::Small(Box::new(vec));
            }
            Bindings::Small(vec) => vec.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        let slice: &[(String, Term)] = match self {
            Bindings::Empty => &[],
            Bindings::Single(pair) => std::slice::from_ref(pair),
            Bindings::Small(vec) => vec.as_slice(),
        };
        slice.iter().map(|(n, v)| (n.as_str(), v))
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Bindings::Empty => 0,
            Bindings::Single(_) => 1,
            Bindings::Small(vec) => vec.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Bindings::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_binding() {
        let mut bindings = Bindings::new();
        assert!(bindings.bind("x", &Term::Integer(42)));

        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings.get("x"), Some(&Term::Integer(42)));
        assert_eq!(bindings.get("y"), None);
        assert!(matches!(bindings, Bindings::Single(_)));
    }

    #[test]
    fn test_transition_to_small() {
        let mut bindings = Bindings::new();
        for i in 0..6 {
            bindings.insert(format!("v{}", i), Term::Integer(i));
        }
        assert!(matches!(bindings, Bindings::Small(_)));
        assert_eq!(bindings.get("v5"), Some(&Term::Integer(5)));
        let names: Vec<_> = bindings.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["v0", "v1", "v2", "v3", "v4", "v5"]);
    }

    #[test]
    fn test_conflicting_rebind_rejected() {
        let mut bindings = Bindings::new();
        assert!(bindings.bind("x", &Term::Integer(1)));
        assert!(bindings.bind("x", &Term::Integer(1)));
        assert!(!bindings.bind("x", &Term::Integer(2)));
        assert_eq!(bindings.len(), 1);
    }
}
