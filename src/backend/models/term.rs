use std::fmt;

/// Head name of the condition wrapper used by guarded definitions.
pub const CONDITION_HEAD: &str = "Condition";

/// A symbolic expression as stored in rule caches and value slots.
///
/// Rule patterns and bodies are values of this type. Symbols are referenced
/// by their qualified name, so a [`Term`] never keeps a symbol alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    /// The undefined marker. As a rule body it means "remove".
    Undefined,
    /// A symbol reference, e.g. `Global`f`.
    Atom(String),
    Integer(i64),
    String(String),
    /// A named pattern variable `~x`; an empty name is the anonymous `~`.
    Pattern(String),
    /// `head(args...)`, head at index 0.
    Expr(Vec<Term>),
    /// `value /; condition`: a body guarded by a runtime test.
    Condition(Box<Term>, Box<Term>),
}

impl Term {
    pub fn atom(name: impl Into<String>) -> Self {
        Term::Atom(name.into())
    }

    pub fn string(text: impl Into<String>) -> Self {
        Term::String(text.into())
    }

    pub fn pattern(name: impl Into<String>) -> Self {
        Term::Pattern(name.into())
    }

    /// `head(args...)` with an atom head.
    pub fn call(head: impl Into<String>, args: impl IntoIterator<Item = Term>) -> Self {
        let mut items = vec![Term::Atom(head.into())];
        items.extend(args);
        Term::Expr(items)
    }

    pub fn condition(value: Term, test: Term) -> Self {
        Term::Condition(Box::new(value), Box::new(test))
    }

    pub fn boolean(value: bool) -> Self {
        Term::Atom(if value { "True" } else { "False" }.to_string())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Term::Undefined)
    }

    /// Whether a rule body carries a runtime condition at its top.
    pub fn has_condition(&self) -> bool {
        matches!(self, Term::Condition(..))
    }

    pub fn split_condition(&self) -> Option<(&Term, &Term)> {
        match self {
            Term::Condition(value, test) => Some((value, test)),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Term::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Term::Atom(name) => Some(name),
            _ => None,
        }
    }

    /// The head atom of an expression, or the atom itself.
    pub fn head_name(&self) -> Option<&str> {
        match self {
            Term::Atom(name) => Some(name),
            Term::Expr(items) => items.first().and_then(Term::as_atom),
            _ => None,
        }
    }

    pub fn contains_pattern(&self) -> bool {
        match self {
            Term::Pattern(_) => true,
            Term::Expr(items) => items.iter().any(Term::contains_pattern),
            Term::Condition(value, test) => value.contains_pattern() || test.contains_pattern(),
            _ => false,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Undefined => write!(f, "Undefined"),
            Term::Atom(name) => write!(f, "{}", name),
            Term::Integer(n) => write!(f, "{}", n),
            Term::String(text) => write!(f, "{:?}", text),
            Term::Pattern(name) => write!(f, "~{}", name),
            Term::Expr(items) => match items.split_first() {
                None => write!(f, "()"),
                Some((head, args)) => {
                    write!(f, "{}(", head)?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ")")
                }
            },
            Term::Condition(value, test) => write!(f, "{} /; {}", value, test),
        }
    }
}

impl From<i64> for Term {
    fn from(n: i64) -> Self {
        Term::Integer(n)
    }
}

impl From<&str> for Term {
    fn from(text: &str) -> Self {
        Term::String(text.to_string())
    }
}
