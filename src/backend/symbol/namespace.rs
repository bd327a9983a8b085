/// Separates namespace segments in qualified names: `System`Plus`.
pub const NAMESPACE_SEPARATOR: char = '`';

/// Splits a qualified name into its namespace (separator included) and short
/// name. Names without separator have an empty namespace.
pub fn split_name(name: &str) -> (&str, &str) {
    match name.rfind(NAMESPACE_SEPARATOR) {
        Some(i) => name.split_at(i + NAMESPACE_SEPARATOR.len_utf8()),
        None => ("", name),
    }
}

/// Joins a namespace and a short name. The namespace must be empty or end
/// with the separator.
pub(crate) fn qualify(namespace: &str, short: &str) -> Option<String> {
    if !namespace.is_empty() && !namespace.ends_with(NAMESPACE_SEPARATOR) {
        return None;
    }
    Some(format!("{}{}", namespace, short))
}

/// Where short names are resolved: the current namespace, then the search
/// path in order. New short names are created in the current namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceContext {
    current: String,
    path: Vec<String>,
}

impl NamespaceContext {
    pub fn new(
        current: impl Into<String>,
        path: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        NamespaceContext {
            current: current.into(),
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn set_current(&mut self, namespace: impl Into<String>) {
        self.current = namespace.into();
    }

    pub fn push_path(&mut self, namespace: impl Into<String>) {
        self.path.push(namespace.into());
    }
}

impl Default for NamespaceContext {
    fn default() -> Self {
        NamespaceContext::new("Global`", ["System`"])
    }
}
