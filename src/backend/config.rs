//! Symbol table configuration.

use serde::Deserialize;

use crate::backend::error::{SymbolError, SymbolResult};

pub const DEFAULT_INITIAL_CAPACITY: usize = 1024;
pub const DEFAULT_FREE_LIST_CAPACITY: usize = 256;

/// Symbol table configuration, usually read from the `[symbols]` table of a
/// TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableConfig {
    /// Name map capacity reserved up front
    pub initial_capacity: usize,
    /// Upper bound on recycled symbol headers kept for reuse
    pub free_list_capacity: usize,
    /// Whether the evaluator hears about symbols created while running
    pub notify_new_symbols: bool,
    /// Marker between a temporary symbol's base name and its counter
    pub temporary_suffix: char,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            free_list_capacity: DEFAULT_FREE_LIST_CAPACITY,
            notify_new_symbols: true,
            temporary_suffix: '$',
        }
    }
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    symbols: TableConfig,
}

impl TableConfig {
    /// Parses the `[symbols]` table of a TOML document. Other tables are
    /// ignored so the section can share a file with other settings.
    pub fn from_toml_str(source: &str) -> SymbolResult<Self> {
        let file: ConfigFile = toml::from_str(source)?;
        file.validate()
    }

    pub fn with_free_list_capacity(mut self, capacity: usize) -> Self {
        self.free_list_capacity = capacity;
        self
    }

    pub fn without_notifications(mut self) -> Self {
        self.notify_new_symbols = false;
        self
    }
}

impl ConfigFile {
    fn validate(self) -> SymbolResult<TableConfig> {
        let config = self.symbols;
        if config.temporary_suffix.is_alphanumeric() || config.temporary_suffix == '`' {
            return Err(SymbolError::Config(format!(
                "temporary_suffix {:?} would be ambiguous in symbol names",
                config.temporary_suffix
            )));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_section_missing() {
        let config = TableConfig::from_toml_str("[other]\nkey = 1\n").unwrap();
        assert_eq!(config, TableConfig::default());
    }

    #[test]
    fn test_partial_section() {
        let toml = "[symbols]\nfree_list_capacity = 8\nnotify_new_symbols = false\n";
        let config = TableConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.free_list_capacity, 8);
        assert!(!config.notify_new_symbols);
        assert_eq!(config.initial_capacity, DEFAULT_INITIAL_CAPACITY);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            TableConfig::from_toml_str("[symbols]\ntemporary_suffix = \"a\"\n"),
            Err(SymbolError::Config(_))
        ));
        assert!(TableConfig::from_toml_str("[symbols]\nunknown = 1\n").is_err());
    }
}
