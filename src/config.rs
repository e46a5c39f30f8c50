//! Configuration read once at lambda startup.
//!
//! Values are taken from the environment by [`Config::from_env`]. Tests and
//! local runs can use [`Config::from_lookup`] with any lookup function.

use std::time::Duration;

const DEFAULT_KEY: &str = "myCRCSite";
const DEFAULT_KEY_ATTRIBUTE: &str = "Site";
const DEFAULT_VALUE_ATTRIBUTE: &str = "VisitCount";
const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Table in which counter records are stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Name of the table
    pub name: String,
    /// Attribute holding the record key
    pub key_attribute: String,
    /// Attribute holding the counter value
    pub value_attribute: String,
}

impl TableConfig {
    /// Table with the default `Site`/`VisitCount` attribute names
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_attribute: DEFAULT_KEY_ATTRIBUTE.into(),
            value_attribute: DEFAULT_VALUE_ATTRIBUTE.into(),
        }
    }
}

/// Lambda configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Counter table
    pub table: TableConfig,
    /// Key of the tracked record
    pub key: String,
    /// Upper bound for a single store request
    pub request_timeout: Duration,
}

impl Config {
    /// Config with defaults for everything but the table name
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table: TableConfig::new(table_name),
            key: DEFAULT_KEY.into(),
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Reads the config from environment variables:
    ///
    /// * `DDB_TABLE_NAME` (required)
    /// * `COUNTER_KEY` (default `myCRCSite`)
    /// * `COUNTER_KEY_ATTRIBUTE` (default `Site`)
    /// * `COUNTER_VALUE_ATTRIBUTE` (default `VisitCount`)
    /// * `STORE_TIMEOUT_MS` (default `3000`)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`], but reads values through `lookup`
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        use anyhow::Context;

        let name = lookup("DDB_TABLE_NAME")
            .filter(|v| !v.is_empty())
            .context("Missing DDB_TABLE_NAME env variable")?;
        let mut config = Self::new(name);
        if let Some(key) = lookup("COUNTER_KEY") {
            config.key = key;
        }
        if let Some(attribute) = lookup("COUNTER_KEY_ATTRIBUTE") {
            config.table.key_attribute = attribute;
        }
        if let Some(attribute) = lookup("COUNTER_VALUE_ATTRIBUTE") {
            config.table.value_attribute = attribute;
        }
        if let Some(timeout) = lookup("STORE_TIMEOUT_MS") {
            let ms: u64 = timeout
                .parse()
                .with_context(|| format!("Invalid STORE_TIMEOUT_MS value: {}", timeout))?;
            config.request_timeout = Duration::from_millis(ms);
        }
        anyhow::ensure!(!config.key.is_empty(), "COUNTER_KEY must not be empty");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_table_is_set() {
        let config = Config::from_lookup(lookup(&[("DDB_TABLE_NAME", "visits")])).unwrap();
        assert_eq!(config.table.name, "visits");
        assert_eq!(config.table.key_attribute, "Site");
        assert_eq!(config.table.value_attribute, "VisitCount");
        assert_eq!(config.key, "myCRCSite");
        assert_eq!(config.request_timeout, Duration::from_millis(3000));
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("DDB_TABLE_NAME", "visits"),
            ("COUNTER_KEY", "blog"),
            ("COUNTER_KEY_ATTRIBUTE", "Page"),
            ("COUNTER_VALUE_ATTRIBUTE", "Hits"),
            ("STORE_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.key, "blog");
        assert_eq!(config.table.key_attribute, "Page");
        assert_eq!(config.table.value_attribute, "Hits");
        assert_eq!(config.request_timeout, Duration::from_millis(250));
    }

    #[test]
    fn missing_table_name_is_an_error() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("DDB_TABLE_NAME", "")])).is_err());
    }

    #[test]
    fn invalid_timeout_is_an_error() {
        let res = Config::from_lookup(lookup(&[
            ("DDB_TABLE_NAME", "visits"),
            ("STORE_TIMEOUT_MS", "soon"),
        ]));
        assert!(res.is_err());
    }
}
