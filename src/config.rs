//! Configuration store: database aliases, driver declarations, settings.
//!
//! Layered with the `config` crate. A TOML file comes first, then `SQLCMD_`
//! environment variables on top (`__` separates nested keys, e.g.
//! `SQLCMD_SETTINGS__HISTORY_MAX=1000`).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use config::builder::DefaultState;
use serde::Deserialize;

use crate::core::{ShellError, ShellResult};
use crate::driver::{ConnectParams, DriverRegistry};

/// Alias given to a connection described on the command line.
pub const CMDLINE_ALIAS: &str = "__cmdline__";

pub const DEFAULT_HISTORY_MAX: usize = 512;

/// One `[[databases]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    /// The first alias is the primary one; it names the history file.
    pub aliases: Vec<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub database: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub driver: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl DatabaseConfig {
    #[must_use]
    pub fn primary_alias(&self) -> &str {
        self.aliases.first().map_or("", String::as_str)
    }

    #[must_use]
    pub fn params(&self) -> ConnectParams<'_> {
        ConnectParams {
            host: &self.host,
            port: self.port,
            user: &self.user,
            password: &self.password,
            database: &self.database,
        }
    }

    fn validate(&self) -> ShellResult<()> {
        if self.aliases.is_empty() {
            return Err(ShellError::configuration(format!(
                "Database \"{}\" has no aliases",
                self.database
            )));
        }
        if self.aliases.iter().any(|a| a.trim().is_empty()) {
            return Err(ShellError::configuration(format!(
                "Database \"{}\" has an empty alias",
                self.database
            )));
        }
        if self.database.trim().is_empty() {
            return Err(ShellError::configuration(format!(
                "Alias \"{}\" has no database name",
                self.primary_alias()
            )));
        }
        if self.driver.trim().is_empty() {
            return Err(ShellError::configuration(format!(
                "Alias \"{}\" has no driver",
                self.primary_alias()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    #[serde(default = "default_history_max")]
    pub history_max: usize,
    #[serde(default)]
    pub history_dir: Option<PathBuf>,
}

fn default_history_max() -> usize {
    DEFAULT_HISTORY_MAX
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            history_max: DEFAULT_HISTORY_MAX,
            history_dir: None,
        }
    }
}

impl Settings {
    /// Directory holding the per-alias history files.
    #[must_use]
    pub fn history_dir(&self) -> PathBuf {
        self.history_dir
            .clone()
            .or_else(|| dirs::config_dir().map(|d| d.join("sqlcmd")))
            .unwrap_or_else(|| PathBuf::from(".sqlcmd"))
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    drivers: BTreeMap<String, String>,
    #[serde(default)]
    databases: Vec<DatabaseConfig>,
}

#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub settings: Settings,
    /// Dynamic driver declarations: registry key → factory name.
    pub drivers: BTreeMap<String, String>,
    databases: Vec<DatabaseConfig>,
}

impl Configuration {
    /// Loads `path` (which must exist) or, without one, the optional
    /// `<config dir>/sqlcmd/config.toml`, then applies the environment.
    pub fn load(path: Option<&Path>) -> ShellResult<Self> {
        let file = match path {
            Some(p) => File::from(p.to_path_buf()).format(FileFormat::Toml).required(true),
            None => {
                let default = dirs::config_dir()
                    .map(|d| d.join("sqlcmd").join("config.toml"))
                    .unwrap_or_else(|| PathBuf::from("sqlcmd.toml"));
                File::from(default).format(FileFormat::Toml).required(false)
            }
        };
        tracing::debug!(?path, "loading configuration");
        Self::from_builder(Config::builder().add_source(file))
    }

    /// Parses configuration from TOML text, with the environment on top.
    pub fn from_toml_str(text: &str) -> ShellResult<Self> {
        Self::from_builder(Config::builder().add_source(File::from_str(text, FileFormat::Toml)))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> ShellResult<Self> {
        let raw: RawConfig = builder
            .add_source(
                Environment::with_prefix("SQLCMD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        let mut cfg = Self {
            settings: raw.settings,
            drivers: raw.drivers,
            databases: Vec::new(),
        };
        for db in raw.databases {
            cfg.add(db)?;
        }
        Ok(cfg)
    }

    /// Adds a database entry, rejecting aliases that are already taken.
    pub fn add(&mut self, db: DatabaseConfig) -> ShellResult<()> {
        db.validate()?;
        let taken: HashSet<&str> = self
            .databases
            .iter()
            .flat_map(|d| d.aliases.iter().map(String::as_str))
            .collect();
        let mut seen = HashSet::new();
        for alias in &db.aliases {
            if taken.contains(alias.as_str()) || !seen.insert(alias.as_str()) {
                return Err(ShellError::configuration(format!(
                    "Alias \"{alias}\" is used more than once"
                )));
            }
        }
        self.databases.push(db);
        Ok(())
    }

    #[must_use]
    pub fn databases(&self) -> &[DatabaseConfig] {
        &self.databases
    }

    /// Exact alias lookup.
    #[must_use]
    pub fn get(&self, alias: &str) -> Option<&DatabaseConfig> {
        self.databases
            .iter()
            .find(|d| d.aliases.iter().any(|a| a == alias))
    }

    /// Exact alias match, otherwise a unique prefix match.
    pub fn find_match(&self, alias: &str) -> ShellResult<&DatabaseConfig> {
        if let Some(db) = self.get(alias) {
            return Ok(db);
        }

        let matches: Vec<&DatabaseConfig> = self
            .databases
            .iter()
            .filter(|d| d.aliases.iter().any(|a| a.starts_with(alias)))
            .collect();

        match matches.as_slice() {
            [] => Err(ShellError::UnknownAlias(alias.to_string())),
            [only] => Ok(only),
            many => {
                let mut candidates: Vec<String> =
                    many.iter().map(|d| d.primary_alias().to_string()).collect();
                candidates.sort();
                Err(ShellError::AmbiguousAlias {
                    alias: alias.to_string(),
                    candidates,
                })
            }
        }
    }

    /// Registers every `[drivers]` declaration. Declared keys may not
    /// replace an existing driver.
    pub fn register_drivers(&self, registry: &mut DriverRegistry) -> ShellResult<()> {
        for (key, factory) in &self.drivers {
            registry.register_factory_name(key, factory, false)?;
        }
        Ok(())
    }
}

/// Parses `database,driver,host[:port],user,password`.
pub fn parse_inline_spec(spec: &str) -> ShellResult<DatabaseConfig> {
    let fields: Vec<&str> = spec.split(',').map(str::trim).collect();
    let [database, driver, host, user, password] = fields.as_slice() else {
        return Err(ShellError::configuration(format!(
            "Bad connection spec \"{spec}\": expected database,driver,host[:port],user,password"
        )));
    };

    let (host, port) = match host.split_once(':') {
        Some((h, p)) => {
            let port = p.parse::<u16>().map_err(|_| {
                ShellError::configuration(format!("Bad port \"{p}\" in connection spec"))
            })?;
            (h, Some(port))
        }
        None => (*host, None),
    };

    let db = DatabaseConfig {
        aliases: vec![CMDLINE_ALIAS.to_string()],
        host: if host.is_empty() { default_host() } else { host.to_string() },
        port,
        database: (*database).to_string(),
        user: (*user).to_string(),
        password: (*password).to_string(),
        driver: (*driver).to_string(),
    };
    db.validate()?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[settings]
history_max = 100

[drivers]
lite = "sqlcmd::driver::sqlite::SqliteDriver"

[[databases]]
aliases = ["db1", "db1a"]
database = "one"
driver = "sqlite"

[[databases]]
aliases = ["db2"]
host = "db.example.com"
port = 5433
database = "two"
user = "scott"
password = "tiger"
driver = "postgresql"
"#;

    #[test]
    fn test_parse_sample() {
        let cfg = Configuration::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.settings.history_max, 100);
        assert_eq!(cfg.databases().len(), 2);

        let one = cfg.get("db1a").unwrap();
        assert_eq!(one.primary_alias(), "db1");
        assert_eq!(one.host, "localhost");
        assert_eq!(one.user, "");
        assert_eq!(one.port, None);

        let two = cfg.get("db2").unwrap();
        assert_eq!(two.port, Some(5433));
        assert_eq!(two.params().user, "scott");
    }

    #[test]
    fn test_exact_match_beats_prefix() {
        let cfg = Configuration::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.find_match("db1").unwrap().database, "one");
    }

    #[test]
    fn test_unique_prefix_match() {
        let cfg = Configuration::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.find_match("db1a").unwrap().database, "one");
        assert_eq!(cfg.find_match("db2").unwrap().database, "two");
        // Both aliases of the first entry match, but it is one configuration.
        let mut cfg = cfg;
        cfg.add(DatabaseConfig {
            aliases: vec!["prod".into(), "production".into()],
            host: default_host(),
            port: None,
            database: "p".into(),
            user: String::new(),
            password: String::new(),
            driver: "dummy".into(),
        })
        .unwrap();
        assert_eq!(cfg.find_match("pro").unwrap().database, "p");
    }

    #[test]
    fn test_ambiguous_prefix_names_candidates() {
        let cfg = Configuration::from_toml_str(SAMPLE).unwrap();
        match cfg.find_match("db") {
            Err(ShellError::AmbiguousAlias { alias, candidates }) => {
                assert_eq!(alias, "db");
                assert_eq!(candidates, vec!["db1", "db2"]);
            }
            other => panic!("expected ambiguous alias, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_alias() {
        let cfg = Configuration::from_toml_str(SAMPLE).unwrap();
        assert!(matches!(cfg.find_match("zzz"), Err(ShellError::UnknownAlias(_))));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let text = r#"
[[databases]]
aliases = ["a"]
database = "x"
driver = "dummy"

[[databases]]
aliases = ["b", "a"]
database = "y"
driver = "dummy"
"#;
        let err = Configuration::from_toml_str(text).unwrap_err();
        assert!(err.to_string().contains("\"a\""));
    }

    #[test]
    fn test_missing_required_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(Configuration::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let cfg = Configuration::load(Some(&path)).unwrap();
        assert_eq!(cfg.drivers.get("lite").map(String::as_str), Some("sqlcmd::driver::sqlite::SqliteDriver"));
    }

    #[test]
    fn test_register_declared_drivers() {
        let cfg = Configuration::from_toml_str(SAMPLE).unwrap();
        let mut registry = DriverRegistry::with_builtins();
        cfg.register_drivers(&mut registry).unwrap();
        assert_eq!(registry.resolve("lite").unwrap().display_name, "SQLite");
    }

    #[test]
    fn test_inline_spec() {
        let db = parse_inline_spec("app,postgresql,db.local:6543,scott,tiger").unwrap();
        assert_eq!(db.primary_alias(), CMDLINE_ALIAS);
        assert_eq!(db.host, "db.local");
        assert_eq!(db.port, Some(6543));
        assert_eq!(db.driver, "postgresql");
        assert_eq!(db.password, "tiger");

        let db = parse_inline_spec("/tmp/x.db,sqlite,,,").unwrap();
        assert_eq!(db.host, "localhost");
        assert_eq!(db.port, None);
    }

    #[test]
    fn test_inline_spec_errors() {
        assert!(parse_inline_spec("app,postgresql,host").is_err());
        assert!(parse_inline_spec("app,postgresql,host:99999,u,p").is_err());
        assert!(parse_inline_spec(",postgresql,host,u,p").is_err());
    }
}
