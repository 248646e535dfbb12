// Process configuration loaded from a YAML file
// Decision: The file path comes from FLEET_RECONCILER_CONFIG; a .env file may set it
// Decision: Missing required fields are reported one at a time, db section first

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fleet_forman::FormanConfig;
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

/// Environment variable holding the configuration file path
pub const CONFIG_ENV: &str = "FLEET_RECONCILER_CONFIG";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for this schema
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A required field is absent or empty
    #[error("config.{0} is not set")]
    MissingField(&'static str),

    /// The configuration path variable is not set
    #[error("{0:?} environment variable not set")]
    MissingEnv(&'static str),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db: DbConfig,
    pub reconcile: ReconcileConfig,
}

/// Database connection and table mapping
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    /// Logical table name to physical table name
    pub tables: HashMap<String, String>,
}

/// Scheduler and reconcile behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub concurrency: usize,
    /// Notify every existing provider at startup
    pub backfill: bool,
    /// Backoff after a failed lookup or reconcile
    pub retry_after_secs: u64,
    pub queue_capacity: usize,
    pub shutdown_timeout_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            backfill: true,
            retry_after_secs: 60,
            queue_capacity: 1,
            shutdown_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load the file named by [`CONFIG_ENV`]
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::MissingEnv(CONFIG_ENV))?;
        Self::load(path)
    }

    /// Read, parse and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate YAML content
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.db.validate()?;
        self.reconcile.validate()
    }
}

impl DbConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingField("db.host"));
        }
        if self.port == 0 {
            return Err(ConfigError::MissingField("db.port"));
        }
        if self.user.is_empty() {
            return Err(ConfigError::MissingField("db.user"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::MissingField("db.password"));
        }
        if self.name.is_empty() {
            return Err(ConfigError::MissingField("db.name"));
        }
        if self.tables.is_empty() {
            return Err(ConfigError::MissingField("db.tables"));
        }
        Ok(())
    }

    /// Connection options for the configured server, without TLS
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
            .ssl_mode(PgSslMode::Disable)
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("name", &self.name)
            .field("tables", &self.tables)
            .finish()
    }
}

impl ReconcileConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::MissingField("reconcile.concurrency"));
        }
        Ok(())
    }

    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(self.retry_after_secs)
    }

    pub fn forman_config(&self) -> FormanConfig {
        FormanConfig::new(self.concurrency)
            .with_queue_capacity(self.queue_capacity)
            .with_shutdown_timeout(Duration::from_secs(self.shutdown_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r#"
db:
  host: db.internal
  port: 5432
  user: fleet
  password: hunter2
  name: fleet
  tables:
    providers: provider_clusters
reconcile:
  concurrency: 8
  backfill: false
  retry_after_secs: 5
  queue_capacity: 16
  shutdown_timeout_secs: 10
"#;

    const MINIMAL: &str = r#"
db:
  host: localhost
  port: 5432
  user: fleet
  password: secret
  name: fleet
  tables:
    providers: providers
reconcile:
  concurrency: 2
"#;

    #[test]
    fn test_full_config() {
        let config = Config::from_yaml(FULL).unwrap();

        assert_eq!(config.db.host, "db.internal");
        assert_eq!(config.db.port, 5432);
        assert_eq!(config.db.tables["providers"], "provider_clusters");
        assert_eq!(config.reconcile.concurrency, 8);
        assert!(!config.reconcile.backfill);
        assert_eq!(config.reconcile.retry_after(), Duration::from_secs(5));

        let forman = config.reconcile.forman_config();
        assert_eq!(forman.concurrency, 8);
        assert_eq!(forman.queue_capacity, 16);
        assert_eq!(forman.shutdown_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_optional_fields_default() {
        let config = Config::from_yaml(MINIMAL).unwrap();

        assert!(config.reconcile.backfill);
        assert_eq!(config.reconcile.retry_after(), Duration::from_secs(60));
        assert_eq!(config.reconcile.queue_capacity, 1);
        assert_eq!(config.reconcile.shutdown_timeout_secs, 30);
    }

    #[test]
    fn test_each_required_field_is_reported() {
        let cases = [
            ("  host: localhost\n", "db.host"),
            ("  port: 5432\n", "db.port"),
            ("  user: fleet\n", "db.user"),
            ("  password: secret\n", "db.password"),
            ("  name: fleet\n", "db.name"),
            ("  tables:\n    providers: providers\n", "db.tables"),
            ("reconcile:\n  concurrency: 2\n", "reconcile.concurrency"),
        ];

        for (line, field) in cases {
            let yaml = MINIMAL.replacen(line, "", 1);
            assert_ne!(yaml, MINIMAL, "fixture should contain {:?}", line);

            match Config::from_yaml(&yaml) {
                Err(ConfigError::MissingField(missing)) => assert_eq!(missing, field),
                other => panic!("expected MissingField({}), got {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_zero_concurrency_is_missing() {
        let yaml = MINIMAL.replace("concurrency: 2", "concurrency: 0");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert_eq!(err.to_string(), "config.reconcile.concurrency is not set");
    }

    #[test]
    fn test_invalid_yaml() {
        let err = Config::from_yaml("db: [not, a, map]").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_password_is_redacted() {
        let config = Config::from_yaml(FULL).unwrap();
        let debug = format!("{:?}", config);

        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("db.internal"));
    }

    #[test]
    fn test_connect_options() {
        let config = Config::from_yaml(FULL).unwrap();
        let options = config.db.connect_options();

        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 5432);
        assert_eq!(options.get_username(), "fleet");
        assert_eq!(options.get_database(), Some("fleet"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.reconcile.concurrency, 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("absent.yaml"));
    }
}
