use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlagent_agent::{DEFAULT_MAX_ITERATIONS, DEFAULT_MODEL, DEFAULT_TOP_K};
use sqlagent_db::{AccessMode, DatabaseOptions};
use thiserror::Error;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "sqlagent.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("toml decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("toml encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[error("no database configured; pass --database, set SQLAGENT_DATABASE_URL or [database] url")]
    MissingDatabase,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub database: DatabaseSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    pub url: Option<String>,
    pub read_only: bool,
    pub sample_rows: u32,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        let defaults = DatabaseOptions::default();
        Self {
            url: None,
            read_only: false,
            sample_rows: defaults.sample_rows,
            max_connections: defaults.max_connections,
            acquire_timeout_secs: defaults.acquire_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSection {
    pub model: String,
    /// Falls back to `OPENAI_BASE_URL`, then the public OpenAI endpoint.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            timeout_secs: 120,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSection {
    pub max_iterations: u32,
    pub top_k: u32,
    /// Persist threads as JSON files here; in-memory when unset.
    pub conversations_dir: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            top_k: DEFAULT_TOP_K,
            conversations_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Stderr filter used when `RUST_LOG` is unset.
    pub level: String,
    pub run_dir: PathBuf,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            run_dir: PathBuf::from("runs"),
        }
    }
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database: Option<String>,
    pub model: Option<String>,
    pub max_iterations: Option<u32>,
    pub read_only: bool,
    pub run_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load `path` if given (it must exist), otherwise `sqlagent.toml` in the
    /// working directory when present, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.database {
            self.database.url = Some(url);
        }
        if let Some(model) = overrides.model {
            self.llm.model = model;
        }
        if let Some(max_iterations) = overrides.max_iterations {
            self.agent.max_iterations = max_iterations;
        }
        if overrides.read_only {
            self.database.read_only = true;
        }
        if let Some(run_dir) = overrides.run_dir {
            self.logging.run_dir = run_dir;
        }
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database
            .url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingDatabase)
    }

    pub fn database_options(&self) -> DatabaseOptions {
        DatabaseOptions {
            max_connections: self.database.max_connections.max(1),
            acquire_timeout: Duration::from_secs(self.database.acquire_timeout_secs),
            sample_rows: self.database.sample_rows,
            access: if self.database.read_only {
                AccessMode::ReadOnly
            } else {
                AccessMode::ReadWrite
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.llm.model, "gpt-4.1-mini");
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.database.sample_rows, 3);
        assert_eq!(config.logging.run_dir, PathBuf::from("runs"));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [database]
            url = "sqlite:///chinook.db"
            read_only = true

            [llm]
            temperature = 0.0

            [agent]
            conversations_dir = ".sqlagent/threads"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_url().unwrap(), "sqlite:///chinook.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.llm.temperature, Some(0.0));
        assert_eq!(config.llm.timeout_secs, 120);
        assert_eq!(
            config.agent.conversations_dir,
            Some(PathBuf::from(".sqlagent/threads"))
        );
        assert_eq!(config.database_options().access, AccessMode::ReadOnly);
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = AppConfig::from_toml("[database]\nurll = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::TomlDecode(_)));
    }

    #[test]
    fn command_line_overrides_file_values() {
        let mut config =
            AppConfig::from_toml("[database]\nurl = \"sqlite://a.db\"\n[agent]\nmax_iterations = 4")
                .unwrap();
        config.apply(ConfigOverrides {
            database: Some("postgres://localhost/app".to_string()),
            model: Some("gpt-4o".to_string()),
            max_iterations: None,
            read_only: true,
            run_dir: Some(PathBuf::from("out")),
        });

        assert_eq!(config.database_url().unwrap(), "postgres://localhost/app");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.agent.max_iterations, 4);
        assert!(config.database.read_only);
        assert_eq!(config.logging.run_dir, PathBuf::from("out"));
    }

    #[test]
    fn missing_database_is_an_error() {
        let config = AppConfig::default();
        assert!(matches!(
            config.database_url(),
            Err(ConfigError::MissingDatabase)
        ));
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            AppConfig::load(Some(&missing)),
            Err(ConfigError::NotFound(_))
        ));

        let path = dir.path().join("sqlagent.toml");
        let written = AppConfig::default().to_toml().unwrap();
        std::fs::write(&path, written).unwrap();
        assert_eq!(AppConfig::load(Some(&path)).unwrap(), AppConfig::default());
    }
}
