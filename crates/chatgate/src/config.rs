//! Layered configuration: built-in defaults, then a TOML file, then
//! `CHATGATE__*` environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::auth::AuthConfig;
use crate::completion::CompletionConfig;
use crate::store::{NewProvider, ProviderKind};
use crate::ws::RealtimeConfig;

pub const APP_NAME: &str = "chatgate";

/// Prefix marking an API key that should be read from the environment.
const ENV_KEY_PREFIX: &str = "env:";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub completion: CompletionConfig,
    pub realtime: RealtimeConfig,
    pub auth: AuthConfig,
    /// Providers created at startup when no provider of that name exists.
    pub providers: Vec<ProviderSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Browser origins allowed to call the API. Empty denies every
    /// cross-origin request.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Lost on restart.
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite database file. Defaults to `chatgate.db` in the data directory.
    pub path: Option<String>,
}

impl StorageConfig {
    pub fn database_path(&self, data_dir: &Path) -> Result<PathBuf> {
        match self.path {
            Some(ref path) => expand_str_path(path),
            None => Ok(data_dir.join(format!("{APP_NAME}.db"))),
        }
    }
}

/// A provider declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSeed {
    pub name: String,
    pub kind: ProviderKind,
    /// Literal key, or `env:NAME` to read it from the environment.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl ProviderSeed {
    pub fn resolve_api_key(&self) -> Result<String> {
        match self.api_key.strip_prefix(ENV_KEY_PREFIX) {
            Some(var) => env::var(var).with_context(|| {
                format!("reading API key for provider {} from ${}", self.name, var)
            }),
            None => Ok(self.api_key.clone()),
        }
    }

    pub fn to_new_provider(&self) -> Result<NewProvider> {
        Ok(NewProvider {
            name: self.name.clone(),
            kind: self.kind,
            api_key: self.resolve_api_key()?,
            active: self.active,
        })
    }
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Merge defaults, the TOML file at `path` (if present) and the
    /// environment.
    pub fn load(path: &Path) -> Result<Self> {
        let built = Config::builder()
            .add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(&env_prefix()).separator("__"))
            .build()
            .with_context(|| format!("loading config from {}", path.display()))?;

        let mut config: AppConfig = built
            .try_deserialize()
            .context("parsing configuration")?;

        if let Some(ref file) = config.logging.file {
            let expanded = expand_str_path(file)?;
            config.logging.file = Some(expanded.display().to_string());
        }

        Ok(config)
    }
}

/// Write the default configuration, with a header comment, to `path`.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = default_config_header(path);
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

fn default_config_header(path: &Path) -> String {
    let mut buffer = String::new();
    buffer.push_str("# Configuration for ");
    buffer.push_str(APP_NAME);
    buffer.push('\n');
    buffer.push_str("# File: ");
    buffer.push_str(&path.display().to_string());
    buffer.push('\n');
    buffer.push_str("# Environment overrides use CHATGATE__SECTION__KEY.\n");
    buffer.push('\n');
    buffer
}

pub fn expand_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        expand_str_path(text)
    } else {
        Ok(path)
    }
}

pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

pub fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

pub fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::data_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".local").join("share").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine data directory"))
}

fn env_prefix() -> String {
    APP_NAME.to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.realtime.path, "/ws");
        assert_eq!(config.realtime.outbox_capacity, 64);
        assert_eq!(config.completion.timeout_secs, 60);
        assert_eq!(config.completion.anthropic_default_max_tokens, 1000);
        assert!(config.auth.default_user_id.is_none());
        assert!(config.server.cors_origins.is_empty());
        assert_eq!(config.completion.temperature, 0.7);
        assert!(config.completion.max_tokens.is_none());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[server]
port = 9191
cors_origins = ["http://localhost:5173"]

[storage]
backend = "memory"

[realtime]
path = "/realtime"
ping_interval_secs = 5

[completion]
temperature = 0.3
max_tokens = 512

[auth]
default_user_id = 1

[[providers]]
name = "openai-main"
kind = "openai"
api_key = "sk-test"
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.realtime.path, "/realtime");
        assert_eq!(config.realtime.outbox_capacity, 64);
        assert_eq!(config.auth.default_user_id, Some(1));
        assert_eq!(config.completion.options().temperature, 0.3);
        assert_eq!(config.completion.options().max_tokens, Some(512));
        assert_eq!(config.completion.timeout_secs, 60);
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].kind, ProviderKind::OpenAi);
        assert!(config.providers[0].active);
    }

    #[test]
    fn test_default_config_round_trips_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        write_default_config(&path).unwrap();

        let body = fs::read_to_string(&path).unwrap();
        assert!(body.starts_with("# Configuration for chatgate"));
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_literal_api_key() {
        let seed = ProviderSeed {
            name: "claude".into(),
            kind: ProviderKind::Anthropic,
            api_key: "sk-ant".into(),
            active: true,
        };
        assert_eq!(seed.resolve_api_key().unwrap(), "sk-ant");
    }

    #[test]
    fn test_env_api_key_missing_variable() {
        let seed = ProviderSeed {
            name: "claude".into(),
            kind: ProviderKind::Anthropic,
            api_key: "env:CHATGATE_TEST_SURELY_UNSET_KEY".into(),
            active: true,
        };
        let err = seed.resolve_api_key().unwrap_err();
        assert!(err.to_string().contains("CHATGATE_TEST_SURELY_UNSET_KEY"));
    }

    #[test]
    fn test_database_path_default() {
        let storage = StorageConfig::default();
        let path = storage.database_path(Path::new("/data")).unwrap();
        assert_eq!(path, PathBuf::from("/data/chatgate.db"));
    }
}
