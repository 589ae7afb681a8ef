//! Server configuration, resolved once at startup
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! environment variables (highest precedence).

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DeployError, Result};

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_CONFIG_PATH: &str = "webhook_config.toml";
pub const DEFAULT_LOG_FILE: &str = "/var/log/webhook.log";
pub const DEFAULT_TARGET_BRANCH: &str = "main";
pub const DEPLOY_SCRIPT_RELATIVE_PATH: &str = "scripts/deploy.sh";

/// Shape of the optional TOML config file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub secret: Option<String>,
    pub project_dir: Option<PathBuf>,
    pub target_branch: Option<String>,
    pub log_file: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub deploy_timeout_secs: Option<u64>,
    pub serialize_deploys: Option<bool>,
}

impl FileConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            DeployError::ConfigError(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&contents).map_err(|e| {
            DeployError::ConfigError(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

/// Immutable server configuration shared by every request
#[derive(Clone)]
pub struct Config {
    pub secret: String,
    pub project_dir: PathBuf,
    pub deploy_script: PathBuf,
    pub target_branch: String,
    pub log_file: PathBuf,
    pub bind_address: String,
    /// `None` waits for the deploy script however long it takes
    pub deploy_timeout: Option<Duration>,
    /// Run at most one deploy at a time when set
    pub serialize_deploys: bool,
}

// Keeps the secret out of logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("secret", &"<redacted>")
            .field("project_dir", &self.project_dir)
            .field("deploy_script", &self.deploy_script)
            .field("target_branch", &self.target_branch)
            .field("log_file", &self.log_file)
            .field("bind_address", &self.bind_address)
            .field("deploy_timeout", &self.deploy_timeout)
            .field("serialize_deploys", &self.serialize_deploys)
            .finish()
    }
}

impl Config {
    /// Config with defaults for everything but the two required values.
    pub fn new(secret: impl Into<String>, project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        Self {
            secret: secret.into(),
            deploy_script: project_dir.join(DEPLOY_SCRIPT_RELATIVE_PATH),
            project_dir,
            target_branch: DEFAULT_TARGET_BRANCH.to_string(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            deploy_timeout: None,
            serialize_deploys: false,
        }
    }

    pub fn with_target_branch(mut self, branch: impl Into<String>) -> Self {
        self.target_branch = branch.into();
        self
    }

    pub fn with_log_file(mut self, log_file: impl Into<PathBuf>) -> Self {
        self.log_file = log_file.into();
        self
    }

    pub fn with_bind_address(mut self, bind_address: impl Into<String>) -> Self {
        self.bind_address = bind_address.into();
        self
    }

    pub fn with_deploy_timeout(mut self, timeout: Duration) -> Self {
        self.deploy_timeout = Some(timeout);
        self
    }

    pub fn with_serialized_deploys(mut self, serialize: bool) -> Self {
        self.serialize_deploys = serialize;
        self
    }

    pub fn secret_bytes(&self) -> &[u8] {
        self.secret.as_bytes()
    }

    /// Loads configuration from the process environment.
    ///
    /// `WEBHOOK_CONFIG` names a TOML file that must exist; without it the
    /// default `webhook_config.toml` is read only if present.
    pub fn load() -> Result<Self> {
        let file = match std::env::var("WEBHOOK_CONFIG") {
            Ok(path) => FileConfig::from_path(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).is_file() => {
                FileConfig::from_path(Path::new(DEFAULT_CONFIG_PATH))?
            }
            Err(_) => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merges file values with environment overrides looked up via `env`.
    pub fn resolve<F>(file: FileConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let secret = env("WEBHOOK_SECRET")
            .or(file.secret)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                DeployError::ConfigError("WEBHOOK_SECRET must be set and non-empty".to_string())
            })?;
        let project_dir = env("PROJECT_DIR")
            .map(PathBuf::from)
            .or(file.project_dir)
            .ok_or_else(|| DeployError::ConfigError("PROJECT_DIR must be set".to_string()))?;

        let mut config = Config::new(secret, project_dir);

        if let Some(branch) = env("TARGET_BRANCH").or(file.target_branch) {
            config = config.with_target_branch(branch);
        }
        if let Some(log_file) = env("LOG_FILE").map(PathBuf::from).or(file.log_file) {
            config = config.with_log_file(log_file);
        }
        if let Some(addr) = env("BIND_ADDRESS").or(file.bind_address) {
            config = config.with_bind_address(addr);
        }

        let timeout_secs = match env("DEPLOY_TIMEOUT_SECS") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|e| {
                DeployError::ConfigError(format!("Invalid DEPLOY_TIMEOUT_SECS '{}': {}", raw, e))
            })?),
            None => file.deploy_timeout_secs,
        };
        match timeout_secs {
            Some(0) => {
                return Err(DeployError::ConfigError(
                    "deploy timeout must be at least one second".to_string(),
                ));
            }
            Some(secs) => config = config.with_deploy_timeout(Duration::from_secs(secs)),
            None => {}
        }

        let serialize = match env("SERIALIZE_DEPLOYS") {
            Some(raw) => Some(parse_bool(&raw).ok_or_else(|| {
                DeployError::ConfigError(format!("Invalid SERIALIZE_DEPLOYS '{}'", raw))
            })?),
            None => file.serialize_deploys,
        };
        if let Some(serialize) = serialize {
            config = config.with_serialized_deploys(serialize);
        }

        Ok(config)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
