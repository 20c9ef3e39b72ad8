//! Deployment configuration (`deploy.yml`)
//!
//! The configuration is read once per invocation and passed by reference to
//! the chart generator, the bootstrap run and the release step. YAML is the
//! native format; a file with a `.toml` extension is read as TOML with the
//! same schema.

mod env;
mod starter;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

pub use env::{ClearEnv, EnvConfig, Environment, LiteralValue, MissingPolicy, ProcessEnvironment};
pub use starter::{write_starter, STARTER_CONFIG};

/// Default configuration file name, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "deploy.yml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Chart name, namespace and release name
    pub service: String,

    pub image: ImageConfig,

    pub server: ServerConfig,

    pub traffic: TrafficConfig,

    #[serde(default, deserialize_with = "null_as_default")]
    pub env: EnvConfig,
}

/// Application image and the registry it is pushed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Image name without registry, e.g. `my-user/my-app`
    pub name: String,

    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry host, e.g. `ghcr.io`
    pub server: String,

    pub username: String,

    /// Names of environment variables holding the registry password
    #[serde(deserialize_with = "one_or_many")]
    pub password: Vec<String>,
}

impl RegistryConfig {
    /// Full image reference `<server>/<name>`.
    pub fn image_reference(&self, image_name: &str) -> String {
        format!("{}/{}", self.server, image_name)
    }

    /// The first password variable that is set.
    pub fn resolve_password(&self, env: &dyn Environment) -> Option<String> {
        self.password.iter().find_map(|name| env.var(name))
    }
}

/// Remote server that receives the k3s installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub ip: String,

    #[serde(default = "default_user")]
    pub user: String,

    /// Path to the SSH private key (`~` and `$VAR` are expanded)
    #[serde(default, alias = "sshKey", skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_user() -> String {
    "root".to_string()
}

/// How the SSH session authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAuth {
    /// Private key file, already expanded
    Key(PathBuf),
    Password(String),
}

impl ServerConfig {
    /// Resolve the single configured authentication method.
    pub fn auth(&self, env: &dyn Environment) -> Result<ServerAuth, ConfigError> {
        let key = self.ssh_key.as_deref().filter(|k| !k.trim().is_empty());
        let password = self.password.as_deref().filter(|p| !p.is_empty());

        match (key, password) {
            (Some(key), None) => Ok(ServerAuth::Key(expand_path(key, env)?)),
            (None, Some(password)) => Ok(ServerAuth::Password(password.to_string())),
            (Some(_), Some(_)) => Err(ConfigError::ServerAuth(
                "both ssh_key and password are set; configure exactly one".to_string(),
            )),
            (None, None) => Err(ConfigError::ServerAuth(
                "neither ssh_key nor password is set".to_string(),
            )),
        }
    }
}

/// Public traffic settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficConfig {
    pub domain: String,

    #[serde(default, alias = "tsl")]
    pub tls: bool,

    #[serde(default, alias = "redirectWWW")]
    pub redirect_www: bool,

    /// Contact address for the ACME account
    #[serde(default)]
    pub email: String,

    /// Container port the application listens on
    pub port: u16,
}

impl TrafficConfig {
    /// Hostnames served by the ingress: the bare domain, plus `www.` when redirecting.
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts = vec![self.domain.clone()];
        if self.redirect_www {
            hosts.push(format!("www.{}", self.domain));
        }
        hosts
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("{0} already exists; remove it before running init again")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    #[error("server authentication: {0}")]
    ServerAuth(String),

    #[error("environment variable '{0}' is not set")]
    MissingEnv(String),
}

impl Configuration {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let is_toml = path.extension().is_some_and(|ext| ext == "toml");

        let config: Configuration = if is_toml {
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        };

        config.validate()?;
        tracing::debug!(path = %path.display(), service = %config.service, "loaded configuration");
        Ok(config)
    }

    /// Parse YAML configuration text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Configuration = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::from(DEFAULT_CONFIG_FILE),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields and value constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.is_empty() {
            return Err(invalid("service", "must not be empty"));
        }
        // The service name doubles as a namespace, so it must be a DNS-1123 label
        if self.service.len() > 63
            || !self
                .service
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            || self.service.starts_with('-')
            || self.service.ends_with('-')
        {
            return Err(invalid(
                "service",
                "must consist of lowercase letters, digits and '-' (at most 63 characters)",
            ));
        }

        if self.image.name.is_empty() {
            return Err(invalid("image.name", "must not be empty"));
        }
        if self.image.registry.server.is_empty() {
            return Err(invalid("image.registry.server", "must not be empty"));
        }
        if self.image.registry.password.is_empty() {
            return Err(invalid(
                "image.registry.password",
                "must name at least one environment variable",
            ));
        }

        if self.server.ip.is_empty() {
            return Err(invalid("server.ip", "must not be empty"));
        }
        if self.server.user.is_empty() {
            return Err(invalid("server.user", "must not be empty"));
        }
        let key = self.server.ssh_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        let password = self.server.password.as_deref().is_some_and(|p| !p.is_empty());
        if key == password {
            return Err(ConfigError::ServerAuth(if key {
                "both ssh_key and password are set; configure exactly one".to_string()
            } else {
                "neither ssh_key nor password is set".to_string()
            }));
        }

        if self.traffic.domain.is_empty() {
            return Err(invalid("traffic.domain", "must not be empty"));
        }
        if self.traffic.port == 0 {
            return Err(invalid("traffic.port", "must be in 1..=65535"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Expand `$VAR`, `${VAR}` and a leading `~` in a path.
///
/// Unset variables expand to the empty string.
pub fn expand_path(raw: &str, env: &dyn Environment) -> Result<PathBuf, ConfigError> {
    let expanded = expand_vars(raw, env);

    if expanded == "~" || expanded.starts_with("~/") {
        let home = env
            .var("HOME")
            .ok_or_else(|| ConfigError::MissingEnv("HOME".to_string()))?;
        let rest = expanded[1..].trim_start_matches('/');
        return Ok(PathBuf::from(home).join(rest));
    }

    Ok(PathBuf::from(expanded))
}

fn expand_vars(raw: &str, env: &dyn Environment) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let name: String = if chars.peek() == Some(&'{') {
            chars.next();
            chars.by_ref().take_while(|&c| c != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            name
        };

        if name.is_empty() {
            out.push('$');
        } else {
            out.push_str(&env.var(&name).unwrap_or_default());
        }
    }

    out
}

/// Treat an explicit YAML `null` like a missing key.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Accept either a single string or a list of strings.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(name)) => vec![name],
        Some(OneOrMany::Many(names)) => names,
        None => Vec::new(),
    })
}
