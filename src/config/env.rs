//! Application environment variables
//!
//! `env.clear` is either a literal mapping written in `deploy.yml` or a list of
//! names looked up in the process environment. `env.secrets` is always looked
//! up. What happens to an unset variable depends on the caller: chart
//! generation skips it, deployment fails.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Source of process environment values.
pub trait Environment {
    /// Value of `name`, or `None` when unset or empty.
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|value| !value.is_empty())
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).filter(|value| !value.is_empty()).cloned()
    }
}

/// What to do with a variable that is not set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Leave the entry out.
    Skip,
    /// Report [`ConfigError::MissingEnv`].
    Fail,
}

/// A literal value in the `env.clear` mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// `NAME:` with nothing after it; rendered as an empty string
    Null,
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::String(s) => write!(f, "{}", s),
            LiteralValue::Integer(i) => write!(f, "{}", i),
            LiteralValue::Float(x) => write!(f, "{}", x),
            LiteralValue::Bool(b) => write!(f, "{}", b),
            LiteralValue::Null => Ok(()),
        }
    }
}

/// Non-secret environment for the application container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClearEnv {
    /// `NAME: value` pairs written in the config file.
    Literal(IndexMap<String, LiteralValue>),
    /// Names resolved from the process environment.
    FromEnvironment(Vec<String>),
}

impl Default for ClearEnv {
    fn default() -> Self {
        ClearEnv::Literal(IndexMap::new())
    }
}

impl ClearEnv {
    /// Variable names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        match self {
            ClearEnv::Literal(values) => values.keys().map(String::as_str).collect(),
            ClearEnv::FromEnvironment(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// The `env` section of `deploy.yml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub clear: ClearEnv,

    #[serde(default, deserialize_with = "super::null_as_default")]
    pub secrets: Vec<String>,
}

impl EnvConfig {
    /// Resolve the clear variables to `(name, value)` pairs.
    ///
    /// Literal values are returned as written; names are looked up in `env`
    /// and handled according to `policy` when unset.
    pub fn clear_values(
        &self,
        env: &dyn Environment,
        policy: MissingPolicy,
    ) -> Result<Vec<(String, String)>, ConfigError> {
        match &self.clear {
            ClearEnv::Literal(values) => Ok(values
                .iter()
                .map(|(name, value)| (name.clone(), value.to_string()))
                .collect()),
            ClearEnv::FromEnvironment(names) => resolve(names, env, policy),
        }
    }

    /// Resolve every secret; an unset secret is an error.
    pub fn secret_values(&self, env: &dyn Environment) -> Result<Vec<(String, String)>, ConfigError> {
        resolve(&self.secrets, env, MissingPolicy::Fail)
    }
}

fn resolve(
    names: &[String],
    env: &dyn Environment,
    policy: MissingPolicy,
) -> Result<Vec<(String, String)>, ConfigError> {
    let mut values = Vec::with_capacity(names.len());
    for name in names {
        match env.var(name) {
            Some(value) => values.push((name.clone(), value)),
            None if policy == MissingPolicy::Skip => {
                tracing::debug!(variable = %name, "environment variable not set, skipping");
            }
            None => return Err(ConfigError::MissingEnv(name.clone())),
        }
    }
    Ok(values)
}
