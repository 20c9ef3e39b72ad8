//! Helm release
//!
//! `helm upgrade --install` of the generated chart into a namespace named
//! after the service, passing every environment value with `--set`.

use std::path::Path;

use crate::config::{ConfigError, Configuration, Environment, MissingPolicy};
use crate::tool::{CommandRunner, Invocation, ToolError};

/// Release errors
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Escape a value for `helm --set`, where `,` separates assignments.
pub fn escape_set_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace(',', "\\,")
}

/// The `helm upgrade --install` call for `chart_dir`.
///
/// Every environment-sourced value must be set; literal clear values are
/// passed as written.
pub fn invocation(
    config: &Configuration,
    env: &dyn Environment,
    chart_dir: &Path,
) -> Result<Invocation, ReleaseError> {
    let mut invocation = Invocation::new("helm").args([
        "upgrade",
        "--install",
        config.service.as_str(),
        &chart_dir.display().to_string(),
        "-n",
        config.service.as_str(),
        "--create-namespace",
        "--history-max",
        "1",
    ]);

    for (name, value) in config.env.clear_values(env, MissingPolicy::Fail)? {
        invocation = invocation
            .arg("--set")
            .arg(format!("env.{}={}", name, escape_set_value(&value)));
    }
    for (name, value) in config.env.secret_values(env)? {
        invocation = invocation
            .arg("--set")
            .secret_arg(format!("env.{}={}", name, escape_set_value(&value)));
    }

    Ok(invocation)
}

/// Install or upgrade the release.
pub fn deploy(
    config: &Configuration,
    env: &dyn Environment,
    chart_dir: &Path,
    runner: &dyn CommandRunner,
) -> Result<(), ReleaseError> {
    let invocation = invocation(config, env, chart_dir)?;
    runner.run(&invocation)?;
    tracing::info!(release = %config.service, namespace = %config.service, "release deployed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::RecordingRunner;
    use std::collections::HashMap;

    fn config() -> Configuration {
        Configuration::parse(crate::config::STARTER_CONFIG).unwrap()
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_argument_list() {
        let invocation = invocation(&config(), &env(&[("DB_PASSWORD", "p,w")]), Path::new(".helm")).unwrap();
        assert_eq!(
            invocation.args,
            vec![
                "upgrade",
                "--install",
                "my-app",
                ".helm",
                "-n",
                "my-app",
                "--create-namespace",
                "--history-max",
                "1",
                "--set",
                "env.DB_HOST=localhost",
                "--set",
                "env.DB_PASSWORD=p\\,w",
            ]
        );
        assert!(!invocation.to_string().contains("p\\,w"));
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let err = invocation(&config(), &env(&[]), Path::new(".helm")).unwrap_err();
        assert!(matches!(err, ReleaseError::Config(ConfigError::MissingEnv(ref name)) if name == "DB_PASSWORD"));
    }

    #[test]
    fn test_missing_environment_clear_value_is_fatal() {
        let mut config = config();
        config.env.clear = serde_yaml::from_str("[API_URL]").unwrap();
        let err = invocation(&config, &env(&[("DB_PASSWORD", "x")]), Path::new(".helm")).unwrap_err();
        assert!(matches!(err, ReleaseError::Config(ConfigError::MissingEnv(ref name)) if name == "API_URL"));
    }

    #[test]
    fn test_deploy_runs_helm_once() {
        let runner = RecordingRunner::new();
        deploy(&config(), &env(&[("DB_PASSWORD", "x")]), Path::new("chart"), &runner).unwrap();
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "helm");
        assert_eq!(calls[0].args[3], "chart");
    }

    #[test]
    fn test_escape_set_value() {
        assert_eq!(escape_set_value("a,b"), "a\\,b");
        assert_eq!(escape_set_value("plain"), "plain");
    }
}
