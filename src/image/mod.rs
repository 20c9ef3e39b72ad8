//! Container image build and push
//!
//! `docker build` → `docker tag` → `docker login` → `docker push`. The image
//! is built for `linux/amd64`, the architecture of the target server.

use crate::config::{Configuration, Environment};
use crate::tool::{CommandRunner, Invocation, ToolError};

const PLATFORM: &str = "linux/amd64";

/// Image errors
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("registry password is not set (looked for {0})")]
    MissingPassword(String),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// The docker calls for one build-and-push, in order.
pub fn invocations(config: &Configuration, password: &str) -> Vec<Invocation> {
    let registry = &config.image.registry;
    let local = config.image.name.as_str();
    let remote = registry.image_reference(local);

    vec![
        Invocation::new("docker")
            .args(["build", "--platform", PLATFORM, "-t", local, "."]),
        Invocation::new("docker").args(["tag", local, remote.as_str()]),
        Invocation::new("docker")
            .args(["login", registry.server.as_str(), "-u", registry.username.as_str(), "--password-stdin"])
            .stdin(password),
        Invocation::new("docker").args(["push", remote.as_str()]),
    ]
}

/// Build the image and push it to the configured registry.
///
/// Returns the pushed image reference.
pub fn build_and_push(
    config: &Configuration,
    env: &dyn Environment,
    runner: &dyn CommandRunner,
) -> Result<String, ImageError> {
    let registry = &config.image.registry;
    let password = registry
        .resolve_password(env)
        .ok_or_else(|| ImageError::MissingPassword(registry.password.join(", ")))?;

    for invocation in invocations(config, &password) {
        runner.run(&invocation)?;
    }

    let reference = registry.image_reference(&config.image.name);
    tracing::info!(image = %reference, "image pushed");
    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::RecordingRunner;
    use std::collections::HashMap;

    fn config() -> Configuration {
        Configuration::parse(crate::config::STARTER_CONFIG).unwrap()
    }

    #[test]
    fn test_call_sequence() {
        let env: HashMap<String, String> = HashMap::from([("GITHUB_TOKEN".to_string(), "ghp_x".to_string())]);
        let runner = RecordingRunner::new();

        let reference = build_and_push(&config(), &env, &runner).unwrap();
        assert_eq!(reference, "ghcr.io/my-user/my-app");

        let calls: Vec<String> = runner.calls().iter().map(ToString::to_string).collect();
        assert_eq!(
            calls,
            vec![
                "docker build --platform linux/amd64 -t my-user/my-app .",
                "docker tag my-user/my-app ghcr.io/my-user/my-app",
                "docker login ghcr.io -u my-user --password-stdin",
                "docker push ghcr.io/my-user/my-app",
            ]
        );
        assert_eq!(runner.calls()[2].stdin.as_deref(), Some("ghp_x"));
    }

    #[test]
    fn test_missing_password_is_fatal_before_any_call() {
        let env: HashMap<String, String> = HashMap::new();
        let runner = RecordingRunner::new();

        let err = build_and_push(&config(), &env, &runner).unwrap_err();
        assert!(matches!(err, ImageError::MissingPassword(ref names) if names == "GITHUB_TOKEN"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_failed_login_stops_sequence() {
        let env: HashMap<String, String> = HashMap::from([("GITHUB_TOKEN".to_string(), "ghp_x".to_string())]);
        let runner = RecordingRunner::failing("docker", "login");

        assert!(matches!(
            build_and_push(&config(), &env, &runner),
            Err(ImageError::Tool(_))
        ));
        assert_eq!(runner.calls().len(), 3);
    }
}
