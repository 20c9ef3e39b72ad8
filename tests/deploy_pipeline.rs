//! Image push and helm release call sequences.

mod fixtures;

use std::path::Path;

use fixtures::{config, env};
use k3s_deploy::config::ConfigError;
use k3s_deploy::image::{self, ImageError};
use k3s_deploy::release::{self, ReleaseError};
use k3s_deploy::tool::RecordingRunner;

#[test]
fn test_image_pushed_with_first_set_password() {
    let config = config();
    let runner = RecordingRunner::new();
    let env = env(&[("GITHUB_TOKEN", "ghp_fallback")]);

    let reference = image::build_and_push(&config, &env, &runner).unwrap();
    assert_eq!(reference, "ghcr.io/acme/shop");

    let calls = runner.calls();
    let verbs: Vec<_> = calls.iter().map(|call| call.args[0].as_str()).collect();
    assert_eq!(verbs, vec!["build", "tag", "login", "push"]);
    assert_eq!(calls[2].stdin.as_deref(), Some("ghp_fallback"));
    assert!(!calls[2].args.iter().any(|arg| arg.contains("ghp_fallback")));
}

#[test]
fn test_earlier_password_variable_wins() {
    let config = config();
    let runner = RecordingRunner::new();
    let env = env(&[("REGISTRY_TOKEN", "primary"), ("GITHUB_TOKEN", "fallback")]);

    image::build_and_push(&config, &env, &runner).unwrap();
    assert_eq!(runner.calls()[2].stdin.as_deref(), Some("primary"));
}

#[test]
fn test_push_without_password_runs_nothing() {
    let config = config();
    let runner = RecordingRunner::new();

    let err = image::build_and_push(&config, &env(&[]), &runner).unwrap_err();
    assert!(matches!(err, ImageError::MissingPassword(_)));
    assert!(runner.calls().is_empty());
}

#[test]
fn test_failed_build_stops_the_sequence() {
    let config = config();
    let runner = RecordingRunner::failing("docker", "build");

    let err = image::build_and_push(&config, &env(&[("GITHUB_TOKEN", "t")]), &runner).unwrap_err();
    assert!(matches!(err, ImageError::Tool(_)));
    assert_eq!(runner.calls().len(), 1);
}

#[test]
fn test_release_passes_env_and_masks_secrets() {
    let config = config();
    let runner = RecordingRunner::new();
    let env = env(&[
        ("DATABASE_URL", "postgres://shop:pw@db/shop?sslmode=require,application_name=shop"),
        ("SESSION_KEY", "s3cret"),
    ]);

    release::deploy(&config, &env, Path::new(".helm"), &runner).unwrap();

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    let helm = &calls[0];
    assert_eq!(helm.program, "helm");
    assert_eq!(
        &helm.args[..9],
        &["upgrade", "--install", "shop", ".helm", "-n", "shop", "--create-namespace", "--history-max", "1"]
    );
    assert!(helm.args.contains(&"env.NODE_ENV=production".to_string()));
    assert!(helm.args.contains(&"env.PORT=3000".to_string()));
    assert!(helm
        .args
        .contains(&"env.DATABASE_URL=postgres://shop:pw@db/shop?sslmode=require\\,application_name=shop".to_string()));

    let shown = helm.to_string();
    assert!(!shown.contains("s3cret"));
    assert!(!shown.contains("postgres://"));
    assert!(shown.contains("env.NODE_ENV=production"));
}

#[test]
fn test_release_requires_every_secret() {
    let config = config();
    let runner = RecordingRunner::new();

    let err = release::deploy(&config, &env(&[("DATABASE_URL", "x")]), Path::new(".helm"), &runner).unwrap_err();
    assert!(matches!(err, ReleaseError::Config(ConfigError::MissingEnv(ref name)) if name == "SESSION_KEY"));
    assert!(runner.calls().is_empty());
}
