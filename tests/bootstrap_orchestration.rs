//! Bootstrap runs against a scripted remote shell.

mod fixtures;

use fixtures::{config, read_fixture};
use k3s_deploy::bootstrap::{
    Bootstrap, BootstrapError, BootstrapSettings, Step, StepOutcome, CERT_MANAGER_MANIFEST, K3S_INSTALL,
};
use k3s_deploy::host::MockShell;
use k3s_deploy::kubeconfig::{CredentialBundle, EntryKind};
use tempfile::TempDir;

const WHICH_K3S: &str = "which k3s";
const CAT_KUBECONFIG: &str = "cat /etc/rancher/k3s/k3s.yaml";
const GET_CERT_MANAGER: &str = "kubectl get deployment cert-manager";
const GET_ISSUER: &str = "kubectl get clusterissuer";

fn settings(dir: &TempDir) -> BootstrapSettings {
    BootstrapSettings::new(dir.path().join("kube").join("config")).without_waits()
}

#[test]
fn test_fresh_server_installs_everything() {
    let dir = TempDir::new().unwrap();
    let config = config();
    let settings = settings(&dir);
    let shell = MockShell::new().respond(CAT_KUBECONFIG, &read_fixture("k3s.yaml"));

    let report = Bootstrap::new(&shell, &config, &settings).run().unwrap();

    assert_eq!(
        report.steps,
        vec![
            (Step::Runtime, StepOutcome::Applied),
            (Step::FetchCredentials, StepOutcome::Performed),
            (Step::Consolidate, StepOutcome::Performed),
            (Step::CertManager, StepOutcome::Applied),
            (Step::CertIssuer, StepOutcome::Applied),
        ]
    );

    let commands = shell.commands();
    assert_eq!(commands[0], "which k3s || true");
    assert_eq!(commands[1], K3S_INSTALL);
    assert_eq!(commands[2], CAT_KUBECONFIG);
    assert!(commands[3].starts_with(GET_CERT_MANAGER));
    assert_eq!(commands[4], format!("kubectl apply -f {}", CERT_MANAGER_MANIFEST));
    assert!(commands[5].starts_with(GET_ISSUER));
    assert!(commands[6].starts_with("kubectl apply -f - <<'EOF'\n"));
    assert!(commands[6].contains("kind: ClusterIssuer"));
    assert!(commands[6].contains("email: ops@example.com"));
    assert!(commands[6].ends_with("EOF"));
    assert_eq!(commands.len(), 7);
}

#[test]
fn test_fetched_kubeconfig_points_at_server() {
    let dir = TempDir::new().unwrap();
    let config = config();
    let settings = settings(&dir);
    let shell = MockShell::new().respond(CAT_KUBECONFIG, &read_fixture("k3s.yaml"));

    let report = Bootstrap::new(&shell, &config, &settings).run().unwrap();

    let written = std::fs::read_to_string(&settings.kubeconfig_path).unwrap();
    assert!(written.contains("server: https://203.0.113.10:6443"));
    assert!(!written.contains("127.0.0.1"));

    let bundle = CredentialBundle::parse(&written).unwrap();
    assert_eq!(bundle.names(EntryKind::Context), vec!["default"]);
    assert!(report.kubeconfig.unwrap().backup.is_none());
}

#[test]
fn test_configured_server_only_refreshes_credentials() {
    let dir = TempDir::new().unwrap();
    let config = config();
    let settings = settings(&dir);
    let shell = MockShell::new()
        .respond(WHICH_K3S, "/usr/local/bin/k3s\n")
        .respond(CAT_KUBECONFIG, &read_fixture("k3s.yaml"))
        .respond(GET_CERT_MANAGER, "deployment.apps/cert-manager\n")
        .respond(GET_ISSUER, "clusterissuer.cert-manager.io/lets-encrypt-issuer\n");

    let report = Bootstrap::new(&shell, &config, &settings).run().unwrap();

    assert_eq!(report.outcome(Step::Runtime), Some(StepOutcome::Skipped));
    assert_eq!(report.outcome(Step::CertManager), Some(StepOutcome::Skipped));
    assert_eq!(report.outcome(Step::CertIssuer), Some(StepOutcome::Skipped));
    assert!(!shell.ran("curl"));
    assert!(!shell.ran("kubectl apply"));
    assert_eq!(shell.commands().len(), 4);
}

#[test]
fn test_whitespace_only_check_output_means_absent() {
    let dir = TempDir::new().unwrap();
    let config = config();
    let settings = settings(&dir);
    let shell = MockShell::new()
        .respond(WHICH_K3S, "  \n")
        .respond(CAT_KUBECONFIG, &read_fixture("k3s.yaml"));

    let report = Bootstrap::new(&shell, &config, &settings).run().unwrap();
    assert_eq!(report.outcome(Step::Runtime), Some(StepOutcome::Applied));
    assert!(shell.ran(K3S_INSTALL));
}

#[test]
fn test_failure_aborts_with_step_label() {
    let dir = TempDir::new().unwrap();
    let config = config();
    let settings = settings(&dir);
    let shell = MockShell::new()
        .respond(CAT_KUBECONFIG, &read_fixture("k3s.yaml"))
        .fail("kubectl apply -f https://", "unable to connect to the server");

    let err = Bootstrap::new(&shell, &config, &settings).run().unwrap_err();

    assert_eq!(err.step(), Step::CertManager);
    assert!(matches!(err, BootstrapError::Remote { .. }));
    assert!(err.to_string().starts_with("install cert-manager: "));
    // Nothing after the failing step ran, and the kubeconfig step had completed
    assert!(!shell.ran(GET_ISSUER));
    assert!(settings.kubeconfig_path.exists());
}

#[test]
fn test_install_failure_stops_before_fetch() {
    let dir = TempDir::new().unwrap();
    let config = config();
    let settings = settings(&dir);
    let shell = MockShell::new().fail("curl", "could not resolve host");

    let err = Bootstrap::new(&shell, &config, &settings).run().unwrap_err();

    assert_eq!(err.step(), Step::Runtime);
    assert!(!shell.ran(CAT_KUBECONFIG));
    assert!(!settings.kubeconfig_path.exists());
}

#[test]
fn test_unparseable_remote_kubeconfig_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = config();
    let settings = settings(&dir);
    let shell = MockShell::new().respond(CAT_KUBECONFIG, "clusters: [unclosed\n");

    let err = Bootstrap::new(&shell, &config, &settings).run().unwrap_err();

    assert_eq!(err.step(), Step::FetchCredentials);
    assert!(matches!(err, BootstrapError::Kubeconfig { .. }));
}
