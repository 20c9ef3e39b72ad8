//! Remote server bootstrap
//!
//! Brings a bare server to the state the chart needs, one idempotent step at
//! a time over a single remote shell:
//! 1. install k3s unless `which k3s` finds it
//! 2. fetch `/etc/rancher/k3s/k3s.yaml`, pointing it at the server address
//! 3. consolidate it into the local kubeconfig
//! 4. install cert-manager unless its deployment exists
//! 5. create the Let's Encrypt `ClusterIssuer` unless it exists
//!
//! Checks are read-only and a step whose check finds its target is skipped.
//! Any failure aborts the run with the step's label; nothing is rolled back.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use k3s_document::{Document, DocumentError, Manifest};
use serde_json::json;

use crate::config::Configuration;
use crate::host::{RemoteShell, TransportError};
use crate::kubeconfig::{consolidate, ConsolidateReport, CredentialBundle, KubeconfigError};

/// Name of the ACME cluster issuer referenced by the ingress.
pub const CLUSTER_ISSUER: &str = "lets-encrypt-issuer";

/// Upstream k3s installer.
pub const K3S_INSTALL: &str = "curl -sfL https://get.k3s.io | sh -";

/// Pinned cert-manager release manifest.
pub const CERT_MANAGER_MANIFEST: &str =
    "https://github.com/cert-manager/cert-manager/releases/download/v1.13.3/cert-manager.yaml";

const REMOTE_KUBECONFIG: &str = "/etc/rancher/k3s/k3s.yaml";
const LOOPBACK: &str = "127.0.0.1";
const ACME_SERVER: &str = "https://acme-v02.api.letsencrypt.org/directory";
const ACME_ACCOUNT_KEY: &str = "letsencrypt-account-key";

/// Bootstrap steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Runtime,
    FetchCredentials,
    Consolidate,
    CertManager,
    CertIssuer,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Step::Runtime => "install k3s",
            Step::FetchCredentials => "fetch kubeconfig",
            Step::Consolidate => "update local kubeconfig",
            Step::CertManager => "install cert-manager",
            Step::CertIssuer => "create cluster issuer",
        };
        f.write_str(label)
    }
}

/// What a step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The check found nothing and the step installed or created it
    Applied,
    /// The check found the target already present
    Skipped,
    /// An unconditional step ran
    Performed,
}

/// Outcome of a bootstrap run.
#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    pub steps: Vec<(Step, StepOutcome)>,
    pub kubeconfig: Option<ConsolidateReport>,
}

impl BootstrapReport {
    pub fn outcome(&self, step: Step) -> Option<StepOutcome> {
        self.steps
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, outcome)| *outcome)
    }

    fn record(&mut self, step: Step, outcome: StepOutcome) {
        tracing::info!(step = %step, outcome = ?outcome, "bootstrap step");
        self.steps.push((step, outcome));
    }
}

/// Tunables for a bootstrap run.
#[derive(Debug, Clone)]
pub struct BootstrapSettings {
    /// Local kubeconfig that receives the server's credentials
    pub kubeconfig_path: PathBuf,
    /// Pause after installing k3s
    pub runtime_ready_wait: Duration,
    /// Pause after applying cert-manager
    pub cert_manager_ready_wait: Duration,
}

impl BootstrapSettings {
    pub fn new(kubeconfig_path: PathBuf) -> Self {
        Self {
            kubeconfig_path,
            runtime_ready_wait: Duration::from_secs(10),
            cert_manager_ready_wait: Duration::from_secs(30),
        }
    }

    /// Same settings without the readiness pauses.
    pub fn without_waits(mut self) -> Self {
        self.runtime_ready_wait = Duration::ZERO;
        self.cert_manager_ready_wait = Duration::ZERO;
        self
    }
}

/// Bootstrap errors
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("{step}: {source}")]
    Remote {
        step: Step,
        #[source]
        source: TransportError,
    },

    #[error("{step}: {source}")]
    Kubeconfig {
        step: Step,
        #[source]
        source: KubeconfigError,
    },

    #[error("{step}: failed to render manifest: {source}")]
    Render {
        step: Step,
        #[source]
        source: DocumentError,
    },
}

impl BootstrapError {
    /// The step that failed.
    pub fn step(&self) -> Step {
        match self {
            BootstrapError::Remote { step, .. }
            | BootstrapError::Kubeconfig { step, .. }
            | BootstrapError::Render { step, .. } => *step,
        }
    }
}

/// Drives the bootstrap steps over one remote shell.
pub struct Bootstrap<'a> {
    shell: &'a dyn RemoteShell,
    config: &'a Configuration,
    settings: &'a BootstrapSettings,
}

impl<'a> Bootstrap<'a> {
    pub fn new(shell: &'a dyn RemoteShell, config: &'a Configuration, settings: &'a BootstrapSettings) -> Self {
        Self {
            shell,
            config,
            settings,
        }
    }

    /// Run every step in order.
    pub fn run(&self) -> Result<BootstrapReport, BootstrapError> {
        let mut report = BootstrapReport::default();

        let outcome = self.ensure_runtime()?;
        report.record(Step::Runtime, outcome);

        let bundle = self.fetch_credentials()?;
        report.record(Step::FetchCredentials, StepOutcome::Performed);

        let consolidated = consolidate(bundle, &self.settings.kubeconfig_path).map_err(|source| {
            BootstrapError::Kubeconfig {
                step: Step::Consolidate,
                source,
            }
        })?;
        report.kubeconfig = Some(consolidated);
        report.record(Step::Consolidate, StepOutcome::Performed);

        let outcome = self.ensure_cert_manager()?;
        report.record(Step::CertManager, outcome);

        let outcome = self.ensure_cert_issuer()?;
        report.record(Step::CertIssuer, outcome);

        Ok(report)
    }

    fn ensure_runtime(&self) -> Result<StepOutcome, BootstrapError> {
        let step = Step::Runtime;
        if self.present(step, "which k3s || true")? {
            tracing::info!("k3s is already installed");
            return Ok(StepOutcome::Skipped);
        }

        tracing::info!(host = %self.config.server.ip, "installing k3s");
        self.exec(step, K3S_INSTALL)?;
        self.wait(self.settings.runtime_ready_wait, "k3s");
        Ok(StepOutcome::Applied)
    }

    fn fetch_credentials(&self) -> Result<CredentialBundle, BootstrapError> {
        let step = Step::FetchCredentials;
        let raw = self.exec(step, &format!("cat {}", REMOTE_KUBECONFIG))?;
        let text = raw.replace(LOOPBACK, &self.config.server.ip);
        CredentialBundle::parse(&text).map_err(|source| BootstrapError::Kubeconfig { step, source })
    }

    fn ensure_cert_manager(&self) -> Result<StepOutcome, BootstrapError> {
        let step = Step::CertManager;
        let check = "kubectl get deployment cert-manager -n cert-manager --output name 2>/dev/null || true";
        if self.present(step, check)? {
            tracing::info!("cert-manager is already installed");
            return Ok(StepOutcome::Skipped);
        }

        tracing::info!("installing cert-manager");
        self.exec(step, &format!("kubectl apply -f {}", CERT_MANAGER_MANIFEST))?;
        self.wait(self.settings.cert_manager_ready_wait, "cert-manager");
        Ok(StepOutcome::Applied)
    }

    fn ensure_cert_issuer(&self) -> Result<StepOutcome, BootstrapError> {
        let step = Step::CertIssuer;
        let check = format!(
            "kubectl get clusterissuer {} --output name 2>/dev/null || true",
            CLUSTER_ISSUER
        );
        if self.present(step, &check)? {
            tracing::info!(issuer = CLUSTER_ISSUER, "cluster issuer already exists");
            return Ok(StepOutcome::Skipped);
        }

        let manifest = cluster_issuer(&self.config.traffic.email)
            .render()
            .map_err(|source| BootstrapError::Render { step, source })?;
        tracing::info!(issuer = CLUSTER_ISSUER, "creating cluster issuer");
        self.exec(step, &format!("kubectl apply -f - <<'EOF'\n{}EOF", manifest))?;
        Ok(StepOutcome::Applied)
    }

    /// Run a read-only check; the target is present iff output is non-empty.
    fn present(&self, step: Step, check: &str) -> Result<bool, BootstrapError> {
        Ok(!self.exec(step, check)?.trim().is_empty())
    }

    fn exec(&self, step: Step, command: &str) -> Result<String, BootstrapError> {
        self.shell
            .run(command)
            .map_err(|source| BootstrapError::Remote { step, source })
    }

    fn wait(&self, duration: Duration, component: &str) {
        if duration.is_zero() {
            return;
        }
        tracing::info!(component, seconds = duration.as_secs(), "waiting for readiness");
        std::thread::sleep(duration);
    }
}

/// ACME `ClusterIssuer` solving HTTP-01 challenges through Traefik.
pub fn cluster_issuer(email: &str) -> Manifest {
    let mut acme = serde_json::Map::new();
    if !email.is_empty() {
        acme.insert("email".to_string(), json!(email));
    }
    acme.insert("server".to_string(), json!(ACME_SERVER));
    acme.insert("privateKeySecretRef".to_string(), json!({"name": ACME_ACCOUNT_KEY}));
    acme.insert(
        "solvers".to_string(),
        json!([{"http01": {"ingress": {"class": "traefik"}}}]),
    );

    Manifest::single(Document::from(json!({
        "apiVersion": "cert-manager.io/v1",
        "kind": "ClusterIssuer",
        "metadata": {"name": CLUSTER_ISSUER},
        "spec": {"acme": acme},
    })))
}
