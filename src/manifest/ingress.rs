//! `templates/ingress.yaml`
//!
//! Traefik is the ingress controller bundled with k3s. With `redirect_www`
//! a `Middleware` redirecting `www.<domain>` to `<domain>` is emitted first
//! and referenced from the ingress.

use k3s_document::{Document, Manifest, Mapping};
use serde_json::{json, Value};

use super::{ChartInput, RELEASE_NAME, RELEASE_NAMESPACE};
use crate::bootstrap::CLUSTER_ISSUER;

const REDIRECT_MIDDLEWARE: &str = "redirect-www";

pub(super) fn generate(input: &ChartInput<'_>) -> Manifest {
    let traffic = &input.config.traffic;
    let mut documents = Vec::new();

    if traffic.redirect_www {
        documents.push(redirect_middleware(&traffic.domain, traffic.tls));
    }

    let mut annotations = Mapping::new();
    if traffic.tls {
        for (key, value) in [
            ("traefik.ingress.kubernetes.io/router.entrypoints", "websecure"),
            ("cert-manager.io/cluster-issuer", CLUSTER_ISSUER),
            ("traefik.ingress.kubernetes.io/router.tls", "true"),
        ] {
            annotations.insert(key.to_string(), Document::from(value));
        }
    }
    if traffic.redirect_www {
        annotations.insert(
            "traefik.ingress.kubernetes.io/router.middlewares".to_string(),
            Document::from(format!("{}-{}@kubernetescrd", RELEASE_NAMESPACE, REDIRECT_MIDDLEWARE)),
        );
    }

    let mut metadata = Document::from(json!({
        "name": format!("{}-ingress", RELEASE_NAME),
        "namespace": RELEASE_NAMESPACE,
    }));
    if !annotations.is_empty() {
        if let Some(map) = metadata.as_mapping_mut() {
            map.insert("annotations".to_string(), Document::from(annotations));
        }
    }

    let hosts = traffic.hosts();
    let mut spec = serde_json::Map::new();
    if traffic.tls {
        spec.insert(
            "tls".to_string(),
            json!([{
                "hosts": hosts,
                "secretName": format!("{}-ingress-tls", RELEASE_NAME),
            }]),
        );
    }
    spec.insert(
        "rules".to_string(),
        Value::Array(hosts.iter().map(String::as_str).map(rule).collect()),
    );

    let mut ingress = Document::from(json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "Ingress",
    }));
    if let Some(map) = ingress.as_mapping_mut() {
        map.insert("metadata".to_string(), metadata);
        map.insert("spec".to_string(), Document::from(Value::Object(spec)));
    }
    documents.push(ingress);

    Manifest::new(documents)
}

fn redirect_middleware(domain: &str, tls: bool) -> Document {
    let scheme = if tls { "https" } else { "http" };
    Document::from(json!({
        "apiVersion": "traefik.containo.us/v1alpha1",
        "kind": "Middleware",
        "metadata": {
            "name": REDIRECT_MIDDLEWARE,
            "namespace": RELEASE_NAMESPACE,
        },
        "spec": {
            "redirectRegex": {
                "regex": format!(r"^https?://www\.{}/(.*)", domain.replace('.', r"\.")),
                "replacement": format!("{}://{}/${{1}}", scheme, domain),
                "permanent": true,
            },
        },
    }))
}

fn rule(host: &str) -> Value {
    json!({
        "host": host,
        "http": {
            "paths": [{
                "path": "/",
                "pathType": "Prefix",
                "backend": {
                    "service": {
                        "name": RELEASE_NAME,
                        "port": {"number": 80},
                    },
                },
            }],
        },
    })
}
