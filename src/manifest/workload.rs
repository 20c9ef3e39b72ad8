//! `templates/deployment.yaml`

use k3s_document::{Document, Manifest};
use serde_json::{json, Value};

use super::{action, ChartInput, REGISTRY_SECRET, RELEASE_NAME, RELEASE_NAMESPACE};

/// Splices `.Values.resources` under the container's `resources` key. The
/// container keys are rendered at column 8, so the block goes to column 10.
const RESOURCES: &str = "{{- toYaml .Values.resources | nindent 10 }}";

pub(super) fn generate(input: &ChartInput<'_>) -> Manifest {
    let config = input.config;

    let mut container = json!({
        "name": RELEASE_NAME,
        "image": config.image.registry.image_reference(&config.image.name),
        "ports": [{"containerPort": config.traffic.port}],
    });

    let names = config.env.clear.names();
    if !names.is_empty() {
        container["env"] = Value::Array(
            names
                .iter()
                .map(|name| {
                    json!({
                        "name": name,
                        "value": action(&format!(".Values.env.{} | quote", name)),
                    })
                })
                .collect(),
        );
    }

    if !config.env.secrets.is_empty() {
        container["envFrom"] = json!([
            {"secretRef": {"name": format!("{}-secrets", RELEASE_NAME)}}
        ]);
    }

    container["resources"] = json!(RESOURCES);

    Manifest::single(Document::from(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": RELEASE_NAME,
            "namespace": RELEASE_NAMESPACE,
        },
        "spec": {
            "replicas": action(".Values.replicaCount"),
            "selector": {"matchLabels": {"app": RELEASE_NAME}},
            "template": {
                "metadata": {"labels": {"app": RELEASE_NAME}},
                "spec": {
                    "containers": [container],
                    "imagePullSecrets": [{"name": REGISTRY_SECRET}],
                },
            },
        },
    })))
}
