//! `templates/service.yaml`

use k3s_document::{Document, Manifest};
use serde_json::json;

use super::{ChartInput, RELEASE_NAME, RELEASE_NAMESPACE};

pub(super) fn generate(input: &ChartInput<'_>) -> Manifest {
    Manifest::single(Document::from(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": RELEASE_NAME,
            "namespace": RELEASE_NAMESPACE,
        },
        "spec": {
            "type": "ClusterIP",
            "ports": [{"port": 80, "targetPort": input.config.traffic.port}],
            "selector": {"app": RELEASE_NAME},
        },
    })))
}
