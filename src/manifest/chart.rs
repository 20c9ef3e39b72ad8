//! `Chart.yaml`

use k3s_document::{Document, Manifest};
use serde_json::json;

use super::ChartInput;

pub(super) fn generate(input: &ChartInput<'_>) -> Manifest {
    Manifest::single(Document::from(json!({
        "apiVersion": "v2",
        "name": input.config.service,
        "type": "application",
        "version": "0.1.0",
        "appVersion": "1.16.0",
    })))
}
