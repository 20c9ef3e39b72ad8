//! `templates/secrets.yaml`
//!
//! Two secrets: the image pull secret for the registry and an opaque secret
//! holding the application's secret variables. The latter never contains a
//! literal value, only a template action reading `.Values.env`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k3s_document::{Document, Manifest, Mapping};
use serde_json::json;

use super::{action, ChartInput, REGISTRY_SECRET, RELEASE_NAME, RELEASE_NAMESPACE};
use crate::config::RegistryConfig;

/// Key of the registry credential inside the pull secret.
const DOCKER_CONFIG_KEY: &str = ".dockerconfigjson";

/// Base64 of `{"auths":{"<server>":{"auth":"<base64(username:password)>"}}}`.
pub fn registry_credential(registry: &RegistryConfig, password: &str) -> String {
    let auth = STANDARD.encode(format!("{}:{}", registry.username, password));
    let config = json!({
        "auths": {
            registry.server.as_str(): {"auth": auth}
        }
    });
    STANDARD.encode(config.to_string())
}

pub(super) fn generate(input: &ChartInput<'_>) -> Manifest {
    // Without a password the key is left out so a value already on disk
    // survives the merge.
    let mut registry_data = Mapping::new();
    if let Some(password) = &input.registry_password {
        registry_data.insert(
            DOCKER_CONFIG_KEY.to_string(),
            Document::from(registry_credential(&input.config.image.registry, password)),
        );
    }

    let mut app_data = Mapping::new();
    for name in &input.config.env.secrets {
        app_data.insert(
            name.clone(),
            Document::from(action(&format!(".Values.env.{} | b64enc", name))),
        );
    }

    let mut registry_secret = Document::from(json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": REGISTRY_SECRET,
            "namespace": RELEASE_NAMESPACE,
        },
        "type": "kubernetes.io/dockerconfigjson",
    }));
    if let Some(map) = registry_secret.as_mapping_mut() {
        map.insert("data".to_string(), Document::from(registry_data));
    }

    let mut app_secret = Document::from(json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": format!("{}-secrets", RELEASE_NAME),
            "namespace": RELEASE_NAMESPACE,
        },
        "type": "Opaque",
    }));
    if let Some(map) = app_secret.as_mapping_mut() {
        map.insert("data".to_string(), Document::from(app_data));
    }

    Manifest::new(vec![registry_secret, app_secret])
}
