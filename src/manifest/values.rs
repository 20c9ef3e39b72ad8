//! `values.yaml`
//!
//! Clear variables carry their value. Secrets carry a `${NAME}` placeholder
//! only; the real value is passed with `--set` at release time.

use k3s_document::{Document, Manifest, Mapping};
use serde_json::json;

use super::ChartInput;

pub(super) fn generate(input: &ChartInput<'_>) -> Manifest {
    let mut env = Mapping::new();
    for (name, value) in &input.clear_env {
        env.insert(name.clone(), Document::from(value.as_str()));
    }
    for name in &input.config.env.secrets {
        env.insert(name.clone(), Document::from(format!("${{{}}}", name)));
    }

    let mut values = Document::from(json!({ "replicaCount": 1 }));
    if let Some(map) = values.as_mapping_mut() {
        map.insert("env".to_string(), Document::from(env));
        map.insert(
            "resources".to_string(),
            Document::from(json!({
                "limits": {"cpu": "500m", "memory": "512Mi"},
                "requests": {"cpu": "250m", "memory": "256Mi"},
            })),
        );
    }

    Manifest::single(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::tests::{no_env, test_config};
    use std::collections::HashMap;

    #[test]
    fn test_values_literal_and_secret_placeholder() {
        let config = test_config();
        let input = ChartInput::resolve(&config, &no_env()).unwrap();
        let values = generate(&input).into_documents().remove(0);

        assert_eq!(values.get("replicaCount"), Some(&Document::from(1i64)));
        assert_eq!(values.pointer("env.DB_HOST").and_then(Document::as_str), Some("localhost"));
        assert_eq!(
            values.pointer("env.DB_PASSWORD").and_then(Document::as_str),
            Some("${DB_PASSWORD}")
        );
        assert_eq!(
            values.pointer("resources.limits.memory").and_then(Document::as_str),
            Some("512Mi")
        );
        assert_eq!(
            values.pointer("resources.requests.cpu").and_then(Document::as_str),
            Some("250m")
        );
    }

    #[test]
    fn test_unset_environment_names_skipped() {
        let mut config = test_config();
        config.env.clear = serde_yaml::from_str("[API_URL, REGION]").unwrap();
        let env: HashMap<String, String> = HashMap::from([("REGION".to_string(), "eu".to_string())]);
        let input = ChartInput::resolve(&config, &env).unwrap();
        let values = generate(&input).into_documents().remove(0);

        let keys: Vec<_> = values
            .get("env")
            .and_then(Document::as_mapping)
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys, vec!["REGION", "DB_PASSWORD"]);
    }
}
