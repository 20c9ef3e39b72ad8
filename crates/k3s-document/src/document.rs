//! The structured document model.
//!
//! Every artifact and credential bundle is handled as a [`Document`]: an
//! insertion-ordered mapping, a sequence, or a scalar. Conversions exist from
//! `serde_yaml::Value` (parsing) and `serde_json::Value` (generators build
//! their output with `json!`).

use std::fmt;

use indexmap::IndexMap;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Ordered string-keyed mapping.
pub type Mapping = IndexMap<String, Document>;

/// A parsed structured document.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Mapping(Mapping),
    Sequence(Vec<Document>),
    Scalar(Scalar),
}

/// Leaf values.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(serde_yaml::Number),
    String(String),
}

impl Document {
    /// An empty mapping.
    pub fn mapping() -> Self {
        Document::Mapping(Mapping::new())
    }

    pub fn null() -> Self {
        Document::Scalar(Scalar::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Document::Scalar(Scalar::Null))
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Document::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Document::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Document]> {
        match self {
            Document::Sequence(seq) => Some(seq),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Document::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Look up a key when this document is a mapping.
    pub fn get(&self, key: &str) -> Option<&Document> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Document> {
        self.as_mapping_mut().and_then(|map| map.get_mut(key))
    }

    /// Follow a dot-separated path of mapping keys.
    pub fn pointer(&self, path: &str) -> Option<&Document> {
        path.split('.').try_fold(self, |current, key| current.get(key))
    }

    /// Apply `f` to every mapping key and string scalar, depth first.
    pub fn map_text(self, f: &mut impl FnMut(String) -> String) -> Document {
        match self {
            Document::Mapping(map) => Document::Mapping(
                map.into_iter()
                    .map(|(key, value)| (f(key), value.map_text(&mut *f)))
                    .collect(),
            ),
            Document::Sequence(seq) => {
                Document::Sequence(seq.into_iter().map(|item| item.map_text(&mut *f)).collect())
            }
            Document::Scalar(Scalar::String(s)) => Document::Scalar(Scalar::String(f(s))),
            scalar @ Document::Scalar(_) => scalar,
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::null()
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<serde_yaml::Value> for Document {
    fn from(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value;

        match value {
            Value::Null => Document::null(),
            Value::Bool(b) => Document::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Document::Scalar(Scalar::Number(n)),
            Value::String(s) => Document::Scalar(Scalar::String(s)),
            Value::Sequence(seq) => Document::Sequence(seq.into_iter().map(Document::from).collect()),
            Value::Mapping(map) => Document::Mapping(
                map.into_iter()
                    .map(|(key, value)| (key_text(key), Document::from(value)))
                    .collect(),
            ),
            Value::Tagged(tagged) => Document::from(tagged.value),
        }
    }
}

/// Render a non-string YAML key as the text it was written with.
fn key_text(key: serde_yaml::Value) -> String {
    use serde_yaml::Value;

    match key {
        Value::String(s) => s,
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Tagged(tagged) => key_text(tagged.value),
        complex => serde_yaml::to_string(&complex)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

impl From<serde_json::Value> for Document {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Document::null(),
            Value::Bool(b) => Document::Scalar(Scalar::Bool(b)),
            Value::Number(n) => {
                let number = if let Some(i) = n.as_i64() {
                    serde_yaml::Number::from(i)
                } else if let Some(u) = n.as_u64() {
                    serde_yaml::Number::from(u)
                } else {
                    serde_yaml::Number::from(n.as_f64().unwrap_or_default())
                };
                Document::Scalar(Scalar::Number(number))
            }
            Value::String(s) => Document::Scalar(Scalar::String(s)),
            Value::Array(items) => Document::Sequence(items.into_iter().map(Document::from).collect()),
            Value::Object(map) => Document::Mapping(
                map.into_iter()
                    .map(|(key, value)| (key, Document::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Document {
    fn from(s: &str) -> Self {
        Document::Scalar(Scalar::String(s.to_string()))
    }
}

impl From<String> for Document {
    fn from(s: String) -> Self {
        Document::Scalar(Scalar::String(s))
    }
}

impl From<bool> for Document {
    fn from(b: bool) -> Self {
        Document::Scalar(Scalar::Bool(b))
    }
}

impl From<i64> for Document {
    fn from(i: i64) -> Self {
        Document::Scalar(Scalar::Number(i.into()))
    }
}

impl From<Mapping> for Document {
    fn from(map: Mapping) -> Self {
        Document::Mapping(map)
    }
}

impl From<Vec<Document>> for Document {
    fn from(seq: Vec<Document>) -> Self {
        Document::Sequence(seq)
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Document::Mapping(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
            Document::Sequence(seq) => seq.serialize(serializer),
            Document::Scalar(scalar) => scalar.serialize(serializer),
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_unit(),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Number(n) => n.serialize(serializer),
            Scalar::String(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_yaml::Value::deserialize(deserializer).map(Document::from)
    }
}
