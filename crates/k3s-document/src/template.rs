//! Helm template actions inside YAML text.
//!
//! A chart template such as `replicas: {{ .Values.replicaCount }}` is not
//! valid YAML on its own. Before parsing, every `{{ ... }}` action is swapped
//! for a plain placeholder token; after parsing, the tokens inside keys and
//! strings are swapped back so the [`Document`] carries the real action text.
//! Rendering runs the same steps in reverse, which writes actions back
//! unquoted.

use crate::document::Document;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Table of the actions seen in one piece of text.
#[derive(Debug, Default)]
pub(crate) struct Actions {
    actions: Vec<String>,
}

impl Actions {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn token(index: usize) -> String {
        format!("__k3s_tpl_{}__", index)
    }

    fn intern(&mut self, action: &str) -> String {
        let index = match self.actions.iter().position(|known| known == action) {
            Some(index) => index,
            None => {
                self.actions.push(action.to_string());
                self.actions.len() - 1
            }
        };
        Self::token(index)
    }

    /// Replace every complete `{{ ... }}` action with its token.
    pub(crate) fn protect(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find(OPEN) {
            let candidate = &rest[start..];
            let Some(end) = candidate.find(CLOSE) else {
                break;
            };
            let action = &candidate[..end + CLOSE.len()];
            out.push_str(&rest[..start]);
            out.push_str(&self.intern(action));
            rest = &candidate[end + CLOSE.len()..];
        }

        out.push_str(rest);
        out
    }

    /// Replace every token with the action it stands for.
    pub(crate) fn restore(&self, text: &str) -> String {
        if self.actions.is_empty() {
            return text.to_string();
        }
        self.actions
            .iter()
            .enumerate()
            .fold(text.to_string(), |acc, (index, action)| {
                acc.replace(&Self::token(index), action)
            })
    }

    /// Protect the keys and strings of a document before serializing it.
    pub(crate) fn protect_document(&mut self, doc: Document) -> Document {
        doc.map_text(&mut |text| {
            if text.contains(OPEN) {
                self.protect(&text)
            } else {
                text
            }
        })
    }

    /// Restore the keys and strings of a freshly parsed document.
    pub(crate) fn restore_document(&self, doc: Document) -> Document {
        if self.actions.is_empty() {
            return doc;
        }
        doc.map_text(&mut |text| self.restore(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protect_and_restore_text() {
        let mut actions = Actions::new();
        let text = "name: {{ .Release.Name }}-ingress\nns: {{ .Release.Namespace }}\n";
        let protected = actions.protect(text);
        assert!(!protected.contains("{{"));
        assert_eq!(actions.restore(&protected), text);
    }

    #[test]
    fn test_same_action_shares_token() {
        let mut actions = Actions::new();
        let protected = actions.protect("{{ .Release.Name }} {{ .Release.Name }}");
        assert_eq!(protected, "__k3s_tpl_0__ __k3s_tpl_0__");
    }

    #[test]
    fn test_unterminated_action_left_alone() {
        let mut actions = Actions::new();
        assert_eq!(actions.protect("value: {{ broken"), "value: {{ broken");
    }

    #[test]
    fn test_tokens_do_not_collide_past_ten() {
        let mut actions = Actions::new();
        let text: String = (0..12).map(|i| format!("{{{{ a{} }}}} ", i)).collect();
        let protected = actions.protect(&text);
        assert_eq!(actions.restore(&protected), text);
    }
}
