// src/credential/bundle.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::table::{AUTH_TOKENS, TLS_BOOTSTRAP_TOKEN};

/// Compacted credentials keyed by entry name, handed to the template renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialBundle {
    entries: BTreeMap<String, String>,
}

impl CredentialBundle {
    pub fn insert(&mut self, name: impl Into<String>, compacted: String) {
        self.entries.insert(name.into(), compacted);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn has_auth_tokens(&self) -> bool {
        self.has_content(AUTH_TOKENS)
    }

    pub fn has_tls_bootstrap_token(&self) -> bool {
        self.has_content(TLS_BOOTSTRAP_TOKEN)
    }

    fn has_content(&self, name: &str) -> bool {
        self.get(name).map_or(false, |value| !value.is_empty())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_queries() {
        let mut bundle = CredentialBundle::default();
        assert!(!bundle.has_auth_tokens());
        bundle.insert(AUTH_TOKENS, String::new());
        bundle.insert(TLS_BOOTSTRAP_TOKEN, "H4sIAAAAAAAC/w==".to_string());
        assert!(!bundle.has_auth_tokens());
        assert!(bundle.has_tls_bootstrap_token());
    }

    #[test]
    fn test_serializes_as_flat_map() {
        let mut bundle = CredentialBundle::default();
        bundle.insert("worker", "b".to_string());
        bundle.insert("ca", "a".to_string());
        let json = serde_json::to_string(&bundle).unwrap();
        assert_eq!(json, r#"{"ca":"a","worker":"b"}"#);
        let back: CredentialBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bundle);
    }
}
