//! ModelConfig resource: provider and credential settings for a language
//! model shared by agents.

use crate::resource::condition::Condition;
use crate::resource::SecretReference;
use crate::types::Generation;
use serde::{Deserialize, Serialize};

/// TLS settings for providers fronted by a private CA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    /// Name of the secret holding the CA certificate bundle.
    pub ca_cert_secret_ref: String,
}

/// Desired state of a ModelConfig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfigSpec {
    /// Model identifier, e.g. `gpt-4.1` or `claude-sonnet-4`.
    pub model: String,
    /// Provider identifier, e.g. `openai` or `anthropic`.
    pub provider: String,
    /// Name of the secret holding the provider API key.
    #[serde(default)]
    pub api_key_secret_ref: String,
    /// Key within the API key secret.
    #[serde(default)]
    pub api_key_secret_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

impl ModelConfigSpec {
    /// Secret references this spec depends on. The CA cert secret is hashed
    /// whole, so its reference carries no key.
    pub fn secret_refs(&self) -> Vec<SecretReference> {
        let mut refs = Vec::new();
        if !self.api_key_secret_ref.is_empty() {
            refs.push(SecretReference {
                name: self.api_key_secret_ref.clone(),
                key: self.api_key_secret_key.clone(),
            });
        }
        if let Some(tls) = &self.tls {
            if !tls.ca_cert_secret_ref.is_empty() {
                refs.push(SecretReference {
                    name: tls.ca_cert_secret_ref.clone(),
                    key: String::new(),
                });
            }
        }
        refs
    }
}

/// Observed state of a ModelConfig.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfigStatus {
    #[serde(default)]
    pub observed_generation: Generation,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Digest of all referenced secrets, used to detect rotation.
    #[serde(default)]
    pub secret_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_refs_collects_api_key_and_ca() {
        let spec = ModelConfigSpec {
            model: "gpt-4.1".into(),
            provider: "openai".into(),
            api_key_secret_ref: "openai-key".into(),
            api_key_secret_key: "api-key".into(),
            tls: Some(TlsConfig {
                ca_cert_secret_ref: "corp-ca".into(),
            }),
        };
        let refs = spec.secret_refs();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, "openai-key");
        assert_eq!(refs[1].name, "corp-ca");
        assert!(refs[1].key.is_empty());
    }

    #[test]
    fn test_secret_refs_empty_when_unset() {
        let spec = ModelConfigSpec {
            model: "local".into(),
            provider: "ollama".into(),
            api_key_secret_ref: String::new(),
            api_key_secret_key: String::new(),
            tls: None,
        };
        assert!(spec.secret_refs().is_empty());
    }
}
