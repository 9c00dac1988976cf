//! # Targets and Secret Sources
//!
//! Types describing which Secret to produce and where each of its values comes from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provenance of one output key
///
/// Exactly one of `value` (a literal) or `secret` (a reference into the
/// Bitwarden store) must be set.
///
/// # Example
///
/// ```yaml
/// data:
///   password:
///     secret: database
///     key: credentials.password
///   username:
///     value: admin
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretSource {
    /// Literal value, used verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Key of the Bitwarden secret to read
    #[serde(default, alias = "secretKey", skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Key inside a structured (YAML/JSON) secret value
    /// A top-level key equal to this value wins, otherwise it is split on `.`
    #[serde(default, alias = "nestedKey", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Bitwarden project name restricting the secret lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// For Secret data only: when false the value is already base64 encoded
    #[serde(default = "crate::crd::default_true")]
    pub base64encode: bool,
}

impl SecretSource {
    /// Literal source
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            base64encode: true,
            ..Self::default()
        }
    }

    /// Reference to a store secret, optionally narrowed to a nested key
    #[must_use]
    pub fn reference(secret: impl Into<String>, key: Option<&str>) -> Self {
        Self {
            secret: Some(secret.into()),
            key: key.map(str::to_string),
            base64encode: true,
            ..Self::default()
        }
    }
}

/// How an existing target Secret is brought to the desired state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SecretAction {
    /// Replace data, annotations, labels and type
    #[default]
    Replace,
    /// Merge desired keys into the existing Secret (additive only)
    Patch,
}

/// One declared output Secret
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Name of the Secret
    pub name: String,
    /// Namespace of the Secret, defaults to the namespace of the owning resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Secret type
    #[serde(default = "crate::crd::default_secret_type", rename = "type")]
    pub type_: String,
    /// Replace (default) or additive patch
    #[serde(default)]
    pub action: SecretAction,
    #[serde(default)]
    pub annotations: BTreeMap<String, SecretSource>,
    #[serde(default)]
    pub labels: BTreeMap<String, SecretSource>,
    #[serde(default)]
    pub data: BTreeMap<String, SecretSource>,
}

/// Reference to the Secret holding the Bitwarden access token
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenSecretRef {
    /// Secret name in the namespace of the resource
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_defaults() {
        let target: Target = serde_json::from_value(serde_json::json!({
            "name": "app-secret",
            "data": {"password": {"secret": "db", "key": "password"}}
        }))
        .unwrap();

        assert_eq!(target.type_, "Opaque");
        assert_eq!(target.action, SecretAction::Replace);
        assert!(target.namespace.is_none());
        let source = &target.data["password"];
        assert!(source.base64encode);
        assert_eq!(source.secret.as_deref(), Some("db"));
        assert_eq!(source.key.as_deref(), Some("password"));
    }

    #[test]
    fn test_source_aliases() {
        let source: SecretSource = serde_json::from_value(serde_json::json!({
            "secretKey": "db",
            "nestedKey": "a.b",
            "base64encode": false
        }))
        .unwrap();
        assert_eq!(source.secret.as_deref(), Some("db"));
        assert_eq!(source.key.as_deref(), Some("a.b"));
        assert!(!source.base64encode);
    }

    #[test]
    fn test_patch_action() {
        let target: Target = serde_json::from_value(serde_json::json!({
            "name": "tls",
            "type": "kubernetes.io/tls",
            "action": "patch"
        }))
        .unwrap();
        assert_eq!(target.action, SecretAction::Patch);
        assert_eq!(target.type_, "kubernetes.io/tls");
    }
}
