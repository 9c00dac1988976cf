//! # Errors
//!
//! Domain errors of a sync pass.
//!
//! A [`SyncError`] is an expected, user-fixable misconfiguration: it is
//! recorded on the target as `failed`. Anything else reaching the per-target
//! boundary (usually an `anyhow::Error` wrapping a transport failure) is
//! recorded as `error`.

use thiserror::Error;

/// Failure to turn a secret source into a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("Bitwarden project \"{0}\" not found")]
    ProjectNotFound(String),
    #[error("Bitwarden secret \"{0}\" not found")]
    SecretNotFound(String),
    #[error("Bitwarden secret \"{secret}\" not found in project {project}")]
    SecretNotFoundInProject { secret: String, project: String },
    #[error("Bitwarden secret {secret} not in YAML dictionary format for {key}")]
    NotADictionary { secret: String, key: String },
    #[error("Bitwarden secret {secret} has no key {key}")]
    MissingKey { secret: String, key: String },
    #[error("No secret or value in configuration")]
    NoSource,
    #[error("value for {key} is not valid base64 (base64encode is false): {source}")]
    InvalidBase64 {
        key: String,
        #[source]
        source: base64::DecodeError,
    },
}

/// Expected failure of a sync pass or of one of its targets
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Bitwarden access token secret '{0}' not found")]
    AccessTokenSecretNotFound(String),
    #[error("Bitwarden access token secret '{0}' missing data.token")]
    AccessTokenMissing(String),
    #[error("bws error: {0}")]
    SecretStore(String),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("Secret {name} in {namespace} is managed by {owner}")]
    OwnershipConflict {
        name: String,
        namespace: String,
        owner: String,
    },
    #[error("Error {code} from Kubernetes API: {message}")]
    Api { code: u16, message: String },
}

impl SyncError {
    /// Map a kube error to a domain error when it carries an API status
    ///
    /// Transport and serialization failures stay unexpected faults.
    pub fn from_kube(err: kube::Error) -> anyhow::Error {
        match err {
            kube::Error::Api(api_err) => SyncError::Api {
                code: api_err.code,
                message: api_err.message,
            }
            .into(),
            other => anyhow::Error::new(other),
        }
    }
}

/// Is this error an expected domain failure?
#[must_use]
pub fn is_domain_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SyncError>().is_some() || err.downcast_ref::<ResolutionError>().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_messages() {
        assert_eq!(
            ResolutionError::SecretNotFound("db".into()).to_string(),
            "Bitwarden secret \"db\" not found"
        );
        assert_eq!(
            ResolutionError::SecretNotFoundInProject {
                secret: "db".into(),
                project: "prod".into()
            }
            .to_string(),
            "Bitwarden secret \"db\" not found in project prod"
        );
        assert_eq!(
            SyncError::from(ResolutionError::NoSource).to_string(),
            "No secret or value in configuration"
        );
    }

    #[test]
    fn test_domain_error_classification() {
        let domain: anyhow::Error = SyncError::AccessTokenMissing("token".into()).into();
        assert!(is_domain_error(&domain));

        let resolution: anyhow::Error = ResolutionError::NoSource.into();
        assert!(is_domain_error(&resolution));

        let unexpected = anyhow::anyhow!("connection reset");
        assert!(!is_domain_error(&unexpected));
    }
}
