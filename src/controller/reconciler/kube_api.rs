//! # Kubernetes API Seams
//!
//! Narrow traits over the cluster calls a sync pass makes, with their
//! kube-rs implementations.
//!
//! 404 is never an error at this layer: reads return `None`, writes that
//! lose the race against a delete return `None`/`false`. Other API statuses
//! surface as [`SyncError::Api`].

use crate::controller::error::SyncError;
use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{Api, ApiResource, DeleteParams, DynamicObject, Patch, PatchParams, PostParams},
    Client,
};
use serde_json::Value;

/// Secret operations used by the managed-secret reconciler
#[async_trait]
pub trait SecretApi: Send + Sync {
    /// Read a Secret, `None` when absent
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// Create a Secret
    async fn create(&self, namespace: &str, secret: &Secret) -> Result<Secret>;

    /// Replace a Secret, `None` when it vanished
    async fn replace(&self, namespace: &str, name: &str, secret: &Secret) -> Result<Option<Secret>>;

    /// JSON merge patch a Secret, `None` when it vanished
    async fn patch(&self, namespace: &str, name: &str, patch: &Value) -> Result<Option<Secret>>;

    /// Delete a Secret, `false` when it was already gone
    async fn delete(&self, namespace: &str, name: &str) -> Result<bool>;
}

/// Status sub-resource of a custom resource kind
#[async_trait]
pub trait StatusApi: Send + Sync {
    /// JSON merge patch the status, returning the updated object
    async fn merge_patch_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<Value>;
}

/// Object metadata of a custom resource kind (finalizers)
#[async_trait]
pub trait MetadataApi: Send + Sync {
    /// JSON merge patch the object, tolerating a vanished object
    async fn merge_patch_metadata(&self, namespace: &str, name: &str, patch: &Value) -> Result<()>;
}

/// True for an API error with status 404
fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == 404)
}

/// `SecretApi` backed by a kube client
#[derive(Clone)]
pub struct KubeSecretApi {
    client: Client,
}

impl std::fmt::Debug for KubeSecretApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretApi").finish_non_exhaustive()
    }
}

impl KubeSecretApi {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl SecretApi for KubeSecretApi {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        self.api(namespace)
            .get_opt(name)
            .await
            .map_err(SyncError::from_kube)
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        self.api(namespace)
            .create(&PostParams::default(), secret)
            .await
            .map_err(SyncError::from_kube)
    }

    async fn replace(
        &self,
        namespace: &str,
        name: &str,
        secret: &Secret,
    ) -> Result<Option<Secret>> {
        match self
            .api(namespace)
            .replace(name, &PostParams::default(), secret)
            .await
        {
            Ok(updated) => Ok(Some(updated)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(SyncError::from_kube(e)),
        }
    }

    async fn patch(&self, namespace: &str, name: &str, patch: &Value) -> Result<Option<Secret>> {
        match self
            .api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
        {
            Ok(updated) => Ok(Some(updated)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(SyncError::from_kube(e)),
        }
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        match self
            .api(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(SyncError::from_kube(e)),
        }
    }
}

/// Custom resource access through a runtime-configured API group
///
/// The group and version come from `OPERATOR_DOMAIN`/`OPERATOR_VERSION`, so
/// objects are handled as `DynamicObject` and converted to the typed structs
/// by the caller.
#[derive(Clone)]
pub struct KubeResourceApi {
    client: Client,
    resource: ApiResource,
}

impl std::fmt::Debug for KubeResourceApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeResourceApi")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl KubeResourceApi {
    #[must_use]
    pub fn new(client: Client, resource: ApiResource) -> Self {
        Self { client, resource }
    }

    /// Watch/list handle across all namespaces
    #[must_use]
    pub fn all(&self) -> Api<DynamicObject> {
        Api::all_with(self.client.clone(), &self.resource)
    }

    fn namespaced(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }
}

#[async_trait]
impl MetadataApi for KubeResourceApi {
    async fn merge_patch_metadata(&self, namespace: &str, name: &str, patch: &Value) -> Result<()> {
        match self
            .namespaced(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(SyncError::from_kube(e)),
        }
    }
}

#[async_trait]
impl StatusApi for KubeResourceApi {
    async fn merge_patch_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<Value> {
        let updated = self
            .namespaced(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(SyncError::from_kube)?;
        Ok(serde_json::to_value(updated)?)
    }
}

/// `ApiResource` of a custom resource kind under a configured group/version
#[must_use]
pub fn api_resource(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
    ApiResource {
        group: group.to_string(),
        version: version.to_string(),
        api_version: format!("{group}/{version}"),
        kind: kind.to_string(),
        plural: plural.to_string(),
    }
}
