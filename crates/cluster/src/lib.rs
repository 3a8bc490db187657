//! Cluster resource API client.
//!
//! The tutorial engine only needs three things from the cluster: the names of resources of
//! a given kind, the ability to delete them, and a way to apply authored manifests. Those
//! operations are captured by [`ClusterApi`] so the engine can be exercised against fakes;
//! [`KubeClusterApi`] is the production implementation backed by `kube`.

use std::fmt::Debug;

use async_trait::async_trait;
use chiron_types::ResourceKind;
use k8s_openapi::{
    NamespaceResourceScope,
    api::{
        apps::v1::{Deployment, ReplicaSet},
        core::v1::{ConfigMap, Pod, Secret, Service},
    },
};
use kube::{
    Client, Resource,
    api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams},
    core::GroupVersionKind,
    discovery::{self, Scope},
};
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, info};

/// Field manager recorded on objects applied by the tutorial player.
pub const FIELD_MANAGER: &str = "chiron";

/// Errors surfaced by cluster operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Transport, authentication or API server failure.
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    /// The manifest is not valid YAML or does not describe a Kubernetes object.
    #[error("invalid manifest: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// The manifest parsed but is missing data needed to apply it.
    #[error("invalid manifest: {0}")]
    Manifest(String),
}

/// Operations the engine performs against the cluster.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Returns the names of every `kind` resource in `namespace`.
    async fn list(&self, kind: ResourceKind, namespace: &str) -> Result<Vec<String>, ClusterError>;

    /// Deletes a single resource. Deleting a resource that is already gone succeeds.
    async fn delete(&self, kind: ResourceKind, name: &str, namespace: &str) -> Result<(), ClusterError>;

    /// Applies every object in a (possibly multi-document) YAML manifest.
    ///
    /// Namespaced objects without their own namespace land in `namespace`.
    async fn apply(&self, manifest: &str, namespace: &str) -> Result<(), ClusterError>;
}

/// [`ClusterApi`] implementation talking to a live API server.
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects using in-cluster configuration, falling back to the local kubeconfig.
    pub async fn try_default() -> Result<Self, ClusterError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    async fn list_names<K>(&self, namespace: &str) -> Result<Vec<String>, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.iter().filter_map(|item| item.meta().name.clone()).collect())
    }

    async fn delete_named<K>(&self, name: &str, namespace: &str) -> Result<(), ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                debug!(%name, %namespace, "resource already deleted");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list(&self, kind: ResourceKind, namespace: &str) -> Result<Vec<String>, ClusterError> {
        match kind {
            ResourceKind::Pod => self.list_names::<Pod>(namespace).await,
            ResourceKind::Deployment => self.list_names::<Deployment>(namespace).await,
            ResourceKind::Service => self.list_names::<Service>(namespace).await,
            ResourceKind::ConfigMap => self.list_names::<ConfigMap>(namespace).await,
            ResourceKind::Secret => self.list_names::<Secret>(namespace).await,
            ResourceKind::ReplicaSet => self.list_names::<ReplicaSet>(namespace).await,
        }
    }

    async fn delete(&self, kind: ResourceKind, name: &str, namespace: &str) -> Result<(), ClusterError> {
        match kind {
            ResourceKind::Pod => self.delete_named::<Pod>(name, namespace).await,
            ResourceKind::Deployment => self.delete_named::<Deployment>(name, namespace).await,
            ResourceKind::Service => self.delete_named::<Service>(name, namespace).await,
            ResourceKind::ConfigMap => self.delete_named::<ConfigMap>(name, namespace).await,
            ResourceKind::Secret => self.delete_named::<Secret>(name, namespace).await,
            ResourceKind::ReplicaSet => self.delete_named::<ReplicaSet>(name, namespace).await,
        }
    }

    async fn apply(&self, manifest: &str, namespace: &str) -> Result<(), ClusterError> {
        for object in parse_manifest_objects(manifest)? {
            let types = object
                .types
                .as_ref()
                .ok_or_else(|| ClusterError::Manifest("object is missing apiVersion/kind".into()))?;
            let gvk = GroupVersionKind::try_from(types).map_err(|error| ClusterError::Manifest(error.to_string()))?;
            let name = object
                .metadata
                .name
                .clone()
                .ok_or_else(|| ClusterError::Manifest(format!("{} object is missing metadata.name", gvk.kind)))?;

            let (resource, capabilities) = discovery::pinned_kind(&self.client, &gvk).await?;
            let api: Api<DynamicObject> = if capabilities.scope == Scope::Namespaced {
                let target_namespace = object.metadata.namespace.as_deref().unwrap_or(namespace);
                Api::namespaced_with(self.client.clone(), target_namespace, &resource)
            } else {
                Api::all_with(self.client.clone(), &resource)
            };

            api.patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&object))
                .await?;

            info!(kind = %gvk.kind, %name, "applied manifest object");
        }
        Ok(())
    }
}

/// Splits a YAML manifest into the objects it declares, skipping empty documents.
pub fn parse_manifest_objects(manifest: &str) -> Result<Vec<DynamicObject>, ClusterError> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(manifest) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        objects.push(serde_yaml::from_value::<DynamicObject>(value)?);
    }
    Ok(objects)
}
