//! Resource polling on top of a [`ClusterApi`].
//!
//! The poller turns kind tags from documents into typed list calls, retries predicates on a
//! fixed interval, and implements the bulk teardown used by restart.

use std::{future::Future, sync::Arc, time::Duration};

use chiron_cluster::{ClusterApi, ClusterError};
use chiron_types::{ResourceKind, UnsupportedKind};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Kinds removed by [`ResourcePoller::teardown_all`]. Pods and replica sets follow their
/// deployments.
pub const TEARDOWN_KINDS: [ResourceKind; 4] = [
    ResourceKind::Deployment,
    ResourceKind::Service,
    ResourceKind::ConfigMap,
    ResourceKind::Secret,
];

/// A name matcher for resources the cluster itself owns.
#[derive(Debug, Clone, Copy)]
enum ProtectedName {
    Exact(&'static str),
    Prefix(&'static str),
}

impl ProtectedName {
    fn matches(&self, name: &str) -> bool {
        match self {
            ProtectedName::Exact(exact) => name == *exact,
            ProtectedName::Prefix(prefix) => name.starts_with(prefix),
        }
    }
}

const PROTECTED: [(ResourceKind, ProtectedName); 3] = [
    (ResourceKind::Service, ProtectedName::Exact("kubernetes")),
    (ResourceKind::ConfigMap, ProtectedName::Exact("kube-root-ca.crt")),
    (ResourceKind::Secret, ProtectedName::Prefix("default-token-")),
];

/// True when teardown must leave the resource alone.
pub fn is_protected(kind: ResourceKind, name: &str) -> bool {
    PROTECTED
        .iter()
        .any(|(protected_kind, protected)| *protected_kind == kind && protected.matches(name))
}

/// Failure to obtain a resource listing.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    UnsupportedKind(#[from] UnsupportedKind),
    #[error("failed to list {kind} in namespace '{namespace}': {source}")]
    Cluster {
        kind: ResourceKind,
        namespace: String,
        #[source]
        source: ClusterError,
    },
}

/// Failure while removing managed resources.
#[derive(Debug, Error)]
pub enum TeardownError {
    #[error("failed to list {kind} in namespace '{namespace}' for teardown: {source}")]
    List {
        kind: ResourceKind,
        namespace: String,
        #[source]
        source: ClusterError,
    },
    #[error("failed to delete {kind} '{name}' in namespace '{namespace}': {source}")]
    Delete {
        kind: ResourceKind,
        name: String,
        namespace: String,
        #[source]
        source: ClusterError,
    },
}

/// Lists, waits on and tears down cluster resources.
#[derive(Clone)]
pub struct ResourcePoller {
    cluster: Arc<dyn ClusterApi>,
    poll_interval: Duration,
}

impl ResourcePoller {
    pub fn new(cluster: Arc<dyn ClusterApi>, poll_interval: Duration) -> Self {
        Self { cluster, poll_interval }
    }

    /// Names of every resource of the kind tagged `kind` in `namespace`.
    ///
    /// Kinds outside the supported set fail with [`LookupError::UnsupportedKind`]; transport
    /// failures fail with [`LookupError::Cluster`] so they are never mistaken for an empty
    /// listing.
    pub async fn get_by_kind(&self, kind: &str, namespace: &str) -> Result<Vec<String>, LookupError> {
        let kind: ResourceKind = kind.parse()?;
        self.list(kind, namespace).await
    }

    /// Typed variant of [`ResourcePoller::get_by_kind`].
    pub async fn list(&self, kind: ResourceKind, namespace: &str) -> Result<Vec<String>, LookupError> {
        self.cluster.list(kind, namespace).await.map_err(|source| {
            warn!(%kind, %namespace, error = %source, "resource lookup failed");
            LookupError::Cluster {
                kind,
                namespace: namespace.to_string(),
                source,
            }
        })
    }

    /// Re-evaluates `predicate` every poll interval until it returns true.
    ///
    /// There is no timeout; callers that need one wrap the returned future.
    pub async fn wait_until_satisfied<F, Fut>(&self, mut predicate: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let mut attempts = 0u64;
        loop {
            attempts += 1;
            if predicate().await {
                debug!(attempts, "poll predicate satisfied");
                return;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Deletes every deployment, service, config map and secret in `namespace` except the
    /// cluster-owned ones. Returns the number of delete calls issued.
    pub async fn teardown_all(&self, namespace: &str) -> Result<usize, TeardownError> {
        let mut deleted = 0usize;
        for kind in TEARDOWN_KINDS {
            let names = self
                .cluster
                .list(kind, namespace)
                .await
                .map_err(|source| TeardownError::List {
                    kind,
                    namespace: namespace.to_string(),
                    source,
                })?;

            for name in names.into_iter().filter(|name| !is_protected(kind, name)) {
                self.cluster
                    .delete(kind, &name, namespace)
                    .await
                    .map_err(|source| TeardownError::Delete {
                        kind,
                        name: name.clone(),
                        namespace: namespace.to_string(),
                        source,
                    })?;
                debug!(%kind, %name, %namespace, "resource deleted");
                deleted += 1;
            }
        }
        info!(%namespace, deleted, "teardown issued");
        Ok(deleted)
    }

    /// Blocks until no pods remain in `namespace`. Failed lookups count as "not yet clear".
    pub async fn wait_until_clear(&self, namespace: &str) {
        self.wait_until_satisfied(|| async move {
            match self.list(ResourceKind::Pod, namespace).await {
                Ok(pods) => {
                    debug!(%namespace, remaining = pods.len(), "waiting for pods to terminate");
                    pods.is_empty()
                }
                Err(_) => false,
            }
        })
        .await;
        info!(%namespace, "namespace clear");
    }
}
