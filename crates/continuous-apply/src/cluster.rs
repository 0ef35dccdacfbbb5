//! Read-only access to workload objects in the cluster.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use thiserror::Error;
use tracing::debug;

use crate::status::{NamespacedName, WorkloadKind};

#[derive(Debug, Error)]
pub enum AccessorError {
    #[error("{kind} {name} not found")]
    NotFound {
        kind: WorkloadKind,
        name: NamespacedName,
    },

    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("Failed to encode object: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Fetches a workload by kind and namespaced name, returning the `apps/v1`
/// object as JSON.
#[async_trait]
pub trait ClusterAccessor: Send + Sync {
    async fn get(&self, kind: WorkloadKind, name: &NamespacedName) -> Result<Value, AccessorError>;
}

/// [`ClusterAccessor`] backed by an authenticated kube client.
#[derive(Clone)]
pub struct KubeAccessor {
    client: Client,
}

impl KubeAccessor {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch<K>(&self, kind: WorkloadKind, name: &NamespacedName) -> Result<Value, AccessorError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned + Serialize,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), &name.namespace);
        match api.get_opt(&name.name).await? {
            Some(object) => Ok(serde_json::to_value(&object)?),
            None => {
                debug!(%kind, %name, "Workload not found");
                Err(AccessorError::NotFound {
                    kind,
                    name: name.clone(),
                })
            }
        }
    }
}

#[async_trait]
impl ClusterAccessor for KubeAccessor {
    async fn get(&self, kind: WorkloadKind, name: &NamespacedName) -> Result<Value, AccessorError> {
        match kind {
            WorkloadKind::Deployment => self.fetch::<Deployment>(kind, name).await,
            WorkloadKind::DaemonSet => self.fetch::<DaemonSet>(kind, name).await,
            WorkloadKind::StatefulSet => self.fetch::<StatefulSet>(kind, name).await,
        }
    }
}
