//! Rollout status of workloads.
//!
//! Each tracked workload kind has a pure convergence function mirroring the
//! cluster's own rollout semantics. [`StatusEngine`] looks the object up
//! through a [`ClusterAccessor`] and dispatches on [`WorkloadKind`]. Kinds
//! without a convergence notion report [`RolloutStatus::not_applicable`].

mod daemonset;
mod deployment;
mod statefulset;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::cluster::{AccessorError, ClusterAccessor};

pub use deployment::REVISION_ANNOTATION;

/// `namespace/name` of a cluster object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub const DEFAULT_NAMESPACE: &'static str = "default";

    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

const NOT_APPLICABLE: &str = "NA";

/// A progress line and whether the workload has converged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutStatus {
    pub message: String,
    pub done: bool,
}

impl RolloutStatus {
    pub(crate) fn progressing(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            done: false,
        }
    }

    pub(crate) fn complete(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            done: true,
        }
    }

    /// Objects without rollout semantics are converged as soon as they exist.
    #[must_use]
    pub fn not_applicable() -> Self {
        Self::complete(NOT_APPLICABLE)
    }

    #[must_use]
    pub fn is_not_applicable(&self) -> bool {
        self.done && self.message == NOT_APPLICABLE
    }
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("cannot get the revision of deployment \"{name}\": {reason}")]
    InvalidRevision { name: String, reason: String },

    #[error("desired revision ({desired}) is different from the running revision ({running})")]
    RevisionMismatch { desired: i64, running: i64 },

    #[error("deployment \"{0}\" exceeded its progress deadline")]
    ProgressDeadlineExceeded(NamespacedName),

    #[error("Status is available only for RollingUpdate strategy type")]
    DaemonSetStrategy,

    #[error("OnDelete updateStrategy does not have a Status")]
    OnDeleteStrategy,

    #[error("Failed to decode {kind}: {source}")]
    Decode {
        kind: WorkloadKind,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Lookup(#[from] AccessorError),
}

/// Workload kinds with a convergence algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    Deployment,
    DaemonSet,
    StatefulSet,
}

impl WorkloadKind {
    /// Map `apiVersion`/`kind` onto a tracked kind. Older API groups for the
    /// same workloads are served through `apps/v1` by the cluster.
    #[must_use]
    pub fn from_type_meta(api_version: &str, kind: &str) -> Option<Self> {
        match (kind, api_version) {
            (
                "Deployment",
                "apps/v1" | "apps/v1beta1" | "apps/v1beta2" | "extensions/v1beta1",
            ) => Some(WorkloadKind::Deployment),
            ("DaemonSet", "apps/v1" | "apps/v1beta2" | "extensions/v1beta1") => {
                Some(WorkloadKind::DaemonSet)
            }
            ("StatefulSet", "apps/v1" | "apps/v1beta1" | "apps/v1beta2") => {
                Some(WorkloadKind::StatefulSet)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::StatefulSet => "StatefulSet",
        }
    }

    /// Evaluate a decoded `apps/v1` object of this kind.
    pub fn evaluate(
        self,
        object: Value,
        name: &NamespacedName,
        revision: i64,
    ) -> Result<RolloutStatus, StatusError> {
        match self {
            WorkloadKind::Deployment => {
                deployment::status(&self.decode(object)?, name, revision)
            }
            // DaemonSets keep no revision history
            WorkloadKind::DaemonSet => daemonset::status(&self.decode(object)?, name),
            WorkloadKind::StatefulSet => statefulset::status(&self.decode(object)?),
        }
    }

    fn decode<T: DeserializeOwned>(self, object: Value) -> Result<T, StatusError> {
        serde_json::from_value(object).map_err(|source| StatusError::Decode { kind: self, source })
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Looks workloads up and evaluates their convergence.
#[derive(Clone)]
pub struct StatusEngine {
    accessor: Arc<dyn ClusterAccessor>,
}

impl StatusEngine {
    #[must_use]
    pub fn new(accessor: Arc<dyn ClusterAccessor>) -> Self {
        Self { accessor }
    }

    /// Current status of the object identified by `api_version`/`kind` and
    /// `name`. A `revision` of 0 skips the revision check.
    pub async fn status_for(
        &self,
        api_version: &str,
        kind: &str,
        name: &NamespacedName,
        revision: i64,
    ) -> Result<RolloutStatus, StatusError> {
        let Some(workload) = WorkloadKind::from_type_meta(api_version, kind) else {
            debug!(%kind, %api_version, "No rollout status for kind");
            return Ok(RolloutStatus::not_applicable());
        };

        let object = self.accessor.get(workload, name).await?;
        workload.evaluate(object, name, revision)
    }
}
