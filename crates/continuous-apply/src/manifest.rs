//! Rendered manifests and the external tools that produce and apply them.
//!
//! A render yields a YAML stream; every document becomes a
//! [`ManifestObject`] that keeps its apply output, current rollout status and
//! status history for the lifetime of one rollout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};
use crate::status::{NamespacedName, RolloutStatus};

/// Timestamp format of history lines, e.g. `02 Jan 06 15:04 UTC`.
const HISTORY_TIME_FORMAT: &str = "%d %b %y %H:%M UTC";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to parse manifest document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Manifest document has no {field}:\n{document}")]
    MissingField {
        field: &'static str,
        document: String,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeMeta {
    #[serde(default)]
    api_version: Option<String>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

/// One object of a rendered manifest and its progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestObject {
    /// The document exactly as rendered; this is what gets applied.
    pub raw: String,
    pub api_version: String,
    pub kind: String,
    pub name: NamespacedName,
    pub apply_status: String,
    pub rollout_status: String,
    pub history: Vec<String>,
    pub done: bool,
}

impl ManifestObject {
    /// Decode the identifying fields of one YAML document.
    pub fn decode(raw: &str) -> std::result::Result<Self, ManifestError> {
        let meta: TypeMeta = serde_yaml::from_str(raw)?;
        let metadata = meta.metadata.unwrap_or_default();

        let kind = meta
            .kind
            .filter(|kind| !kind.is_empty())
            .ok_or_else(|| ManifestError::MissingField {
                field: "kind",
                document: raw.to_string(),
            })?;
        let name = metadata
            .name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ManifestError::MissingField {
                field: "metadata.name",
                document: raw.to_string(),
            })?;
        let namespace = metadata
            .namespace
            .filter(|namespace| !namespace.is_empty())
            .unwrap_or_else(|| NamespacedName::DEFAULT_NAMESPACE.to_string());

        Ok(Self {
            raw: raw.to_string(),
            api_version: meta.api_version.unwrap_or_default(),
            kind,
            name: NamespacedName::new(namespace, name),
            apply_status: String::new(),
            rollout_status: String::new(),
            history: Vec::new(),
            done: false,
        })
    }

    /// `<Kind> <namespace>/<name>`
    #[must_use]
    pub fn display(&self) -> String {
        format!("{} {}", self.kind, self.name)
    }

    /// Record a status observation. A new message is appended to the history,
    /// except for kinds without rollout semantics; returns whether the message
    /// changed.
    pub fn observe(&mut self, status: &RolloutStatus, at: DateTime<Utc>) -> bool {
        self.done = status.done;
        let message = status.message.trim();
        if self.rollout_status == message {
            return false;
        }

        self.rollout_status = message.to_string();
        if status.is_not_applicable() {
            return true;
        }
        self.history.push(format!(
            "*{}* - `{}`",
            at.format(HISTORY_TIME_FORMAT),
            self.rollout_status
        ));
        true
    }

    /// Record a failed status lookup.
    pub fn observe_error(&mut self, error: &dyn std::fmt::Display) {
        self.rollout_status = format!("error: {error}");
    }
}

/// Split a rendered stream on lines consisting of `---`, dropping documents
/// that hold only whitespace or comments.
#[must_use]
pub fn split_documents(stream: &str) -> Vec<&str> {
    let mut documents = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in stream.split_inclusive('\n') {
        if line.trim_end_matches(['\n', '\r']) == "---" {
            documents.push(&stream[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    documents.push(&stream[start..]);

    documents
        .into_iter()
        .filter(|document| {
            document.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with('#')
            })
        })
        .collect()
}

/// Decode every document of a rendered stream, in order.
pub fn decode_stream(stream: &str) -> std::result::Result<Vec<ManifestObject>, ManifestError> {
    split_documents(stream)
        .into_iter()
        .map(ManifestObject::decode)
        .collect()
}

/// Combined output of an external tool and whether it exited cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

/// Turns a target path into a YAML stream.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, path: &str) -> Result<String>;
}

/// Applies one YAML document to the cluster.
///
/// A tool that ran but failed is reported through [`ToolOutput::success`] so
/// its output can still be recorded.
#[async_trait]
pub trait Applier: Send + Sync {
    async fn apply(&self, document: &str) -> Result<ToolOutput>;
}

/// `kustomize build <path>`, run inside the checkout.
#[derive(Debug, Clone)]
pub struct KustomizeRenderer {
    checkout: PathBuf,
}

impl KustomizeRenderer {
    #[must_use]
    pub fn new(checkout: impl Into<PathBuf>) -> Self {
        Self {
            checkout: checkout.into(),
        }
    }
}

#[async_trait]
impl Renderer for KustomizeRenderer {
    async fn render(&self, path: &str) -> Result<String> {
        debug!(%path, checkout = %self.checkout.display(), "Running kustomize build");

        let output = Command::new("kustomize")
            .args(["build", path])
            .current_dir(&self.checkout)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Err(Error::Render {
                path: path.to_string(),
                output: format!("{stdout}{stderr}").trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// `kubectl apply -f -` with the document on stdin.
#[derive(Debug, Clone, Default)]
pub struct KubectlApplier;

#[async_trait]
impl Applier for KubectlApplier {
    async fn apply(&self, document: &str) -> Result<ToolOutput> {
        let mut child = Command::new("kubectl")
            .args(["apply", "-f", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(document.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        Ok(ToolOutput {
            success: output.status.success(),
            output: combined.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const STREAM: &str = "\
apiVersion: v1
kind: Service
metadata:
  name: web
  namespace: shop
---
# generated by kustomize
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
";

    #[test]
    fn splits_on_separator_lines_only() {
        let documents = split_documents("a: 1\n---\nb: '---'\n---\n\n");
        assert_eq!(documents, vec!["a: 1\n", "b: '---'\n"]);
    }

    #[test]
    fn decodes_stream_in_order_skipping_comment_documents() {
        let objects = decode_stream(STREAM).unwrap();
        assert_eq!(objects.len(), 2);

        assert_eq!(objects[0].display(), "Service shop/web");
        assert_eq!(objects[1].api_version, "apps/v1");
        assert_eq!(objects[1].name, NamespacedName::new("default", "web"));
        assert!(objects[1].raw.starts_with("apiVersion: apps/v1"));
    }

    #[test]
    fn document_without_name_is_rejected() {
        let err = ManifestObject::decode("kind: ConfigMap\nmetadata: {}\n").unwrap_err();
        assert!(matches!(
            err,
            ManifestError::MissingField {
                field: "metadata.name",
                ..
            }
        ));
    }

    #[test]
    fn document_without_kind_is_rejected() {
        let err = ManifestObject::decode("metadata:\n  name: x\n").unwrap_err();
        assert!(matches!(err, ManifestError::MissingField { field: "kind", .. }));
    }

    #[test]
    fn observe_appends_history_only_on_change() {
        let mut object = ManifestObject::decode("kind: Deployment\nmetadata:\n  name: web\n").unwrap();
        let at = Utc.with_ymd_and_hms(2019, 1, 2, 15, 4, 0).unwrap();

        assert!(object.observe(&RolloutStatus::progressing("waiting\n"), at));
        assert!(!object.observe(&RolloutStatus::progressing("waiting"), at));
        assert!(object.observe(&RolloutStatus::complete("rolled out"), at));

        assert!(object.done);
        assert_eq!(
            object.history,
            vec![
                "*02 Jan 19 15:04 UTC* - `waiting`".to_string(),
                "*02 Jan 19 15:04 UTC* - `rolled out`".to_string(),
            ]
        );
    }

    #[test]
    fn not_applicable_status_leaves_no_history() {
        let mut object = ManifestObject::decode("kind: ConfigMap\nmetadata:\n  name: cfg\n").unwrap();

        assert!(object.observe(&RolloutStatus::not_applicable(), Utc::now()));
        assert!(object.done);
        assert_eq!(object.rollout_status, "NA");
        assert!(object.history.is_empty());
    }

    #[test]
    fn observe_error_keeps_history() {
        let mut object = ManifestObject::decode("kind: Deployment\nmetadata:\n  name: web\n").unwrap();
        object.observe(&RolloutStatus::progressing("waiting"), Utc::now());
        object.observe_error(&"deployment \"default/web\" exceeded its progress deadline");

        assert_eq!(
            object.rollout_status,
            "error: deployment \"default/web\" exceeded its progress deadline"
        );
        assert_eq!(object.history.len(), 1);
    }
}
