use k8s_openapi::api::apps::v1::Deployment;

use super::{NamespacedName, RolloutStatus, StatusError};

/// Annotation carrying a Deployment's rollout revision.
pub const REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";

const PROGRESSING: &str = "Progressing";
const TIMED_OUT_REASON: &str = "ProgressDeadlineExceeded";

/// Revision recorded on the Deployment; absent means 0.
fn revision(deployment: &Deployment, name: &NamespacedName) -> Result<i64, StatusError> {
    let Some(value) = deployment
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(REVISION_ANNOTATION))
    else {
        return Ok(0);
    };

    value.parse().map_err(|e: std::num::ParseIntError| StatusError::InvalidRevision {
        name: name.name.clone(),
        reason: e.to_string(),
    })
}

pub(super) fn status(
    deployment: &Deployment,
    name: &NamespacedName,
    desired_revision: i64,
) -> Result<RolloutStatus, StatusError> {
    if desired_revision > 0 {
        let running = revision(deployment, name)?;
        if running != desired_revision {
            return Err(StatusError::RevisionMismatch {
                desired: desired_revision,
                running,
            });
        }
    }

    let generation = deployment.metadata.generation.unwrap_or_default();
    let status = deployment.status.clone().unwrap_or_default();

    if generation > status.observed_generation.unwrap_or_default() {
        return Ok(RolloutStatus::progressing(
            "Waiting for deployment spec update to be observed...",
        ));
    }

    let timed_out = status.conditions.iter().flatten().any(|condition| {
        condition.type_ == PROGRESSING && condition.reason.as_deref() == Some(TIMED_OUT_REASON)
    });
    if timed_out {
        return Err(StatusError::ProgressDeadlineExceeded(name.clone()));
    }

    let updated = status.updated_replicas.unwrap_or_default();
    let replicas = status.replicas.unwrap_or_default();
    let available = status.available_replicas.unwrap_or_default();

    if let Some(desired) = deployment.spec.as_ref().and_then(|spec| spec.replicas) {
        if updated < desired {
            return Ok(RolloutStatus::progressing(format!(
                "Waiting for deployment \"{name}\" rollout to finish: {updated} out of {desired} new replicas have been updated..."
            )));
        }
    }
    if replicas > updated {
        return Ok(RolloutStatus::progressing(format!(
            "Waiting for deployment \"{name}\" rollout to finish: {} old replicas are pending termination...",
            replicas - updated
        )));
    }
    if available < updated {
        return Ok(RolloutStatus::progressing(format!(
            "Waiting for deployment \"{name}\" rollout to finish: {available} of {updated} updated replicas are available..."
        )));
    }

    Ok(RolloutStatus::complete(format!(
        "deployment \"{name}\" successfully rolled out"
    )))
}
