//! Progress of one commit's rollout.

use std::fmt;

use crate::manifest::ManifestObject;

pub const DONE_ICON: &str = "![done](https://material.io/tools/icons/static/icons/twotone-done-24px.svg)";
pub const IN_PROGRESS_ICON: &str =
    "![inprogress](https://material.io/tools/icons/static/icons/twotone-cached-24px.svg)";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Pending,
    InProgress,
    Complete,
}

impl Phase {
    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Phase::Pending => "",
            Phase::InProgress => IN_PROGRESS_ICON,
            Phase::Complete => DONE_ICON,
        }
    }

    #[must_use]
    pub fn is_complete(self) -> bool {
        self == Phase::Complete
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Pending => "Pending",
            Phase::InProgress => "In Progress",
            Phase::Complete => "Complete",
        })
    }
}

/// The objects rendered from one target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rollout {
    pub path: String,
    pub phase: Phase,
    pub objects: Vec<ManifestObject>,
}

impl Rollout {
    #[must_use]
    pub fn new(path: impl Into<String>, objects: Vec<ManifestObject>) -> Self {
        Self {
            path: path.into(),
            phase: Phase::Pending,
            objects,
        }
    }

    #[must_use]
    pub fn all_done(&self) -> bool {
        self.objects.iter().all(|object| object.done)
    }
}

/// All rollouts of one run; rendered into the progress comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutSet {
    pub name: String,
    pub phase: Phase,
    pub rollouts: Vec<Rollout>,
}

impl RolloutSet {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phase: Phase::InProgress,
            rollouts: Vec::new(),
        }
    }

    /// Mark the set complete. Refused while any rollout is unfinished.
    pub fn mark_complete(&mut self) -> bool {
        if self.rollouts.iter().all(|rollout| rollout.phase.is_complete()) {
            self.phase = Phase::Complete;
            true
        } else {
            false
        }
    }
}
