/*
 * continuous-apply - GitOps rollout engine for Kubernetes
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Continuous rollout engine core library
//!
//! Watches a GitHub repository for merged pull requests (or tracking issues
//! that reference one), renders and applies the manifests at the matching
//! commit, and follows every workload until it has converged. Progress is
//! published as a single, continuously edited comment on the issue.
//!
//! The four moving parts:
//!
//! - [`sync::SourceSync`] decides whether there is a new commit to roll out
//! - [`status::StatusEngine`] decides whether a workload has converged
//! - [`apply::ApplyOrchestrator`] drives render, apply, poll and report
//! - [`issues::IssueStatusAggregator`] rolls label-driven reporters up into
//!   one tracking issue per commit

pub mod actions;
pub mod apply;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod error;
pub mod git;
pub mod issues;
pub mod manifest;
pub mod markers;
pub mod report;
pub mod rollout;
pub mod service;
pub mod status;
pub mod sync;
pub mod telemetry;

pub use apply::ApplyOrchestrator;
pub use clock::{Clock, PollState, SystemClock};
pub use cluster::{ClusterAccessor, KubeAccessor};
pub use config::{ApplySettings, ManagerConfig, MatchCriteria, RolloutPolicy, SyncMode};
pub use error::{Error, Result};
pub use git::{GitRepository, Repository};
pub use issues::IssueStatusAggregator;
pub use manifest::{Applier, KubectlApplier, KustomizeRenderer, Renderer};
pub use service::ContinuousApply;
pub use status::{NamespacedName, RolloutStatus, StatusEngine};
pub use sync::{SourceSync, TrackedState};
