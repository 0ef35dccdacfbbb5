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

//! continuous-apply - rolls merged changes out to a cluster and reports on
//! GitHub issues.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use continuous_apply::config::GitActions;
use continuous_apply::telemetry::{init_tracing, LogFormat};
use continuous_apply::{
    ApplyOrchestrator, ApplySettings, Clock, ContinuousApply, GitRepository,
    IssueStatusAggregator, KubeAccessor, KubectlApplier, KustomizeRenderer, ManagerConfig,
    MatchCriteria, Repository, RolloutPolicy, SourceSync, StatusEngine, SyncMode, SystemClock,
};
use scm::{GitHubClient, IssueState, IssueTracker, RepoRef};

/// continuous-apply - GitOps rollout engine.
#[derive(Parser)]
#[command(name = "continuous-apply")]
#[command(about = "Apply merged changes to Kubernetes and report progress on GitHub issues")]
#[command(version)]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch for new commits and roll each one out.
    ApplyIssues(Box<ApplyArgs>),

    /// Maintain one tracking issue per merged pull request.
    ManageIssues(ManageArgs),
}

#[derive(Args)]
struct ApplyArgs {
    /// Owner of the source repository.
    #[arg(long)]
    owner: String,

    /// Name of the source repository.
    #[arg(long)]
    repo: String,

    /// Rollout name, used to find the progress comment.
    #[arg(long)]
    name: String,

    /// Login the engine acts as.
    #[arg(long, default_value = "")]
    user: String,

    /// Paths to render, relative to the checkout.
    #[arg(long, value_delimiter = ',', default_value = "./")]
    apply_targets: Vec<String>,

    /// How new commits are discovered.
    #[arg(long, value_enum, default_value_t = SyncMode::Issue)]
    sync_type: SyncMode,

    /// Order of apply and poll across targets.
    #[arg(long, value_enum, default_value_t = RolloutPolicy::Sequential)]
    rollout_type: RolloutPolicy,

    #[arg(long, value_delimiter = ',')]
    match_labels: Vec<String>,

    #[arg(long, default_value = "")]
    match_assignee: String,

    #[arg(long, default_value = "")]
    match_state: String,

    #[arg(long, default_value = "")]
    match_milestone: String,

    #[arg(long, value_delimiter = ',')]
    before_add_labels: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    before_remove_labels: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    before_add_assignees: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    before_remove_assignees: Vec<String>,

    #[arg(long)]
    before_set_state: Option<IssueState>,

    #[arg(long, value_delimiter = ',')]
    after_add_labels: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    after_remove_labels: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    after_add_assignees: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    after_remove_assignees: Vec<String>,

    #[arg(long)]
    after_set_state: Option<IssueState>,

    /// Seconds between rollout status checks.
    #[arg(long, default_value_t = 1)]
    pause: u64,

    /// Seconds between sync attempts.
    #[arg(long, default_value_t = 30)]
    interval: u64,

    /// Branch whose merge log is scanned.
    #[arg(long, default_value = "master")]
    branch: String,

    /// Directory the repository is cloned into.
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// GitHub access token.
    #[arg(long, env = "GIT_ACCESS_TOKEN", hide_env_values = true)]
    token: String,
}

impl ApplyArgs {
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("must define --name");
        }
        if self.owner.is_empty() {
            bail!("must define --owner");
        }
        if self.repo.is_empty() {
            bail!("must define --repo");
        }
        if self.token.is_empty() {
            bail!("must define GIT_ACCESS_TOKEN environment variable");
        }
        Ok(())
    }

    fn criteria(&self) -> MatchCriteria {
        MatchCriteria {
            labels: self.match_labels.clone(),
            assignee: self.match_assignee.clone(),
            milestone: self.match_milestone.clone(),
            state: self.match_state.clone(),
        }
    }

    fn settings(&self) -> ApplySettings {
        ApplySettings {
            name: self.name.clone(),
            user: self.user.clone(),
            targets: self.apply_targets.clone(),
            policy: self.rollout_type,
            pause: Duration::from_secs(self.pause),
            before: GitActions {
                add_labels: self.before_add_labels.clone(),
                add_assignees: self.before_add_assignees.clone(),
                remove_labels: self.before_remove_labels.clone(),
                remove_assignees: self.before_remove_assignees.clone(),
                set_state: self.before_set_state,
            },
            after: GitActions {
                add_labels: self.after_add_labels.clone(),
                add_assignees: self.after_add_assignees.clone(),
                remove_labels: self.after_remove_labels.clone(),
                remove_assignees: self.after_remove_assignees.clone(),
                set_state: self.after_set_state,
            },
        }
    }
}

#[derive(Args)]
struct ManageArgs {
    /// Config file; defaults to the system then the per-user location.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory the repository is cloned into.
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// GitHub access token.
    #[arg(long, env = "CONTINUOUSAPPLY_ACCESSTOKEN", hide_env_values = true)]
    token: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Starting continuous-apply v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::ApplyIssues(args) => apply_issues(*args).await,
        Commands::ManageIssues(args) => manage_issues(args).await,
    }
}

async fn apply_issues(args: ApplyArgs) -> Result<()> {
    args.validate()?;

    let repo_ref = RepoRef::new(&args.owner, &args.repo);
    let tracker: Arc<dyn IssueTracker> = Arc::new(
        GitHubClient::new(&args.token, repo_ref.clone()).context("Failed to create GitHub client")?,
    );
    let git = GitRepository::new(repo_ref, &args.token, &args.workdir);
    let renderer = Arc::new(KustomizeRenderer::new(git.checkout_dir()));
    let repo: Arc<dyn Repository> = Arc::new(git);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let status = StatusEngine::new(Arc::new(KubeAccessor::new(client)));

    let sync = SourceSync::new(
        Arc::clone(&tracker),
        Arc::clone(&repo),
        args.sync_type,
        args.criteria(),
    )
    .with_branch(args.branch.clone());

    let orchestrator = ApplyOrchestrator::new(
        args.settings(),
        tracker,
        Arc::clone(&repo),
        renderer,
        Arc::new(KubectlApplier),
        status,
        Arc::clone(&clock),
    )
    .context("Failed to set up rollout")?;

    info!(
        repo = %args.repo,
        owner = %args.owner,
        name = %args.name,
        sync_type = ?args.sync_type,
        rollout_type = ?args.rollout_type,
        "Applying issues"
    );

    let mut service = ContinuousApply::new(
        sync,
        orchestrator,
        repo,
        clock,
        Duration::from_secs(args.interval),
    );
    service.run().await.context("Continuous apply stopped")
}

async fn manage_issues(args: ManageArgs) -> Result<()> {
    let config = ManagerConfig::load(args.config.as_deref()).context("Failed to load config")?;
    config.validate().context("Invalid config")?;

    if args.token.is_empty() {
        bail!("must define CONTINUOUSAPPLY_ACCESSTOKEN environment variable");
    }

    let tracker: Arc<dyn IssueTracker> = Arc::new(
        GitHubClient::new(&args.token, config.repo.clone())
            .context("Failed to create GitHub client")?,
    );
    let repo: Arc<dyn Repository> = Arc::new(GitRepository::new(
        config.repo.clone(),
        &args.token,
        &args.workdir,
    ));

    let mut aggregator = IssueStatusAggregator::new(config, tracker, repo, Arc::new(SystemClock))
        .context("Failed to set up issue manager")?;
    aggregator.run().await.context("Issue manager stopped")
}
