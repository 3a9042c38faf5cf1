//! buildsync CLI - reload a project's build model and synchronize it into the
//! workspace.

mod config;
mod render;

use anyhow::{bail, Result};
use buildsync_core::{FetchStrategy, JobFamily, ProjectIdentity};
use buildsync_execution::{
    ExclusiveRegion, InMemoryJobManager, Job, JobManager, JobServices, JobState,
    SynchronizationJob,
};
use buildsync_model::{
    CachingModelRepository, CancellationToken, DirectoryModelLoader, ModelFetchPort,
    NoopInitializer, ProcessStreams, StdioStreamsProvider, TransientInvocationContext,
};
use buildsync_workspace::{Workspace, WorkspaceSynchronizer};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;
use crate::render::StderrProgress;

#[derive(Parser)]
#[command(name = "buildsync")]
#[command(about = "Reload build models and synchronize them into the workspace", long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Force-reload a project and synchronize it into the workspace
    Refresh {
        /// Project root directory
        dir: PathBuf,
        /// Working set to add synchronized projects to (repeatable)
        #[arg(long = "working-set")]
        working_sets: Vec<String>,
        /// Give up waiting after this many seconds
        #[arg(long, default_value = "3600")]
        timeout: u64,
    },
    /// Load and print a project's build model
    Model {
        /// Project root directory
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = CliConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Refresh {
            dir,
            working_sets,
            timeout,
        } => refresh(&dir, working_sets, Duration::from_secs(timeout), config).await,
        Commands::Model { dir } => print_model(&dir, config).await,
    }
}

fn identity_for(dir: &Path) -> Result<ProjectIdentity> {
    let absolute = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(dir)
    };
    Ok(ProjectIdentity::new(absolute)?)
}

async fn refresh(
    dir: &Path,
    working_sets: Vec<String>,
    timeout: Duration,
    config: CliConfig,
) -> Result<()> {
    let identity = identity_for(dir)?;
    let workspace = Workspace::new().into_shared();

    let services = JobServices::new(
        Arc::new(CachingModelRepository::new(DirectoryModelLoader::new(
            config.loader.clone(),
        ))),
        Arc::new(WorkspaceSynchronizer::new(workspace.clone())),
        Arc::new(ExclusiveRegion::new()),
    )
    .with_streams(Arc::new(StdioStreamsProvider));

    let job = Arc::new(
        SynchronizationJob::new(identity, &working_sets, Arc::new(NoopInitializer), services)
            .with_config(config.job)?,
    );

    let observer = Arc::new(StderrProgress::new());
    let manager = Arc::new(InMemoryJobManager::new().with_observer(observer));
    let job_id = manager.schedule(job.clone()).await;
    info!("Scheduled {} ({})", job_id, job.name());

    {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let count = manager.cancel_family(&JobFamily::ProjectRefresh).await;
                warn!("Interrupted, cancelling {} job(s)", count);
            }
        });
    }

    let Some(status) = manager.wait_for_completion(&job_id, timeout).await else {
        bail!("job {} disappeared", job_id);
    };

    match status.state {
        JobState::Completed => {
            if let Some(report) = job.last_report() {
                println!(
                    "Synchronized: {} added, {} updated, {} removed",
                    report.added.len(),
                    report.updated.len(),
                    report.removed.len()
                );
            }
            let workspace = workspace.lock().await;
            println!("Workspace ({} projects)", workspace.len());
            for project in workspace.projects() {
                let sets: Vec<_> = project.working_sets.iter().map(String::as_str).collect();
                println!(
                    "  {} | {} | [{}]",
                    project.name,
                    project.location.display(),
                    sets.join(", ")
                );
            }
            Ok(())
        }
        JobState::Cancelled => {
            println!("Cancelled refresh of {}", job.identity());
            Ok(())
        }
        JobState::Failed => bail!(
            "{}",
            status.error.unwrap_or_else(|| "job failed".to_string())
        ),
        state => {
            manager.cancel(&job_id).await.ok();
            bail!("timed out after {}s with job {}", timeout.as_secs(), state)
        }
    }
}

async fn print_model(dir: &Path, config: CliConfig) -> Result<()> {
    let identity = identity_for(dir)?;
    let repository = CachingModelRepository::new(DirectoryModelLoader::new(config.loader));
    let ctx = TransientInvocationContext::new(ProcessStreams::null(), CancellationToken::new());

    let model = repository
        .fetch(&identity, ctx, FetchStrategy::CachedElseFetch)
        .await?;

    println!("Build model for {}", model.root_dir.display());
    for project in &model.projects {
        match &project.parent {
            Some(parent) => println!(
                "  {} ({}) <- {}",
                project.name,
                project.path.display(),
                parent
            ),
            None => println!("  {} ({})", project.name, project.path.display()),
        }
    }
    Ok(())
}
