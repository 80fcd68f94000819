use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

use tasksync::backlog::{
  CachedBacklogClient, ItemType, ProjectHierarchy, WorkItem, WorkItemFilter,
};
use tasksync::config::Config;
use tasksync::jobs::Job;
use tasksync::logging;

#[derive(Parser, Debug)]
#[command(name = "tasksync")]
#[command(about = "Track backlog generation jobs and browse project work items")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tasksync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print a project's work items as a tree
  Items {
    project: String,
    /// Only fetch items of this type (epic, story, task, subtask)
    #[arg(short = 't', long = "type")]
    item_type: Option<ItemType>,
    /// Bypass the cache
    #[arg(short, long)]
    refresh: bool,
  },
  /// Print aggregate counts for a project
  Stats { project: String },
  /// Follow the generation job of an uploaded file until it settles
  Watch { file_id: String },
  /// Index an uploaded document, retrying on failure
  Index { project: String, file_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Logging is best effort; the command still runs without it
  let _guard = match logging::init() {
    Ok(guard) => Some(guard),
    Err(e) => {
      eprintln!("warning: {}", e);
      None
    }
  };

  let config = Config::load(args.config.as_deref())?;
  let backlog = CachedBacklogClient::new(&config)?;

  match args.command {
    Command::Items {
      project,
      item_type,
      refresh,
    } => {
      let filter = WorkItemFilter { item_type };
      let result = backlog
        .project_hierarchy_or_stale(&project, &filter, refresh)
        .await?;
      if result.is_stale() {
        eprintln!(
          "warning: backend unreachable, showing data from {}",
          result.cached_at.format("%Y-%m-%d %H:%M:%S")
        );
      }
      print_hierarchy(&result.data);
    }
    Command::Stats { project } => {
      let stats = backlog.stats(&project).await?;
      println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Command::Watch { file_id } => {
      let mut updates = backlog.job_updates(&file_id);
      let mut last = None;
      while let Some(job) = updates.recv().await {
        println!("{}", describe_job(&job));
        last = Some(job);
      }
      match last {
        Some(job) => job.outcome(config.polling.max_attempts)?,
        None => return Err(eyre!("polling stopped before any status arrived")),
      }
    }
    Command::Index { project, file_id } => {
      let message = backlog
        .index_document(&project, &file_id, |event| eprintln!("{}", event))
        .await?;
      println!("{}", message);
    }
  }

  Ok(())
}

fn describe_job(job: &Job) -> String {
  if job.is_timeout() {
    return format!("{}: gave up waiting for the job to finish", job.file_id);
  }
  match (job.progress(), job.error_message()) {
    (_, Some(error)) => format!("{}: {} ({})", job.file_id, job.status, error),
    (Some(progress), None) => format!("{}: {} {}%", job.file_id, job.status, progress),
    (None, None) => format!("{}: {}", job.file_id, job.status),
  }
}

fn print_hierarchy(hierarchy: &ProjectHierarchy) {
  for root in hierarchy.roots() {
    print_subtree(hierarchy, root, 0);
  }
  if !hierarchy.orphans().is_empty() {
    println!("\nWith missing parent:");
    for item in hierarchy.orphans() {
      print_subtree(hierarchy, item, 1);
    }
  }
  if !hierarchy.unparented().is_empty() {
    println!("\nWithout parent:");
    for item in hierarchy.unparented() {
      print_subtree(hierarchy, item, 1);
    }
  }
}

fn print_subtree(hierarchy: &ProjectHierarchy, item: &WorkItem, depth: usize) {
  println!(
    "{}[{}] {} ({}, {})",
    "  ".repeat(depth),
    item.item_type,
    item.title,
    item.status,
    item.priority
  );
  for child in hierarchy.children_of(&item.id) {
    print_subtree(hierarchy, child, depth + 1);
  }
}
