use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing_subscriber::EnvFilter;

use strata_cache::{CacheStore, FsCacheStore, InMemoryCacheStore, SqliteCacheStore};
use strata_config::{CacheBackend, Scope, Settings, StoreBackend};
use strata_store::{ExecutionClient, ExecutionRecord, SqliteExecutionStore};

/// Strata - a typed, cached workflow orchestrator
#[derive(Parser)]
#[command(name = "strata")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.strata)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Path to a JSON settings file
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Inspect recorded executions
  Execution {
    #[command(subcommand)]
    action: ExecutionAction,
  },

  /// Manage the task cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand)]
enum ExecutionAction {
  /// Show one execution
  Get {
    execution_id: String,

    /// Include per-node records
    #[arg(long)]
    details: bool,

    /// Print the raw record as JSON
    #[arg(long)]
    json: bool,
  },

  /// List executions, newest first
  List {
    /// Only executions in this project (requires --domain)
    #[arg(long, requires = "domain")]
    project: Option<String>,

    /// Only executions in this domain (requires --project)
    #[arg(long, requires = "project")]
    domain: Option<String>,
  },
}

#[derive(Subcommand)]
enum CacheAction {
  /// Remove every cached task result
  Clear,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let settings = match &cli.config {
    Some(path) => Settings::load(path)
      .with_context(|| format!("failed to load settings: {}", path.display()))?,
    None => Settings::default(),
  };

  let data_dir = match cli.data_dir.or_else(|| settings.data_dir.clone()) {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".strata"),
  };

  let Some(command) = cli.command else {
    println!("strata - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    match command {
      Commands::Execution { action } => run_execution(action, &settings, &data_dir).await,
      Commands::Cache { action } => match action {
        CacheAction::Clear => clear_cache(&settings, &data_dir).await,
      },
    }
  })
}

async fn open_pool(path: &Path) -> Result<SqlitePool> {
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create data directory: {}", parent.display()))?;
  }
  let options = SqliteConnectOptions::new()
    .filename(path)
    .create_if_missing(true);
  SqlitePoolOptions::new()
    .connect_with(options)
    .await
    .with_context(|| format!("failed to open database: {}", path.display()))
}

async fn execution_client(settings: &Settings, data_dir: &Path) -> Result<ExecutionClient> {
  if settings.store != StoreBackend::Sqlite {
    bail!("execution records are only persisted with the sqlite store backend");
  }
  let pool = open_pool(&data_dir.join("strata.db")).await?;
  let store = SqliteExecutionStore::new(pool);
  store
    .migrate()
    .await
    .context("failed to prepare execution store")?;
  Ok(ExecutionClient::new(Arc::new(store)))
}

async fn run_execution(action: ExecutionAction, settings: &Settings, data_dir: &Path) -> Result<()> {
  let client = execution_client(settings, data_dir).await?;

  match action {
    ExecutionAction::Get {
      execution_id,
      details,
      json,
    } => {
      let record = client
        .get_execution(&execution_id)
        .await
        .with_context(|| format!("failed to load execution '{execution_id}'"))?;
      if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
      } else {
        print_execution(&record, details)?;
      }
    }
    ExecutionAction::List { project, domain } => {
      let scope = project.zip(domain).map(|(p, d)| Scope::new(p, d));
      let records = client
        .list_executions(scope.as_ref())
        .await
        .context("failed to list executions")?;
      if records.is_empty() {
        eprintln!("No executions recorded");
      }
      for record in records {
        println!(
          "{}  {:<9}  {}@{}  {}  {}",
          record.execution_id,
          record.state.as_str(),
          record.workflow_name,
          record.workflow_version,
          record.scope,
          record.started_at.to_rfc3339(),
        );
      }
    }
  }

  Ok(())
}

fn print_execution(record: &ExecutionRecord, details: bool) -> Result<()> {
  println!("Execution: {}", record.execution_id);
  println!(
    "Workflow:  {}@{}",
    record.workflow_name, record.workflow_version
  );
  println!("Scope:     {}", record.scope);
  println!("State:     {}", record.state);
  println!("Started:   {}", record.started_at.to_rfc3339());
  if let Some(completed_at) = record.completed_at {
    println!("Completed: {}", completed_at.to_rfc3339());
  }
  if let Some(failure) = &record.failure {
    println!(
      "Failure:   node '{}': {}",
      failure.root_cause_node, failure.message
    );
    if !failure.skipped_nodes.is_empty() {
      println!("Skipped:   {}", failure.skipped_nodes.join(", "));
    }
  }
  if let Some(outputs) = &record.outputs {
    println!("Outputs:   {}", serde_json::to_string(outputs)?);
  }

  if details {
    println!();
    for node in record.nodes.values() {
      println!(
        "  {:<20} {:<9} attempts={}",
        node.node_id, node.state.as_str(), node.attempts
      );
      if let Some(error) = &node.error {
        println!("    error: {error}");
      }
      if let Some(cache_key) = &node.cache_key {
        println!("    cache key: {cache_key}");
      }
    }
  }
  Ok(())
}

async fn clear_cache(settings: &Settings, data_dir: &Path) -> Result<()> {
  let cache: Arc<dyn CacheStore> = match settings.cache {
    CacheBackend::Memory => Arc::new(InMemoryCacheStore::new()),
    CacheBackend::Local => Arc::new(FsCacheStore::new(settings.local_cache_dir(data_dir))),
    CacheBackend::Sqlite => {
      let pool = open_pool(&data_dir.join("cache.db")).await?;
      let store = SqliteCacheStore::new(pool);
      store
        .migrate()
        .await
        .context("failed to prepare cache database")?;
      Arc::new(store)
    }
  };

  cache.clear().await.context("failed to clear cache")?;
  tracing::info!(backend = ?settings.cache, "cache_cleared");
  Ok(())
}
