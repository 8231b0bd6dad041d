//! taskgate CLI: operator interface to the activity store and result cache.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use taskgate::activity::ActivityStore;
use taskgate::cache::{RedisCache, ResultCache};
use taskgate::config::{Config, InterceptorConfig};
use taskgate::db::Db;
use taskgate::fingerprint::Fingerprint;
use taskgate::model::{ActivityId, ActivityRecord, Kwargs, ScanId, TaskInvocation};
use taskgate::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};

#[derive(Parser)]
#[command(name = "taskgate", about = "Task execution interceptor tooling")]
struct Cli {
    /// TOML file with interceptor settings (overrides TASK_* variables)
    #[arg(long, global = true)]
    interceptor_config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply database migrations
    Migrate,
    /// Print the cache key of an invocation
    Fingerprint {
        #[command(flatten)]
        invocation: InvocationArgs,
    },
    /// Result cache operations
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Scan activity operations
    Activity {
        #[command(subcommand)]
        action: ActivityAction,
    },
}

#[derive(clap::Args)]
struct InvocationArgs {
    /// Dotted task name
    name: String,
    /// Positional arguments as a JSON array
    #[arg(long)]
    args: Option<String>,
    /// Keyword arguments as a JSON object
    #[arg(long)]
    kwargs: Option<String>,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show the cached result of an invocation
    Show {
        #[command(flatten)]
        invocation: InvocationArgs,
    },
}

#[derive(Subcommand)]
enum ActivityAction {
    /// List the activities of a scan
    List {
        #[arg(long)]
        scan: i64,
    },
    /// Show one activity
    Show { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let interceptor_config = match &cli.interceptor_config {
        Some(path) => InterceptorConfig::load(path)?,
        None => InterceptorConfig::from_env()?,
    };

    match cli.command {
        Command::Fingerprint { invocation } => {
            let invocation = invocation.parse()?;
            let fingerprint =
                Fingerprint::of(&invocation, &interceptor_config.cache_ignore_kwargs);
            println!("{fingerprint}");
            Ok(())
        }
        Command::Migrate => {
            let (config, _guard) = load_config()?;
            let db = Db::connect(config.database_url.expose_secret()).await?;
            db.migrate().await?;
            println!("Migrations applied.");
            Ok(())
        }
        Command::Cache {
            action: CacheAction::Show { invocation },
        } => {
            let (config, _guard) = load_config()?;
            let cache = RedisCache::connect(config.cache_url.expose_secret()).await?;
            cmd_cache_show(&cache, &interceptor_config, invocation).await
        }
        Command::Activity { action } => {
            let (config, _guard) = load_config()?;
            let db = Db::connect(config.database_url.expose_secret()).await?;
            match action {
                ActivityAction::List { scan } => cmd_activity_list(&db, ScanId(scan)).await,
                ActivityAction::Show { id } => cmd_activity_show(&db, ActivityId(id)).await,
            }
        }
    }
}

/// Environment configuration plus telemetry, for commands that touch a store.
fn load_config() -> anyhow::Result<(Config, TelemetryGuard)> {
    let config = Config::from_env()?;
    let guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "taskgate".to_string(),
        log_level: config.log_level.clone(),
    })?;
    Ok((config, guard))
}

impl InvocationArgs {
    fn parse(self) -> anyhow::Result<TaskInvocation> {
        let args: Vec<serde_json::Value> = match self.args {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| anyhow::anyhow!("--args must be a JSON array: {e}"))?,
            None => Vec::new(),
        };
        let kwargs: Kwargs = match self.kwargs {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| anyhow::anyhow!("--kwargs must be a JSON object: {e}"))?,
            None => Kwargs::new(),
        };

        let mut invocation = TaskInvocation::new(self.name).args(args);
        invocation.kwargs = kwargs;
        Ok(invocation)
    }
}

async fn cmd_cache_show(
    cache: &RedisCache,
    config: &InterceptorConfig,
    invocation: InvocationArgs,
) -> anyhow::Result<()> {
    let invocation = invocation.parse()?;
    let fingerprint = Fingerprint::of(&invocation, &config.cache_ignore_kwargs);

    println!("Key:    {fingerprint}");
    match cache.get(fingerprint.as_str()).await? {
        Some(payload) => match serde_json::from_str::<serde_json::Value>(&payload) {
            Ok(value) => println!("Value:  {}", serde_json::to_string_pretty(&value)?),
            Err(_) => println!("Value:  {payload} (not JSON)"),
        },
        None => println!("Value:  - (not cached)"),
    }
    Ok(())
}

async fn cmd_activity_list(db: &Db, scan_id: ScanId) -> anyhow::Result<()> {
    let records = db.list_activities(scan_id).await?;

    if records.is_empty() {
        println!("No activities for scan {scan_id}.");
        return Ok(());
    }

    println!(
        "{:<8}  {:<10}  {:<40}  TIME",
        "ID", "STATUS", "TITLE"
    );
    println!("{}", "-".repeat(90));

    for record in &records {
        let title: String = record.title.chars().take(40).collect();
        println!(
            "{:<8}  {:<10}  {:<40}  {}",
            record.id.to_string(),
            record.status.as_str(),
            title,
            record.time.format("%Y-%m-%d %H:%M:%S")
        );
    }

    println!("\n{} activit{}", records.len(), if records.len() == 1 { "y" } else { "ies" });
    Ok(())
}

async fn cmd_activity_show(db: &Db, id: ActivityId) -> anyhow::Result<()> {
    let record: ActivityRecord = db.get_activity(id).await?;

    println!("ID:       {}", record.id);
    println!("Scan:     {}", record.scan_id);
    println!("Title:    {}", record.title);
    println!("Status:   {}", record.status);
    println!("Time:     {}", record.time);
    if let Some(ref error) = record.error_message {
        println!("---");
        println!("Error:    {error}");
    }
    Ok(())
}
