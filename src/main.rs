use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tasksync::config::Config;
use tasksync::model::Task;
use tasksync::storage::{FileStorage, SharedStorage};
use tasksync::sync::SyncClient;
use tasksync::token::{ExpirationState, TokenManager};
use tasksync::transport::{HttpTransport, SyncApi};
use tasksync::utils::datetime;
use tasksync::{logger, TaskStore};

#[derive(Parser)]
#[command(name = "tasksync", version, about = "Local-first task list with token-based backup")]
struct Cli {
    /// Use this configuration file instead of the default search path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Push to the server after a successful change
    #[arg(long, global = true)]
    sync: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show tasks grouped by bucket
    List,
    /// Add a task
    Add {
        text: String,
        /// Bucket name or id
        #[arg(long, short)]
        bucket: Option<String>,
    },
    /// Toggle a task's completion
    Done { id: String },
    /// Change a task's text
    Edit { id: String, text: String },
    /// Move a task to a bucket and position
    Move {
        id: String,
        /// Target bucket name or id; omit for no bucket
        #[arg(long, short)]
        bucket: Option<String>,
        #[arg(long, short, default_value_t = 0)]
        position: usize,
    },
    /// Delete a task
    Rm { id: String },
    /// Delete all completed tasks
    ClearCompleted,
    /// Manage buckets
    Bucket {
        #[command(subcommand)]
        command: BucketCommand,
    },
    /// Push local state to the server now
    Sync,
    /// Replace local state with the backup stored under a token
    Restore { token: String },
    /// Show the recovery token and its expiration
    Token,
    /// Email the recovery token to an address
    Email { address: String },
    /// Show sync status
    Status,
    /// Write a default configuration file
    InitConfig {
        /// Destination (defaults to the XDG config path)
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum BucketCommand {
    /// List buckets
    List,
    /// Add a bucket
    Add {
        name: String,
        /// `#RRGGBB` or a palette name
        #[arg(default_value = "blue")]
        color: String,
    },
    /// Rename or recolor a bucket
    Update { bucket: String, name: String, color: String },
    /// Delete a bucket; its tasks lose their bucket
    Rm { bucket: String },
}

struct App {
    store: TaskStore,
    tokens: Arc<TokenManager>,
    client: SyncClient,
}

impl App {
    fn open(config: &Config) -> Result<Self> {
        let dir = match &config.client.data_dir {
            Some(dir) => dir.clone(),
            None => FileStorage::default_dir()?,
        };
        let storage: Arc<dyn SharedStorage> = Arc::new(FileStorage::open(&dir, config.client.storage_quota())?);
        let evicted = storage.evict_expired(datetime::now_millis())?;
        if evicted > 0 {
            log::debug!("Evicted {evicted} expired cache entries");
        }

        let store = TaskStore::open(storage.clone()).context("Failed to open local task store")?;
        let tokens = Arc::new(TokenManager::new(
            storage,
            config.retention.policy(),
            config.client.token_lease_timeout(),
        ));
        let api: Arc<dyn SyncApi> = Arc::new(HttpTransport::new(
            &config.client.server_url,
            config.client.request_timeout(),
        )?);
        let client = SyncClient::new(store.clone(), tokens.clone(), api, config.client.sync_settings());
        Ok(Self { store, tokens, client })
    }

    /// Resolve a task by id or unique id prefix.
    fn task_id(&self, prefix: &str) -> Result<String> {
        let matches: Vec<Task> = self
            .store
            .tasks()?
            .into_iter()
            .filter(|task| task.id.starts_with(prefix))
            .collect();
        match matches.as_slice() {
            [task] => Ok(task.id.clone()),
            [] => anyhow::bail!("No task matches '{prefix}'"),
            _ => anyhow::bail!("'{prefix}' matches {} tasks, use a longer prefix", matches.len()),
        }
    }

    /// Resolve a bucket by name (case-insensitive) or id.
    fn bucket_id(&self, name_or_id: &str) -> Result<String> {
        self.store
            .buckets()?
            .into_iter()
            .find(|bucket| bucket.id == name_or_id || bucket.name.eq_ignore_ascii_case(name_or_id))
            .map(|bucket| bucket.id)
            .ok_or_else(|| anyhow::anyhow!("No bucket named '{name_or_id}'"))
    }

    fn print_tasks(&self) -> Result<()> {
        let tasks = self.store.tasks()?;
        let buckets = self.store.buckets()?;
        for bucket in &buckets {
            let in_bucket: Vec<&Task> = tasks
                .iter()
                .filter(|task| task.priority_id.as_deref() == Some(bucket.id.as_str()))
                .collect();
            println!("{} ({})", bucket.name, in_bucket.len());
            for task in in_bucket {
                print_task(task);
            }
        }
        let loose: Vec<&Task> = tasks.iter().filter(|task| task.priority_id.is_none()).collect();
        if !loose.is_empty() {
            println!("No bucket ({})", loose.len());
            for task in loose {
                print_task(task);
            }
        }
        Ok(())
    }

    fn print_status(&self) -> Result<()> {
        let state = self.client.state();
        println!("Last sync:  {}", datetime::format_timestamp(self.store.last_sync_at()?));
        println!("Status:     {:?}", state.status);
        if let Some(error) = &state.last_error {
            println!("Last error: {error}");
        }
        self.print_expiration()
    }

    fn print_expiration(&self) -> Result<()> {
        let status = self
            .tokens
            .expiration(self.store.last_sync_at()?, datetime::now_millis())?;
        match status.state {
            ExpirationState::None => println!("No recovery token yet; run `tasksync sync` to create one"),
            ExpirationState::NeverSynced => println!("Token not synced yet"),
            ExpirationState::Valid => println!(
                "Backup kept until {} ({} days)",
                datetime::format_timestamp(status.expires_at),
                status.days_remaining.unwrap_or_default()
            ),
            ExpirationState::Expiring => println!(
                "⚠️  Backup expires in {} days, sync to keep it",
                status.days_remaining.unwrap_or_default()
            ),
            ExpirationState::Expired => println!("❌ Backup expired; the next sync starts a new one"),
        }
        Ok(())
    }
}

fn print_task(task: &Task) {
    let mark = if task.completed { "x" } else { " " };
    let short_id: String = task.id.chars().take(8).collect();
    println!("  [{mark}] {short_id}  {}", task.text);
}

async fn push(client: &SyncClient) -> Result<()> {
    if client.force_sync().await {
        let state = client.state();
        println!("✅ Synced at {}", datetime::format_timestamp(state.last_sync_at));
        if state.last_conflicts > 0 {
            println!(
                "⚠️  {} records were changed on another device and kept there",
                state.last_conflicts
            );
        }
        Ok(())
    } else {
        match client.state().last_error {
            Some(error) => anyhow::bail!("Sync failed: {error}"),
            None => anyhow::bail!("Sync did not run"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::InitConfig { path } = &cli.command {
        let path = match path {
            Some(path) => path.clone(),
            None => Config::get_default_config_path()?,
        };
        return Config::generate_default_config(path);
    }

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load()?,
    };
    logger::init(&config.logging)?;
    let app = App::open(&config)?;

    let mutated = match cli.command {
        Command::List => {
            app.print_tasks()?;
            false
        }
        Command::Add { text, bucket } => {
            let bucket = bucket.map(|name| app.bucket_id(&name)).transpose()?;
            let task = app.store.add_task(&text, bucket.as_deref())?;
            println!("Added {}", task.id);
            true
        }
        Command::Done { id } => {
            let task = app.store.toggle_task(&app.task_id(&id)?)?;
            println!("{} {}", if task.completed { "Completed" } else { "Reopened" }, task.text);
            true
        }
        Command::Edit { id, text } => {
            app.store.update_task_text(&app.task_id(&id)?, &text)?;
            true
        }
        Command::Move { id, bucket, position } => {
            let bucket = bucket.map(|name| app.bucket_id(&name)).transpose()?;
            app.store.move_task(&app.task_id(&id)?, bucket.as_deref(), position)?;
            true
        }
        Command::Rm { id } => {
            let task = app.store.delete_task(&app.task_id(&id)?)?;
            println!("Deleted {}", task.text);
            true
        }
        Command::ClearCompleted => {
            let removed = app.store.clear_completed()?;
            println!("Removed {removed} completed tasks");
            removed > 0
        }
        Command::Bucket { command } => match command {
            BucketCommand::List => {
                for bucket in app.store.buckets()? {
                    let marker = if bucket.is_default { " (default)" } else { "" };
                    println!("{} {}{marker}", bucket.color, bucket.name);
                }
                false
            }
            BucketCommand::Add { name, color: bucket_color } => {
                let bucket = app.store.add_bucket(&name, &bucket_color)?;
                println!("Added bucket {} ({})", bucket.name, bucket.color);
                true
            }
            BucketCommand::Update {
                bucket,
                name,
                color: bucket_color,
            } => {
                app.store.update_bucket(&app.bucket_id(&bucket)?, &name, &bucket_color)?;
                true
            }
            BucketCommand::Rm { bucket } => {
                let removed = app.store.delete_bucket(&app.bucket_id(&bucket)?)?;
                println!("Deleted bucket {}", removed.name);
                true
            }
        },
        Command::Sync => {
            push(&app.client).await?;
            false
        }
        Command::Restore { token } => {
            if !app.client.restore(&token).await {
                let error = app.client.state().last_error;
                anyhow::bail!(
                    "Restore failed: {}",
                    error.map_or_else(|| "unknown error".to_string(), |e| e.to_string())
                );
            }
            println!("✅ Restored {} tasks", app.store.tasks()?.len());
            false
        }
        Command::Token => {
            match app.tokens.current()? {
                Some(stored) => println!("Recovery token: {}", stored.token),
                None => println!("No recovery token yet"),
            }
            app.print_expiration()?;
            false
        }
        Command::Email { address } => {
            app.tokens.ensure_token().await?;
            app.client.send_recovery_email(&address).await?;
            println!("📧 Recovery token sent to {address}");
            false
        }
        Command::Status => {
            app.print_status()?;
            false
        }
        Command::InitConfig { .. } => false,
    };

    if mutated && cli.sync {
        push(&app.client).await?;
    }
    Ok(())
}
