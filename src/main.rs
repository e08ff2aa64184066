mod cache;
mod config;
mod fetch;
mod rules;
mod store;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use cache::{prune_stale, CacheStore, Dispatcher, SqliteStorage};
use config::Config;
use fetch::{HttpFetcher, Request};
use store::{LocalStore, StoreName};
use worker::{ClientMessage, PushPayload, SyncTag, Worker, WorkerEvent};

#[derive(Parser, Debug)]
#[command(name = "offcache")]
#[command(about = "Offline-first request cache with strategy dispatch")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./offcache.yaml or
  /// $XDG_CONFIG_HOME/offcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show which strategy a request path classifies to
  Classify { path: String },
  /// Dispatch one GET request through the cache
  Get { url: String },
  /// Fetch URLs into the dynamic cache partition
  Warm { urls: Vec<String> },
  /// Precache configured static assets and activate the current version
  Install,
  /// Drop cache partitions left over from previous versions
  Activate,
  /// Render the notification a push payload would display
  Push {
    /// JSON payload with optional title/body/url fields; omit for defaults
    payload: Option<String>,
  },
  /// List cached URLs in one partition, or all partition names
  Ls { partition: Option<String> },
  /// Drop one cache partition
  Clear { partition: String },
  /// Run a background sync handler (sync-progress or sync-bookmarks)
  Sync { tag: String },
  /// Inspect or edit the local record stores
  #[command(subcommand)]
  Store(StoreCommand),
}

#[derive(Subcommand, Debug)]
enum StoreCommand {
  /// Upsert a JSON record into a store
  Put { store: String, record: String },
  /// Print one record by primary key
  Get { store: String, key: String },
  /// Print every record in a store
  Ls { store: String },
  /// Print records matching an indexed field value
  Find {
    store: String,
    field: String,
    value: String,
  },
  /// Delete one record by primary key
  Rm { store: String, key: String },
  /// Delete every record in a store
  Clear { store: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _guard = init_tracing()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  match args.command {
    Command::Classify { path } => {
      println!("{}", config.rule_set().classify(&path));
      Ok(())
    }
    Command::Get { url } => get(&config, &url).await,
    Command::Warm { urls } => warm(&config, urls).await,
    Command::Install => install(&config).await,
    Command::Activate => activate(&config),
    Command::Push { payload } => push(&config, payload.as_deref()).await,
    Command::Ls { partition } => ls(&config, partition.as_deref()),
    Command::Clear { partition } => {
      open_store(&config)?.drop_partition(&partition)?;
      println!("dropped partition {}", partition);
      Ok(())
    }
    Command::Sync { tag } => sync(&config, &tag).await,
    Command::Store(cmd) => run_store_command(cmd),
  }
}

fn parse_store_name(name: &str) -> Result<StoreName> {
  StoreName::parse(name).ok_or_else(|| eyre!("Unknown store '{}'", name))
}

fn run_store_command(cmd: StoreCommand) -> Result<()> {
  let local = LocalStore::open()?;

  match cmd {
    StoreCommand::Put { store, record } => {
      let store = parse_store_name(&store)?;
      let record = serde_json::from_str(&record)
        .map_err(|e| eyre!("Record is not valid JSON: {}", e))?;
      let stored = local.put(store, record)?;
      println!("{}", stored);
    }
    StoreCommand::Get { store, key } => {
      let store = parse_store_name(&store)?;
      match local.get(store, &key)? {
        Some(record) => println!("{}", record),
        None => return Err(eyre!("No record '{}' in store {}", key, store)),
      }
    }
    StoreCommand::Ls { store } => {
      let store = parse_store_name(&store)?;
      for record in local.get_all(store)? {
        println!("{}", record);
      }
    }
    StoreCommand::Find {
      store,
      field,
      value,
    } => {
      let store = parse_store_name(&store)?;
      for record in local.get_by_index(store, &field, &value)? {
        println!("{}", record);
      }
    }
    StoreCommand::Rm { store, key } => {
      let store = parse_store_name(&store)?;
      if !local.delete(store, &key)? {
        return Err(eyre!("No record '{}' in store {}", key, store));
      }
    }
    StoreCommand::Clear { store } => {
      let store = parse_store_name(&store)?;
      local.clear(store)?;
    }
  }

  Ok(())
}

async fn sync(config: &Config, tag: &str) -> Result<()> {
  let tag = SyncTag::parse(tag)
    .ok_or_else(|| eyre!("Unknown sync tag '{}' (expected sync-progress or sync-bookmarks)", tag))?;

  let local = Arc::new(LocalStore::open()?);
  let mut w = build_worker(config)?.with_local_store(local);
  w.handle_event(WorkerEvent::Sync(tag)).await?;

  Ok(())
}

fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::state_dir()
    .or_else(dirs::data_dir)
    .ok_or_else(|| eyre!("Could not determine state directory"))?
    .join("offcache")
    .join("logs");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let appender = tracing_appender::rolling::daily(log_dir, "offcache.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("offcache=info")),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

fn open_store(config: &Config) -> Result<SqliteStorage> {
  match &config.cache_db {
    Some(path) => SqliteStorage::open_at(path),
    None => SqliteStorage::open(),
  }
}

fn build_worker(config: &Config) -> Result<Worker<SqliteStorage, HttpFetcher>> {
  let store = Arc::new(open_store(config)?);
  let fetcher = Arc::new(HttpFetcher::new()?);
  let precache = config
    .precache
    .iter()
    .map(|url| config.resolve_url(url))
    .collect();

  Ok(Worker::new(
    store,
    fetcher,
    config.rule_set(),
    config.partitions(),
    precache,
  ))
}

async fn get(config: &Config, url: &str) -> Result<()> {
  let store = Arc::new(open_store(config)?);
  let fetcher = Arc::new(HttpFetcher::new()?);
  let mut dispatcher = Dispatcher::new(store, fetcher, config.rule_set(), config.partitions());
  if let Some(offline_url) = &config.offline_url {
    dispatcher = dispatcher.with_offline_url(offline_url.clone());
  }

  let served = dispatcher.handle(Request::get(config.resolve_url(url))).await;
  println!(
    "{} {} ({} bytes)",
    served.response.status,
    served.response.content_type().unwrap_or("-"),
    served.response.body.len()
  );

  // Let a background revalidation finish before the process exits
  if let Some(handle) = served.revalidate {
    let _ = handle.await;
  }

  Ok(())
}

async fn warm(config: &Config, urls: Vec<String>) -> Result<()> {
  let mut w = build_worker(config)?;
  let urls: Vec<String> = urls.iter().map(|url| config.resolve_url(url)).collect();
  let count = urls.len();

  w.handle_event(WorkerEvent::Message(ClientMessage::CacheUrls { urls }))
    .await?;
  println!("warmed {} url(s) into {}", count, w.partitions().dynamic_name());

  Ok(())
}

async fn install(config: &Config) -> Result<()> {
  let mut w = build_worker(config)?;
  w.handle_event(WorkerEvent::Install).await?;
  w.handle_event(WorkerEvent::Activate).await?;
  println!(
    "installed version {} ({} asset(s) precached)",
    config.version,
    config.precache.len()
  );

  Ok(())
}

fn activate(config: &Config) -> Result<()> {
  let store = open_store(config)?;
  let dropped = prune_stale(&store, &config.partitions())?;

  for name in &dropped {
    println!("dropped {}", name);
  }
  println!(
    "version {} active ({} stale partition(s) dropped)",
    config.version,
    dropped.len()
  );

  Ok(())
}

async fn push(config: &Config, payload: Option<&str>) -> Result<()> {
  let payload = payload
    .map(|raw| {
      serde_json::from_str::<PushPayload>(raw)
        .map_err(|e| eyre!("Payload is not valid JSON: {}", e))
    })
    .transpose()?;

  let mut w = build_worker(config)?;
  if let Some(n) = w.handle_event(WorkerEvent::Push(payload)).await? {
    println!("{}: {}", n.title, n.body);
    println!("opens {}", n.url);
    for action in &n.actions {
      println!("  [{}] {}", action.action, action.title);
    }
  }

  Ok(())
}

fn ls(config: &Config, partition: Option<&str>) -> Result<()> {
  let store = open_store(config)?;

  match partition {
    Some(name) => {
      for url in store.list(name)? {
        println!("{}", url);
      }
    }
    None => {
      let current = config.partitions();
      for name in store.partitions()? {
        let marker = if current.is_current(&name) { "" } else { " (stale)" };
        println!("{} [{} entries]{}", name, store.list(&name)?.len(), marker);
      }
    }
  }

  Ok(())
}
