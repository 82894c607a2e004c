//! Run files through Detox the way a page upload would
//!
//! Usage:
//!   detox-scan scan photo.png receipt.jpg --out ./redacted
//!   detox-scan --mode hosted health

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use detox_guard::store::{FileStore, MemoryStore, SettingsStore};
use detox_guard::{DetoxConfig, DetoxService, Request, Response, ServerMode};
use detox_intercept::{
    Agent, FileInput, InputId, MemoryInput, MessageChannel, ServiceChannel, TracingNotifier,
    UploadedFile,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "detox-scan")]
#[command(about = "Redact sensitive regions from images before they are uploaded")]
struct Args {
    /// Config file (default: <config dir>/detox/detox.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Server mode for this run
    #[arg(short, long, global = true)]
    mode: Option<ServerMode>,

    /// Custom analysis server URL (implies --mode custom)
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// Keep settings in memory instead of the settings file
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan files as one upload and write what the page would receive
    Scan {
        /// Files to upload, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "detox-out")]
        out: PathBuf,
    },
    /// Check whether the active server answers
    Health,
    /// Print the active server's privacy policy
    Privacy,
    /// Print status and scan counters
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DetoxConfig::load_from(path)?,
        None => DetoxConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "Could not load config, using defaults");
            DetoxConfig::default()
        }),
    };

    let store: Arc<dyn SettingsStore> = if args.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        match FileStore::default_location() {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!(error = %e, "No settings directory, keeping settings in memory");
                Arc::new(MemoryStore::new())
            }
        }
    };

    let service = Arc::new(DetoxService::new(config.clone(), store));
    service.start().await?;
    select_server(&service, args.mode, args.server.as_deref()).await?;

    match args.command {
        Command::Scan { files, out } => scan(&config, service, &files, &out).await,
        Command::Health => print_json(&service.handle(Request::CheckApi).await),
        Command::Privacy => print_json(&service.handle(Request::GetPrivacyPolicy).await),
        Command::Status => print_json(&service.handle(Request::GetStatus).await),
    }
}

async fn select_server(
    service: &DetoxService,
    mode: Option<ServerMode>,
    server: Option<&str>,
) -> Result<()> {
    let reply = match (mode, server) {
        (_, Some(url)) => {
            service
                .handle(Request::SetCustomServer {
                    url: url.to_string(),
                })
                .await
        }
        (Some(ServerMode::Custom), None) => bail!("--mode custom needs --server <URL>"),
        (Some(mode), None) => {
            service
                .handle(Request::SetServerMode {
                    mode: mode.to_string(),
                })
                .await
        }
        (None, None) => return Ok(()),
    };

    if let Response::Failure { error, .. } = reply {
        bail!("Could not select server: {}", error);
    }
    Ok(())
}

async fn scan(
    config: &DetoxConfig,
    service: Arc<DetoxService>,
    paths: &[PathBuf],
    out: &Path,
) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(read_upload(path).await?);
    }

    let channel: Arc<dyn MessageChannel> = Arc::new(ServiceChannel::spawn(service));
    let notifier = Arc::new(TracingNotifier::new(config.interceptor.notification_ms));
    let agent = Agent::start(config, channel, notifier).await;
    if !agent.enabled().get() {
        warn!("Detox is disabled in settings, files will pass through untouched");
    }

    let input = Arc::new(MemoryInput::new(InputId(1)));
    agent.watcher().observe(input.clone());
    let interceptor = agent
        .watcher()
        .get(input.id())
        .context("input was not attached")?;

    input.user_select(files);
    interceptor.wait_idle().await;

    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("creating {}", out.display()))?;

    for file in input.files() {
        let target = out.join(&file.name);
        tokio::fs::write(&target, &file.bytes)
            .await
            .with_context(|| format!("writing {}", target.display()))?;
        println!("{}  {}  {} bytes", target.display(), file.media_type, file.len());
    }

    info!(runs = interceptor.runs(), "Scan finished");
    Ok(())
}

async fn read_upload(path: &Path) -> Result<UploadedFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let media_type = image::ImageFormat::from_path(path)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string());
    Ok(UploadedFile::new(name, media_type, bytes))
}

fn print_json(response: &Response) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}
