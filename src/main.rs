use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use blog_archiver::auth;
use blog_archiver::config::Config;
use blog_archiver::constants::USER_AGENT;
use blog_archiver::pipeline::BackupPipeline;

#[derive(Debug, Parser)]
#[command(name = "blog-archiver", version, about = "Archive a Tumblr blog as daily Markdown documents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one backup (the default).
    Backup,
    /// Obtain OAuth tokens for a service interactively.
    Auth {
        #[arg(value_enum)]
        service: AuthService,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AuthService {
    Tumblr,
    Youtube,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_tracing()?;

    match cli.command.unwrap_or(Command::Backup) {
        Command::Backup => backup().await,
        Command::Auth { service } => {
            let provider = match service {
                AuthService::Tumblr => &auth::TUMBLR,
                AuthService::Youtube => &auth::GOOGLE,
            };
            let http = reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .context("Failed to build HTTP client")?;
            auth::run_interactive(provider, &http).await
        }
    }
}

async fn backup() -> Result<()> {
    info!("Starting blog-archiver");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        blog = %config.tumblr_blog,
        output_dir = %config.output_dir.display(),
        timezone = config.timezone.name(),
        incremental_hours = ?config.incremental_hours,
        "Configuration loaded"
    );
    if config.delete_after_backup {
        warn!("DELETE_AFTER_BACKUP is enabled: archived posts will be removed from the blog");
    }

    let pipeline = BackupPipeline::new(config)?;

    let summary = pipeline.run_until(shutdown_signal()).await?;
    info!(
        posts = summary.posts_fetched,
        days_written = summary.days_written,
        days_skipped = summary.days_skipped,
        days_failed = summary.days_failed,
        delete_failures = summary.delete_failures,
        "Backup complete"
    );
    if summary.days_failed > 0 {
        anyhow::bail!("{} day(s) failed to archive", summary.days_failed);
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,blog_archiver=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
