use anyhow::Context;
use apphost::{
    background::{self, BackgroundCoordinator},
    config,
    db::{self, pool::DbPool},
    metadata::NewTenant,
    state::AppState,
};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "apphost", about = "Multi-tenant application host", version)]
struct Cli {
    /// Path to TOML config file
    #[arg(short, long, default_value = "apphost.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Create a tenant record and provision its storage
    Create {
        name: String,
        #[arg(long)]
        title: Option<String>,
        /// Routing alias (hostname)
        #[arg(long)]
        cname: Option<String>,
        #[arg(long)]
        pinned: bool,
    },
    /// Delete a tenant record (its storage is left in place)
    Destroy { name: String },
    /// List tenant records
    List {
        /// Only pinned tenants
        #[arg(long)]
        pinned: bool,
    },
    /// Apply metadata database migrations and exit
    Migrate,
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging from RUST_LOG (default: info)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apphost=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    match cli.command {
        Commands::Serve => serve(cfg).await,
        Commands::Create {
            name,
            title,
            cname,
            pinned,
        } => {
            create(
                cfg,
                NewTenant {
                    name,
                    title,
                    cname,
                    pinned,
                },
            )
            .await
        }
        Commands::Destroy { name } => destroy(cfg, &name).await,
        Commands::List { pinned } => list(cfg, pinned),
        Commands::Migrate => open_db(&cfg, 1).map(|_| ()),
    }
}

/// Open the metadata database, creating its directory, and run migrations.
fn open_db(cfg: &config::HostConfig, readers: usize) -> anyhow::Result<DbPool> {
    if let Some(parent) = cfg.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create db dir: {}", parent.display()))?;
        }
    }
    let db_path = cfg
        .database_path
        .to_str()
        .context("database_path is not valid UTF-8")?;
    let db = DbPool::open(db_path, readers).context("failed to open database")?;
    db::run_migrations(&db).context("failed to run database migrations")?;
    Ok(db)
}

// ── Serve ──────────────────────────────────────────────────────────────────

async fn serve(cfg: config::HostConfig) -> anyhow::Result<()> {
    info!("Opening metadata database ({} reader connections)...", cfg.db_readers);
    let db = open_db(&cfg, cfg.db_readers)?;

    info!(
        "Tenant storage template: {} (hook mode {:?})",
        cfg.storage.describe(),
        cfg.hook_mode
    );
    let state = AppState::build(cfg.clone(), db);

    // Background task coordinator
    let mut coordinator = BackgroundCoordinator::new();

    if cfg.pending_retry_secs > 0 {
        let store = state.store.clone();
        let registry = state.registry.clone();
        let every = Duration::from_secs(cfg.pending_retry_secs);
        coordinator.spawn("pending_sweeper", move |shutdown| {
            background::pending_sweeper::run(store, registry, every, shutdown)
        });
        info!(
            "Background: pending sweeper started ({}s interval)",
            cfg.pending_retry_secs
        );
    }

    let app = apphost::routes::app(state.clone());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid bind address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Signal background tasks to stop
    let tasks = coordinator.task_count();
    coordinator.shutdown().await;
    info!("{} background task(s) stopped.", tasks);

    state.registry.shutdown().await;
    info!("Server stopped.");
    Ok(())
}

// ── Graceful shutdown ──────────────────────────────────────────────────────

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install CTRL+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server...");
}

// ── Tenant commands ────────────────────────────────────────────────────────

async fn create(cfg: config::HostConfig, new: NewTenant) -> anyhow::Result<()> {
    let db = open_db(&cfg, 1)?;
    let state = AppState::build(cfg, db);

    let record = state
        .store
        .create(new)
        .await
        .context("failed to create tenant")?;
    info!(
        "Tenant {} created (status {})",
        record.name,
        record.status.as_str()
    );

    // The tenant was started here only to prove it comes up; a running server
    // initializes it on first request.
    state.registry.shutdown().await;
    Ok(())
}

async fn destroy(cfg: config::HostConfig, name: &str) -> anyhow::Result<()> {
    let db = open_db(&cfg, 1)?;
    let state = AppState::build(cfg, db);
    state
        .store
        .destroy(name)
        .await
        .with_context(|| format!("failed to destroy tenant {}", name))?;
    info!("Tenant {} destroyed", name);
    Ok(())
}

fn list(cfg: config::HostConfig, pinned_only: bool) -> anyhow::Result<()> {
    let db = open_db(&cfg, 1)?;
    let state = AppState::build(cfg, db);
    let records = if pinned_only {
        state.store.list_pinned()?
    } else {
        state.store.list()?
    };

    println!(
        "{:<24} {:<14} {:<6} {:<32} CREATED",
        "NAME", "STATUS", "PINNED", "CNAME"
    );
    for r in &records {
        println!(
            "{:<24} {:<14} {:<6} {:<32} {}",
            r.name,
            r.status.as_str(),
            if r.pinned { "yes" } else { "no" },
            r.cname.as_deref().unwrap_or("-"),
            r.created_at
        );
    }
    Ok(())
}
