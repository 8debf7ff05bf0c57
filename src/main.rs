use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use clusterfs::api;
use clusterfs::cluster::node::{
    NodeDescriptor, NodePool, RandomSelection, Redundancy, Scheme,
};
use clusterfs::config::Config;
use clusterfs::engine::Engine;
use clusterfs::registry::RegistryManager;
use clusterfs::registry::cache::MokaRegistryCache;
use clusterfs::registry::store::SqliteRegistryStore;
use clusterfs::transfer::PeerTransfer;
use clusterfs::utils::cli::Args;
use clusterfs::utils::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "clusterfs=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = validate_config(&args).await;

    let pool = SqlitePoolOptions::new()
        .max_connections(12)
        .connect(config.db_url.as_str())
        .await?;
    SqliteRegistryStore::ensure_schema(&pool).await?;

    let mut node_pool = NodePool::new(
        config.identity.clone(),
        config.scheme,
        config.redundancy,
        Arc::new(RandomSelection),
    );
    node_pool.add_node(NodeDescriptor::new(
        config.identity.clone(),
        config.port,
        "",
        config.root.clone(),
    ));
    for peer in &config.peers {
        node_pool.add_node(peer.clone());
    }

    let registry = RegistryManager::new(
        Arc::new(MokaRegistryCache::new(
            config.cache_capacity,
            config.cache_prefix.clone(),
        )),
        Arc::new(SqliteRegistryStore::new(Arc::new(pool))),
        config.identity.clone(),
        config.reconcile_interval,
    );
    let transfer = PeerTransfer::new(config.scheme);
    let engine = Arc::new(Engine::new(
        node_pool,
        registry,
        transfer,
        config.root.clone(),
        config.file_mode,
    )?);

    let state = Arc::new(AppState::new(engine, Arc::new(config.clone())));
    let app = api::create_router(state);

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;
    tracing::info!(
        identity = %config.identity,
        pool_size = config.peers.len() + 1,
        "listening on {}",
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down");
}

async fn validate_config(args: &Args) -> Config {
    let mut validation_errors = Vec::new();

    let root = PathBuf::from(&args.root);
    match tokio::fs::metadata(&root).await {
        Ok(meta) => {
            if !meta.is_dir() {
                validation_errors.push(format!(
                    "CLUSTERFS_ROOTDIR `{}` exists but is not a directory",
                    args.root,
                ));
            }
        }
        Err(_) => {
            validation_errors.push(format!("CLUSTERFS_ROOTDIR `{}` does not exist", args.root))
        }
    }

    let redundancy = match args.redundancy {
        -1 => Redundancy::All,
        n if n >= 1 => Redundancy::Count(n as u32),
        n => {
            validation_errors.push(format!(
                "CLUSTERFS_REDUNDANCY must be -1 (all nodes) or >= 1, got {n}"
            ));
            Redundancy::Count(1)
        }
    };

    let file_mode = match u32::from_str_radix(&args.file_mode, 8) {
        Ok(mode) => mode,
        Err(_) => {
            validation_errors.push(format!(
                "CLUSTERFS_FILE_MODE `{}` is not a valid octal mode",
                args.file_mode
            ));
            0o644
        }
    };

    let mut peers = Vec::new();
    for spec in &args.peers {
        match parse_peer(spec) {
            Ok(peer) => peers.push(peer),
            Err(e) => validation_errors.push(e),
        }
    }

    if let Some(db_path) = args.database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                validation_errors.push(format!(
                    "the directory for the database `{}` does not exist",
                    parent.display(),
                ));
            }
        }
    }

    if !validation_errors.is_empty() {
        eprintln!("{}", validation_errors.join("\n"));
        std::process::exit(1);
    }

    Config {
        host: args.host.clone(),
        port: args.port,
        identity: args.identity.clone(),
        root,
        db_url: args.database_url.clone(),
        cache_prefix: args.cache_prefix.clone(),
        cache_capacity: args.cache_capacity,
        redundancy,
        scheme: if args.secure {
            Scheme::Https
        } else {
            Scheme::Http
        },
        peers,
        reconcile_interval: Duration::from_secs(args.reconcile_secs),
        file_mode,
    }
}

/// Peers are declared as `identity:port` with an optional `:endpoint`
/// suffix for nodes mounted behind a path prefix.
fn parse_peer(spec: &str) -> Result<NodeDescriptor, String> {
    let mut parts = spec.splitn(3, ':');
    let identity = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("peer `{spec}` is missing an identity"))?;
    let port = parts
        .next()
        .and_then(|p| p.parse::<u16>().ok())
        .ok_or_else(|| format!("peer `{spec}` is missing a valid port"))?;
    let endpoint = parts.next().unwrap_or("");
    Ok(NodeDescriptor::new(identity, port, endpoint, ""))
}
