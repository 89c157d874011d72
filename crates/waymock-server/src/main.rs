use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use waymock_server::alerts::AlertStore;
use waymock_server::config::Config;
use waymock_server::files::FileDefinitions;
use waymock_server::handlers::{HandlerRegistry, ServerContext};
use waymock_server::server::MockServer;
use waymock_server::MockEngine;

#[derive(Parser, Debug)]
#[command(name = "waymock-server", version, about)]
struct Args {
    /// Optional YAML config file; CLI flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, env = "WAYMOCK_PORT")]
    port: Option<u16>,
    #[arg(long, env = "WAYMOCK_HOST")]
    host: Option<String>,
    /// Definitions directory (routes/ + collections.*).
    #[arg(long, env = "WAYMOCK_PATH")]
    path: Option<PathBuf>,
    /// Collection to select at startup.
    #[arg(long, env = "WAYMOCK_COLLECTION")]
    collection: Option<String>,
    /// Default response delay in milliseconds.
    #[arg(long, env = "WAYMOCK_DELAY")]
    delay: Option<u64>,
    /// Log filter directive (overridden by RUST_LOG).
    #[arg(long, env = "WAYMOCK_LOG")]
    log: Option<String>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("failed to load config '{}'", path.display()))?,
            None => Config::default(),
        };
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(path) = self.path {
            config.path = path;
        }
        if let Some(collection) = self.collection {
            config.collection = Some(collection);
        }
        if let Some(delay) = self.delay {
            config.delay = delay;
        }
        if let Some(log) = self.log {
            config.log = log;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log.clone())),
        )
        .init();

    let registry = HandlerRegistry::with_builtins().context("handler registry setup failed")?;
    let context = ServerContext::new(config.path.clone());
    let engine = MockEngine::new(registry, context, AlertStore::new());

    engine.select_collection(config.collection.clone());

    let files = FileDefinitions::new(config.path.clone(), &engine);
    files
        .load_all()
        .with_context(|| format!("failed to load definitions from '{}'", config.path.display()))?;

    for alert in engine.alerts().flat() {
        warn!(id = %alert.id, "{}", alert.message);
    }

    let addr = config.listen_addr()?;
    let server = MockServer::bind(addr, engine, config.delay)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
