//! dispatchr binary: serves the built-in demo site.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use dispatchr::config::watcher::ConfigWatcher;
use dispatchr::config::{load_config, AppConfig};
use dispatchr::http::server::spawn_config_updates;
use dispatchr::observability::{logging, metrics};
use dispatchr::{demo, HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "dispatchr")]
#[command(about = "Serve the dispatchr demo site", long_about = None)]
struct Cli {
    /// TOML configuration file; watched for changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `[server] bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Force debug mode.
    #[arg(long)]
    debug: bool,

    /// Directory holding `static/`; defaults to the working directory.
    #[arg(long)]
    root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if cli.debug {
        config.debug = true;
    }
    if let Some(bind) = &cli.bind {
        config.server.bind_address = bind.clone();
    }

    logging::init_logging(&config.server.log_level, config.debug);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dispatchr starting");
    tracing::info!(
        bind_address = %config.server.bind_address,
        debug = config.debug,
        sessions = config.secret_key.is_some(),
        request_timeout_secs = config.server.request_timeout_secs,
        "Configuration loaded"
    );

    if config.server.metrics_enabled {
        match config.server.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.server.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let app = demo::build(config, cli.root);

    // Keep the watcher alive for the lifetime of the server.
    let _watcher = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            spawn_config_updates(app.clone(), updates);
            Some(watcher.run()?)
        }
        None => None,
    };

    HttpServer::new(app).run(listener, Shutdown::new()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
