use clap::Parser;
use polyglot_exec::EngineConfig;
use polyglot_exec_server::{build_dispatcher, create_app, run_server};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to listen on
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    addr: SocketAddr,

    /// Engine configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum number of concurrent executions, overrides the config file
    #[arg(short, long)]
    max_concurrent: Option<usize>,

    /// Bootstrap the Python runtime at startup instead of on first use
    #[arg(long)]
    preload_python: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(max_concurrent) = args.max_concurrent {
        config.max_concurrent_executions = max_concurrent;
    }

    let dispatcher = build_dispatcher(config)?;
    if args.preload_python {
        info!("preloading Python runtime");
        dispatcher.warm_up_runtime();
    }

    let app = create_app(dispatcher);
    run_server(app, args.addr).await?;

    Ok(())
}
