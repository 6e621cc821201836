use anyhow::Context;
use clap::Parser;
use minecraft_switch_proxy::{command::CommandSource, config::Config, proxy::ProxyServer};
use std::{path::PathBuf, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// A Minecraft proxy that moves players between backend servers.
#[derive(Debug, Parser)]
struct Args {
    /// Path of the configuration file. Created with defaults if missing.
    #[arg(short, long, default_value = "proxy.toml")]
    config: PathBuf,
    /// Overrides the bind address of the configuration.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        let config = Config::default();
        fs_err::write(&args.config, toml::to_string_pretty(&config)?)?;
        tracing::info!("Created default configuration at {}", args.config.display());
        config
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let proxy = ProxyServer::builder(config).build()?;
    tracing::info!("Started");

    tokio::spawn(console(Arc::clone(&proxy)));
    let signal_proxy = Arc::clone(&proxy);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_proxy.shutdown();
        }
    });

    proxy.run(listener).await
}

/// Runs commands typed on standard input as the console.
async fn console(proxy: Arc<ProxyServer>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match proxy.commands.execute(CommandSource::Console, input).await {
            Ok(true) => {}
            Ok(false) => tracing::info!("Unknown command: {input}"),
            Err(e) => tracing::warn!("{}", e.message().plain_text()),
        }
    }
}
