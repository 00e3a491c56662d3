use std::net::SocketAddr;

use anyhow::Context as _;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use articlecast::app::bootstrap;
use articlecast::app::routes::{AppState, router};
use articlecast::config::Config;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Public base URL used for sitemap entries.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    site_url: String,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    articlecast::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting articlecast-app");
    let config = Config::from_env().context("load config")?;

    let shutdown = CancellationToken::new();
    let app = bootstrap::build(&config, shutdown.clone())
        .await
        .context("build app")?;
    let worker = tokio::spawn(app.worker.run(shutdown.clone()));
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(?err, "listen for ctrl-c");
            }
            tracing::info!("shutdown requested");
            shutdown.cancel();
        }
    });

    let state = AppState {
        service: app.service,
        site_url: args.site_url,
    };
    let router = router(state, app.layout.db_dir());

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    worker.await.context("join worker")?;
    Ok(())
}
