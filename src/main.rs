use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;
use tokio_util::sync::CancellationToken;

use articlecast::app::model::id_from_article;
use articlecast::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    articlecast::logging::init().context("init logging")?;

    let cli = articlecast::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let config = Config::from_env().context("load config")?;
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; stopping");
                shutdown.cancel();
            }
        }
    });

    let mut app = articlecast::app::bootstrap::build(&config, shutdown)
        .await
        .context("build app")?;

    match cli.command {
        articlecast::cli::Command::Generate(args) => {
            let source_url = args.source_url.as_deref();
            app.service
                .request_manuscript(&args.id, source_url)
                .await
                .context("enqueue article")?;
            app.worker.run_until_idle().await;

            let id = id_from_article(&args.id)?;
            let manuscript = app
                .service
                .get(&id)
                .await
                .context("load manuscript")?
                .ok_or_else(|| anyhow::anyhow!("no manuscript stored for {id:?}"))?;
            println!("{}\t{}", manuscript.state.as_str(), manuscript.title);
        }
        articlecast::cli::Command::Assemble(args) => {
            let url = app
                .service
                .reassemble(&args.id)
                .await
                .context("assemble")?;
            println!("{url}");
        }
    }

    Ok(())
}
