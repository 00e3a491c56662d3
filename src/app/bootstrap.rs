use std::sync::Arc;

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use crate::app::api::ManuscriptService;
use crate::app::artifact_store::ArtifactLayout;
use crate::app::assemble::Assembler;
use crate::app::builder::ManuscriptBuilder;
use crate::app::freshness::FreshnessPolicy;
use crate::app::manuscript_store::{LocalFsManuscriptStore, ManuscriptStore};
use crate::app::queue;
use crate::app::runner::{Worker, WorkerParts};
use crate::app::sentinel::{DEFAULT_DISALLOWED, DisallowedPatterns};
use crate::app::synthesize::Synthesizer;
use crate::config::Config;
use crate::credentials::CredentialPool;
use crate::elevenlabs::ElevenLabsClient;
use crate::extract::{ArticleSource, HttpArticleSource};
use crate::normalize::Normalizer;
use crate::provider::SpeechProvider;
use crate::retry::{FailoverController, TokioSleeper};
use crate::voice::load_voices;

/// The worker and the request-side service, sharing one store and queue.
pub struct App {
    pub worker: Worker,
    pub service: ManuscriptService,
    pub layout: ArtifactLayout,
}

/// Wires the production collaborators: local JSON store, HTTP article source, ElevenLabs.
pub async fn build(config: &Config, shutdown: CancellationToken) -> anyhow::Result<App> {
    let provider: Arc<dyn SpeechProvider> = Arc::new(ElevenLabsClient::new(config.elevenlabs()));
    let source: Arc<dyn ArticleSource> = Arc::new(HttpArticleSource::new());
    build_with(config, provider, source, shutdown).await
}

pub async fn build_with(
    config: &Config,
    provider: Arc<dyn SpeechProvider>,
    source: Arc<dyn ArticleSource>,
    shutdown: CancellationToken,
) -> anyhow::Result<App> {
    let layout = ArtifactLayout::new(&config.db_dir, &config.public_prefix);
    let store: Arc<dyn ManuscriptStore> = Arc::new(LocalFsManuscriptStore::new(&config.db_dir));

    let pool = CredentialPool::load(&config.credentials_path)
        .await
        .context("load credential pool")?;
    let voices = load_voices(&config.voices_path)
        .await
        .context("load voices")?;

    let patterns = DEFAULT_DISALLOWED
        .iter()
        .map(|p| (*p).to_owned())
        .chain(config.disallowed.iter().cloned())
        .collect::<Vec<_>>();
    let disallowed = DisallowedPatterns::new(&patterns).context("compile disallowed patterns")?;

    let controller = FailoverController::new(
        provider,
        Arc::new(Normalizer::standard().context("compile normalizer")?),
        Arc::new(TokioSleeper::new(shutdown)),
    );
    let assembler = Arc::new(Assembler::new(Arc::clone(&store), layout.clone()));
    let (queue, receiver) = queue::channel();

    let worker = Worker::new(
        WorkerParts {
            builder: ManuscriptBuilder::new(layout.clone(), source, disallowed),
            store: Arc::clone(&store),
            synthesizer: Synthesizer::new(
                controller,
                Arc::clone(&store),
                voices,
                config.attribution.clone(),
            ),
            assembler: Arc::clone(&assembler),
            freshness: FreshnessPolicy::new(config.refresh, config.always_update.iter().cloned()),
            pool,
            generate: config.generate,
        },
        queue.clone(),
        receiver,
    );
    let service = ManuscriptService::new(store, queue, assembler, config.source_url.clone());
    tracing::info!(
        db_dir = %config.db_dir.display(),
        generate = config.generate,
        refresh = config.refresh,
        "articlecast wired"
    );

    Ok(App {
        worker,
        service,
        layout,
    })
}
