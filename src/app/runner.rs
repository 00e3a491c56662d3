use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::app::assemble::Assembler;
use crate::app::builder::ManuscriptBuilder;
use crate::app::freshness::{FreshnessPolicy, log_decision};
use crate::app::manuscript_store::ManuscriptStore;
use crate::app::model::{Manuscript, ManuscriptState};
use crate::app::queue::{JobQueue, JobReceiver, QueueItem};
use crate::app::sentinel::{DISALLOWED_ID, ERROR_ID};
use crate::app::synthesize::Synthesizer;
use crate::credentials::CredentialPool;

/// The single consumer of the job queue; owns the credential pool.
pub struct Worker {
    builder: ManuscriptBuilder,
    store: Arc<dyn ManuscriptStore>,
    synthesizer: Synthesizer,
    assembler: Arc<Assembler>,
    freshness: FreshnessPolicy,
    pool: CredentialPool,
    queue: JobQueue,
    receiver: JobReceiver,
    generate: bool,
}

pub struct WorkerParts {
    pub builder: ManuscriptBuilder,
    pub store: Arc<dyn ManuscriptStore>,
    pub synthesizer: Synthesizer,
    pub assembler: Arc<Assembler>,
    pub freshness: FreshnessPolicy,
    pub pool: CredentialPool,
    pub generate: bool,
}

impl Worker {
    pub fn new(parts: WorkerParts, queue: JobQueue, receiver: JobReceiver) -> Self {
        Self {
            builder: parts.builder,
            store: parts.store,
            synthesizer: parts.synthesizer,
            assembler: parts.assembler,
            freshness: parts.freshness,
            pool: parts.pool,
            queue,
            receiver,
            generate: parts.generate,
        }
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Processes items until the queue is closed or shutdown is requested.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!("worker started");
        loop {
            let item = tokio::select! {
                item = self.receiver.recv() => item,
                _ = shutdown.cancelled() => None,
            };
            let Some(item) = item else {
                break;
            };
            tokio::select! {
                _ = self.process(item) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        tracing::info!("worker stopped");
    }

    /// Processes queued items, including follow-ups, until none are left.
    pub async fn run_until_idle(&mut self) {
        while let Some(item) = self.receiver.try_recv() {
            self.process(item).await;
        }
    }

    pub async fn process(&mut self, item: QueueItem) {
        let article_id = item.article_id.clone();
        if let Err(err) = self.try_process(item).await {
            tracing::error!(id = %article_id, ?err, "article processing failed");
        }
    }

    async fn try_process(&mut self, item: QueueItem) -> anyhow::Result<()> {
        self.pool.reset();
        let QueueItem {
            article_id,
            source_url,
        } = item;
        tracing::info!(
            id = %article_id,
            remaining = self.receiver.len(),
            "processing article"
        );
        if !self.generate {
            tracing::info!(id = %article_id, "article generation disabled; skipping");
            return Ok(());
        }

        match self.builder.build(&article_id, &source_url).await {
            Ok(mut manuscript) => match manuscript.state {
                ManuscriptState::Disallowed | ManuscriptState::Error => {
                    let follow_up = if manuscript.state == ManuscriptState::Disallowed {
                        DISALLOWED_ID
                    } else {
                        ERROR_ID
                    };
                    manuscript.lastmod = Utc::now();
                    self.store.put(&manuscript).await.context("save notice")?;
                    self.queue.enqueue(follow_up, source_url);
                    return Ok(());
                }
                ManuscriptState::Generating | ManuscriptState::Done => {
                    let persisted = self
                        .store
                        .get(&article_id)
                        .await
                        .context("load persisted manuscript")?;
                    if manuscript.forced_voice.is_none() {
                        manuscript.forced_voice =
                            persisted.as_ref().and_then(|p| p.forced_voice.clone());
                    }
                    let decision = self.freshness.check(&manuscript, persisted.as_ref());
                    log_decision(&manuscript, decision);
                    if decision.regenerates() {
                        self.update_manuscript(manuscript).await?;
                    }
                }
            },
            Err(err) => {
                tracing::warn!(id = %article_id, ?err, "could not get article; abandoning");
            }
        }

        self.heal(&article_id).await
    }

    /// A finished manuscript whose complete audio is missing is regenerated from scratch.
    async fn heal(&mut self, article_id: &str) -> anyhow::Result<()> {
        let Some(persisted) = self
            .store
            .get(article_id)
            .await
            .context("load persisted manuscript")?
        else {
            return Ok(());
        };
        if persisted.state != ManuscriptState::Done || persisted.has_complete_audio() {
            return Ok(());
        }
        tracing::error!(
            id = article_id,
            title = %persisted.title,
            "manuscript has no complete audio; force-updating"
        );
        self.update_manuscript(persisted).await
    }

    async fn update_manuscript(&mut self, mut manuscript: Manuscript) -> anyhow::Result<()> {
        manuscript.state = ManuscriptState::Generating;
        manuscript.progress = 0.0;
        manuscript.complete_audio_path = None;
        manuscript.complete_audio_url = None;
        manuscript.transcript = None;
        self.store
            .put(&manuscript)
            .await
            .context("mark generating")?;

        self.synthesizer
            .synthesize(&mut self.pool, &mut manuscript)
            .await?;

        manuscript.state = ManuscriptState::Done;
        manuscript.progress = 1.0;
        self.store.put(&manuscript).await.context("save manuscript")?;
        self.assembler
            .assemble(&manuscript.id)
            .await
            .context("assemble complete audio")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::app::artifact_store::ArtifactLayout;
    use crate::app::manuscript_store::LocalFsManuscriptStore;
    use crate::app::model::{Section, SectionType, spans_from_text};
    use crate::app::queue;
    use crate::app::sentinel::DisallowedPatterns;
    use crate::extract::{ArticleContent, ArticleSource, Fetched};
    use crate::normalize::Normalizer;
    use crate::retry::FailoverController;
    use crate::retry::testing::{RecordingSleeper, ScriptedProvider, pool};
    use crate::voice::{VoiceConfig, VoiceId};

    const SOURCE: &str = "https://wiki.example";

    struct MapSource(HashMap<String, ArticleContent>);

    #[async_trait]
    impl ArticleSource for MapSource {
        async fn fetch(&self, article_id: &str, source_url: &str) -> anyhow::Result<Fetched> {
            Ok(match self.0.get(article_id) {
                Some(content) => Fetched::Article(content.clone()),
                None => Fetched::Unavailable {
                    url: format!("{source_url}/{article_id}"),
                    reason: "status 404".to_owned(),
                },
            })
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        layout: ArtifactLayout,
        store: Arc<dyn ManuscriptStore>,
        provider: Arc<ScriptedProvider>,
        queue: JobQueue,
        worker: Worker,
    }

    impl Harness {
        fn new(always_update: Vec<String>) -> anyhow::Result<Self> {
            let dir = tempfile::tempdir()?;
            let layout = ArtifactLayout::new(dir.path(), "/db");
            let store: Arc<dyn ManuscriptStore> =
                Arc::new(LocalFsManuscriptStore::new(dir.path()));
            let provider = Arc::new(ScriptedProvider::default());

            let content = ArticleContent {
                title: "Foo Bar".to_owned(),
                url: format!("{SOURCE}/Foo_Bar"),
                sections: vec![
                    Section::new(SectionType::P, spans_from_text("Hello there world.")),
                    Section::image("/map.png", "map"),
                ],
                ..ArticleContent::default()
            };
            let source = MapSource(HashMap::from([("Foo_Bar".to_owned(), content)]));

            let controller = FailoverController::new(
                Arc::clone(&provider) as _,
                Arc::new(Normalizer::standard()?),
                Arc::new(RecordingSleeper::default()),
            );
            let voices = ["Ada", "Bea"]
                .into_iter()
                .map(|nickname| VoiceConfig {
                    id: VoiceId::Single(format!("voice-{nickname}")),
                    nickname: nickname.to_owned(),
                    usable: true,
                    model: "m".to_owned(),
                })
                .collect();
            let (queue, receiver) = queue::channel();
            let worker = Worker::new(
                WorkerParts {
                    builder: ManuscriptBuilder::new(
                        layout.clone(),
                        Arc::new(source),
                        DisallowedPatterns::standard()?,
                    ),
                    store: Arc::clone(&store),
                    synthesizer: Synthesizer::new(
                        controller,
                        Arc::clone(&store),
                        voices,
                        "Credit.",
                    ),
                    assembler: Arc::new(Assembler::new(Arc::clone(&store), layout.clone())),
                    freshness: FreshnessPolicy::new(false, always_update),
                    pool: pool(&[("a", true)]),
                    generate: true,
                },
                queue.clone(),
                receiver,
            );
            Ok(Self {
                _dir: dir,
                layout,
                store,
                provider,
                queue,
                worker,
            })
        }

        async fn run(&mut self, article_id: &str) {
            self.queue.enqueue(article_id, SOURCE);
            self.worker.run_until_idle().await;
        }

        fn calls(&self) -> usize {
            self.provider.calls.lock().unwrap().len()
        }
    }

    #[tokio::test]
    async fn new_article_is_generated_then_left_alone() -> anyhow::Result<()> {
        let mut harness = Harness::new(Vec::new())?;
        harness.run("Foo_Bar").await;

        let manuscript = harness.store.get("Foo_Bar").await?.expect("stored");
        assert_eq!(manuscript.state, ManuscriptState::Done);
        assert!(manuscript.has_complete_audio());
        let non_image = manuscript
            .sections
            .iter()
            .filter(|s| s.section_type != SectionType::Img)
            .count();
        assert_eq!(manuscript.transcript.as_ref().map(Vec::len), Some(non_image));
        assert_eq!(harness.calls(), 3);

        harness.run("Foo_Bar").await;
        assert_eq!(harness.calls(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn always_updated_articles_regenerate_every_pass() -> anyhow::Result<()> {
        let mut harness = Harness::new(vec!["Foo_Bar".to_owned()])?;
        harness.run("Foo_Bar").await;
        harness.run("Foo_Bar").await;
        assert_eq!(harness.calls(), 6);
        Ok(())
    }

    #[tokio::test]
    async fn interrupted_shells_and_lost_audio_are_regenerated() -> anyhow::Result<()> {
        let mut harness = Harness::new(Vec::new())?;
        harness
            .store
            .put(&crate::app::sentinel::pending_shell("Foo_Bar", SOURCE))
            .await?;
        harness.run("Foo_Bar").await;
        assert_eq!(harness.calls(), 3);

        std::fs::remove_file(harness.layout.complete_audio_path("Foo_Bar"))?;
        harness.run("Foo_Bar").await;
        assert_eq!(harness.calls(), 6);
        let manuscript = harness.store.get("Foo_Bar").await?.expect("stored");
        assert!(manuscript.has_complete_audio());
        Ok(())
    }

    #[tokio::test]
    async fn missing_articles_store_a_notice_and_generate_the_error_article() -> anyhow::Result<()> {
        let mut harness = Harness::new(Vec::new())?;
        harness.run("Nope").await;

        let notice = harness.store.get("Nope").await?.expect("stored");
        assert_eq!(notice.state, ManuscriptState::Error);
        let sentinel = harness.store.get(ERROR_ID).await?.expect("follow-up stored");
        assert_eq!(sentinel.state, ManuscriptState::Done);
        assert_eq!(notice.sections, sentinel.sections);
        Ok(())
    }

    #[tokio::test]
    async fn pinned_voice_survives_regeneration() -> anyhow::Result<()> {
        let mut harness = Harness::new(vec!["Foo_Bar".to_owned()])?;
        let mut pinned = crate::app::sentinel::pending_shell("Foo_Bar", SOURCE);
        pinned.forced_voice = Some("Bea".to_owned());
        harness.store.put(&pinned).await?;

        harness.run("Foo_Bar").await;
        harness.run("Foo_Bar").await;

        let voices = harness.provider.voices.lock().unwrap().clone();
        assert_eq!(voices.len(), 6);
        assert!(voices.iter().all(|nickname| nickname == "Bea"), "{voices:?}");
        let stored = harness.store.get("Foo_Bar").await?.expect("stored");
        assert_eq!(stored.forced_voice.as_deref(), Some("Bea"));
        Ok(())
    }

    #[tokio::test]
    async fn disabled_generation_skips_items() -> anyhow::Result<()> {
        let mut harness = Harness::new(Vec::new())?;
        harness.worker.generate = false;
        harness.run("Foo_Bar").await;
        assert!(harness.store.get("Foo_Bar").await?.is_none());
        assert_eq!(harness.calls(), 0);
        Ok(())
    }
}
