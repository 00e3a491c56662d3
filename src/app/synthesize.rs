use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;

use crate::alignment::Span;
use crate::app::builder::needs_attribution;
use crate::app::manuscript_store::ManuscriptStore;
use crate::app::model::Manuscript;
use crate::audio::AudioClip;
use crate::credentials::CredentialPool;
use crate::json_file::write_json_atomic;
use crate::normalize::Recombination;
use crate::retry::FailoverController;
use crate::voice::{Voice, VoiceConfig, choose_voice};

pub const DEFAULT_ATTRIBUTION: &str = "All content of this article is the original work of Profound Decisions and can be found on the Empire wikipedia.";

/// Synthesizes every section of a manuscript, then its outro, writing audio and alignment files.
pub struct Synthesizer {
    controller: FailoverController,
    store: Arc<dyn ManuscriptStore>,
    voices: Vec<VoiceConfig>,
    attribution: String,
}

impl Synthesizer {
    pub fn new(
        controller: FailoverController,
        store: Arc<dyn ManuscriptStore>,
        voices: Vec<VoiceConfig>,
        attribution: impl Into<String>,
    ) -> Self {
        Self {
            controller,
            store,
            voices,
            attribution: attribution.into(),
        }
    }

    pub async fn synthesize(
        &self,
        pool: &mut CredentialPool,
        manuscript: &mut Manuscript,
    ) -> anyhow::Result<()> {
        let config = choose_voice(&self.voices, manuscript.forced_voice.as_deref())?;
        tracing::info!(
            id = %manuscript.id,
            title = %manuscript.title,
            voice = %config.nickname,
            forced = manuscript.forced_voice.is_some(),
            "chose voice"
        );
        let voice = self.resolve_voice(pool, config).await?;

        let total = manuscript.sections.len();
        for index in 0..total {
            let section = manuscript.sections[index].clone();
            let text = section.text();
            let text = text.trim();
            if section.section_type.is_audible() && !text.is_empty() {
                let (Some(audio_path), Some(alignment_path)) =
                    (section.audio_path.as_deref(), section.alignment_path.as_deref())
                else {
                    anyhow::bail!("section {index} of {:?} has no artifact paths", manuscript.id);
                };

                let mut synthesis = self
                    .controller
                    .generate(pool, text, &voice)
                    .await
                    .with_context(|| format!("synthesize section {index} of {:?}", manuscript.id))?;
                if section.section_type.is_list() {
                    for item in &section.spans {
                        synthesis.alignment =
                            Recombination::phrase(&item.text).apply(synthesis.alignment);
                    }
                }
                write_artifacts(
                    synthesis.audio,
                    audio_path,
                    &synthesis.alignment,
                    alignment_path,
                )
                .await?;
            }

            manuscript.progress = (index + 1) as f32 / total as f32;
            self.store
                .put(manuscript)
                .await
                .context("save synthesis progress")?;
            tracing::info!(
                id = %manuscript.id,
                section = index,
                total,
                "section synthesized"
            );
        }

        let outro = manuscript
            .outro
            .clone()
            .ok_or_else(|| anyhow::anyhow!("manuscript {:?} has no outro", manuscript.id))?;
        let text = outro_text(&voice, needs_attribution(&manuscript.id).then_some(self.attribution.as_str()));
        let synthesis = self
            .controller
            .generate(pool, &text, &voice)
            .await
            .with_context(|| format!("synthesize outro of {:?}", manuscript.id))?;
        let alignment_path = outro.audio_path.with_extension("json");
        write_artifacts(
            synthesis.audio,
            &outro.audio_path,
            &synthesis.alignment,
            &alignment_path,
        )
        .await?;

        tracing::info!(id = %manuscript.id, title = %manuscript.title, "all audio segments generated");
        Ok(())
    }

    async fn resolve_voice(
        &self,
        pool: &mut CredentialPool,
        config: &VoiceConfig,
    ) -> anyhow::Result<Voice> {
        if let Some(credential) = pool.current().cloned() {
            return self
                .controller
                .provider()
                .resolve_voice(config, &credential)
                .await
                .with_context(|| format!("resolve voice {:?}", config.nickname));
        }

        let id = config
            .id
            .candidates()
            .first()
            .map(|id| (*id).to_owned())
            .ok_or_else(|| anyhow::anyhow!("voice {:?} has no id", config.nickname))?;
        tracing::warn!(voice = %config.nickname, "no usable credential to resolve voice; using first id");
        Ok(Voice {
            id,
            nickname: config.nickname.clone(),
            model: config.model.clone(),
            name: None,
        })
    }
}

pub fn outro_text(voice: &Voice, attribution: Option<&str>) -> String {
    let mut text = format!(
        "This article was read aloud by the artificial voice, \"{}\".",
        voice.nickname
    );
    if let Some(attribution) = attribution.filter(|a| !a.trim().is_empty()) {
        text.push(' ');
        text.push_str(attribution.trim());
    }
    text.push_str(" Thank you for listening.");
    text
}

async fn write_artifacts(
    audio: AudioClip,
    audio_path: &Path,
    alignment: &[Span],
    alignment_path: &Path,
) -> anyhow::Result<()> {
    if let Some(parent) = audio_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create audio dir: {}", parent.display()))?;
    }
    let path: PathBuf = audio_path.to_path_buf();
    tokio::task::spawn_blocking(move || audio.write_wav(&path))
        .await
        .context("join wav writer")??;
    write_json_atomic(alignment_path, alignment)
        .await
        .with_context(|| format!("write alignment: {}", alignment_path.display()))
}
