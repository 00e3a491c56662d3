use std::sync::Arc;

use anyhow::Context as _;

use crate::app::artifact_store::ArtifactLayout;
use crate::app::manuscript_store::ManuscriptStore;
use crate::app::model::{Manuscript, ManuscriptState, Outro, Section, TranscriptEntry};
use crate::audio::AudioClip;

const DEFAULT_PRE_DELAY_MS: u64 = 1000;
const OUTRO_PRE_DELAY_MS: u64 = 2000;
const OUTRO_POST_SILENCE_MS: u64 = 4000;

/// Joins section audio into the single file offered for download and podcast playback.
pub struct Assembler {
    store: Arc<dyn ManuscriptStore>,
    layout: ArtifactLayout,
}

impl Assembler {
    pub fn new(store: Arc<dyn ManuscriptStore>, layout: ArtifactLayout) -> Self {
        Self { store, layout }
    }

    pub async fn assemble(&self, article_id: &str) -> anyhow::Result<Manuscript> {
        let mut manuscript = self
            .store
            .get(article_id)
            .await
            .context("load manuscript")?
            .ok_or_else(|| anyhow::anyhow!("manuscript not found: {article_id:?}"))?;
        if manuscript.state == ManuscriptState::Generating {
            anyhow::bail!("manuscript {article_id:?} is still generating");
        }
        tracing::info!(id = article_id, title = %manuscript.title, "assembling complete audio");

        let sections = manuscript.sections.clone();
        let outro = manuscript.outro.clone();
        let (audio, transcript) =
            tokio::task::spawn_blocking(move || assemble_audio(&sections, outro.as_ref()))
                .await
                .context("join audio assembly")??;

        let path = self.layout.complete_audio_path(article_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create audio dir: {}", parent.display()))?;
        }
        let out = path.clone();
        tokio::task::spawn_blocking(move || audio.write_wav(&out))
            .await
            .context("join wav writer")??;

        manuscript.complete_audio_path = Some(path);
        manuscript.complete_audio_url = Some(self.layout.complete_audio_url(article_id));
        manuscript.transcript = Some(transcript);
        self.store
            .put(&manuscript)
            .await
            .context("save complete audio")?;
        tracing::info!(id = article_id, title = %manuscript.title, "complete audio generated");
        Ok(manuscript)
    }
}

/// Concatenates spoken sections with type-dependent pauses, then the outro and trailing silence.
pub fn assemble_audio(
    sections: &[Section],
    outro: Option<&Outro>,
) -> anyhow::Result<(AudioClip, Vec<TranscriptEntry>)> {
    let mut complete: Option<AudioClip> = None;
    let mut transcript = Vec::new();

    for section in sections {
        let body = section.text();
        if !section.section_type.is_audible() || body.trim().is_empty() {
            continue;
        }
        let path = section
            .audio_path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("{} section has no audio", section.section_type.as_str()))?;
        let clip = AudioClip::read_wav(path)?;

        if let Some(complete) = complete.as_mut() {
            let delay = section.section_type.pre_delay_ms().unwrap_or_else(|| {
                tracing::warn!(
                    section_type = section.section_type.as_str(),
                    "no pre-delay for section type; using default"
                );
                DEFAULT_PRE_DELAY_MS
            });
            complete.append_silence(delay);
        }
        let complete =
            complete.get_or_insert_with(|| AudioClip::new(clip.sample_rate(), Vec::new()));

        transcript.push(TranscriptEntry {
            section_type: section.section_type,
            body,
            start_time: complete.duration_secs(),
        });
        complete.append(&clip)?;
    }

    let Some(mut complete) = complete else {
        anyhow::bail!("no sections to assemble");
    };

    match outro.filter(|o| o.audio_path.exists()) {
        Some(outro) => {
            complete.append_silence(OUTRO_PRE_DELAY_MS);
            complete.append(&AudioClip::read_wav(&outro.audio_path)?)?;
        }
        None => tracing::warn!("manuscript has no outro audio"),
    }
    complete.append_silence(OUTRO_POST_SILENCE_MS);

    Ok((complete, transcript))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::app::manuscript_store::LocalFsManuscriptStore;
    use crate::app::model::{SectionType, TextSpan};

    const RATE: u32 = 1000;

    fn spoken(layout: &ArtifactLayout, index: usize, kind: SectionType, millis: u64) -> anyhow::Result<Section> {
        let mut section = Section::new(
            kind,
            vec![TextSpan {
                text: format!("section {index}"),
            }],
        );
        layout.assign_section("a", index, &mut section);
        let path = section.audio_path.clone().unwrap();
        std::fs::create_dir_all(path.parent().unwrap())?;
        AudioClip::silence(RATE, millis).write_wav(&path)?;
        Ok(section)
    }

    fn write_outro(layout: &ArtifactLayout, millis: u64) -> anyhow::Result<Outro> {
        let outro = layout.outro("a");
        AudioClip::silence(RATE, millis).write_wav(&outro.audio_path)?;
        Ok(outro)
    }

    #[test]
    fn start_times_include_type_delays() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let layout = ArtifactLayout::new(dir.path(), "/db");
        let sections = vec![
            spoken(&layout, 0, SectionType::H1, 1500)?,
            Section::image("/a.png", "a"),
            spoken(&layout, 2, SectionType::P, 1000)?,
        ];
        let outro = write_outro(&layout, 700)?;

        let (audio, transcript) = assemble_audio(&sections, Some(&outro))?;

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].start_time, 0.0);
        assert!((transcript[1].start_time - 2.0).abs() < 1e-9);
        assert_eq!(transcript[1].body, "section 2");
        let expected = 1.5 + 0.5 + 1.0 + 2.0 + 0.7 + 4.0;
        assert!((audio.duration_secs() - expected).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn nothing_to_assemble_is_an_error() {
        let sections = vec![Section::image("/a.png", "a")];
        assert!(assemble_audio(&sections, None).is_err());
    }

    #[tokio::test]
    async fn assembly_records_the_complete_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let layout = ArtifactLayout::new(dir.path(), "/db");
        let store: Arc<dyn ManuscriptStore> = Arc::new(LocalFsManuscriptStore::new(dir.path()));

        let mut manuscript = Manuscript::new("a", "A", ManuscriptState::Generating);
        manuscript.sections = vec![spoken(&layout, 0, SectionType::H2, 300)?];
        manuscript.outro = Some(write_outro(&layout, 300)?);
        store.put(&manuscript).await?;

        let assembler = Assembler::new(Arc::clone(&store), layout.clone());
        assert!(assembler.assemble("a").await.is_err());

        manuscript.state = ManuscriptState::Done;
        store.put(&manuscript).await?;
        let assembled = assembler.assemble("a").await?;

        assert!(assembled.has_complete_audio());
        assert_eq!(
            assembled.complete_audio_path.as_deref(),
            Some(layout.complete_audio_path("a").as_path())
        );
        assert_eq!(assembled.complete_audio_url.as_deref(), Some("/db/a/audio/complete.wav"));
        assert!(Path::new(&layout.complete_audio_path("a")).exists());
        Ok(())
    }
}
