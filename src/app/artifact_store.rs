use std::path::{Path, PathBuf};

use crate::app::model::{Manuscript, Outro, Section};

const AUDIO_DIR_NAME: &str = "audio";
const HOME_DIR_NAME: &str = "home";
const COMPLETE_AUDIO_FILE: &str = "complete.wav";

/// Where generated audio and alignment files live on disk and how they are served.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    db_dir: PathBuf,
    public_prefix: String,
}

impl ArtifactLayout {
    pub fn new(db_dir: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            db_dir: db_dir.into(),
            public_prefix: public_prefix.into(),
        }
    }

    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    /// Directory name for an article id; the home article has an empty id.
    pub fn dir_name(article_id: &str) -> &str {
        if article_id.is_empty() {
            HOME_DIR_NAME
        } else {
            article_id
        }
    }

    pub fn manuscript_dir(&self, article_id: &str) -> PathBuf {
        self.db_dir.join(Self::dir_name(article_id))
    }

    pub fn audio_dir(&self, article_id: &str) -> PathBuf {
        self.manuscript_dir(article_id).join(AUDIO_DIR_NAME)
    }

    fn public_url(&self, article_id: &str, file_name: &str) -> String {
        let url = format!(
            "{}/{}/{AUDIO_DIR_NAME}/{file_name}",
            self.public_prefix.trim_end_matches('/'),
            Self::dir_name(article_id)
        );
        escape_public_url(&url)
    }

    /// Fills in audio and alignment locations for section `index` of `article_id`.
    pub fn assign_section(&self, article_id: &str, index: usize, section: &mut Section) {
        let audio = format!("{index:04}.wav");
        let alignment = format!("{index:04}.json");
        let dir = self.audio_dir(article_id);
        section.audio_url = Some(self.public_url(article_id, &audio));
        section.alignment_url = Some(self.public_url(article_id, &alignment));
        section.audio_path = Some(dir.join(audio));
        section.alignment_path = Some(dir.join(alignment));
    }

    pub fn outro(&self, article_id: &str) -> Outro {
        Outro {
            audio_path: self.audio_dir(article_id).join("outro.wav"),
            audio_url: self.public_url(article_id, "outro.wav"),
        }
    }

    pub fn complete_audio_path(&self, article_id: &str) -> PathBuf {
        self.audio_dir(article_id).join(COMPLETE_AUDIO_FILE)
    }

    pub fn complete_audio_url(&self, article_id: &str) -> String {
        self.public_url(article_id, COMPLETE_AUDIO_FILE)
    }
}

/// Artifact files a finished manuscript needs, and how many of them exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactCount {
    pub present: usize,
    pub required: usize,
}

impl ArtifactCount {
    pub fn is_complete(&self) -> bool {
        self.present >= self.required
    }
}

pub fn count_artifacts(manuscript: &Manuscript) -> ArtifactCount {
    let mut required = Vec::new();
    for section in &manuscript.sections {
        if !section.section_type.is_audible() || section.text().trim().is_empty() {
            continue;
        }
        required.push(section.audio_path.as_deref());
        required.push(section.alignment_path.as_deref());
    }
    required.push(manuscript.outro.as_ref().map(|o| o.audio_path.as_path()));

    ArtifactCount {
        present: required
            .iter()
            .filter(|path| path.is_some_and(|p| p.exists()))
            .count(),
        required: required.len(),
    }
}

fn escape_public_url(url: &str) -> String {
    let url = url.split('#').next().unwrap_or_default();
    url.replace('?', "%3F")
}
