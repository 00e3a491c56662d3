use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ManuscriptState {
    Generating,
    Done,
    Error,
    Disallowed,
}

impl ManuscriptState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Error => "error",
            Self::Disallowed => "disallowed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    H1,
    H2,
    H3,
    H4,
    P,
    Ul,
    Ol,
    Cite,
    Img,
    #[serde(other)]
    Other,
}

impl SectionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::H1 => "h1",
            Self::H2 => "h2",
            Self::H3 => "h3",
            Self::H4 => "h4",
            Self::P => "p",
            Self::Ul => "ul",
            Self::Ol => "ol",
            Self::Cite => "cite",
            Self::Img => "img",
            Self::Other => "other",
        }
    }

    pub fn is_audible(self) -> bool {
        self != Self::Img
    }

    pub fn is_list(self) -> bool {
        matches!(self, Self::Ul | Self::Ol)
    }

    /// Silence inserted before a section of this type in the complete audio.
    pub fn pre_delay_ms(self) -> Option<u64> {
        match self {
            Self::H1 => Some(2000),
            Self::H2 => Some(1000),
            Self::H3 | Self::H4 | Self::P | Self::Ul | Self::Ol | Self::Cite => Some(500),
            Self::Img | Self::Other => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    pub section_type: SectionType,
    #[serde(default)]
    pub spans: Vec<TextSpan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

impl Section {
    pub fn new(section_type: SectionType, spans: Vec<TextSpan>) -> Self {
        Self {
            section_type,
            spans,
            audio_path: None,
            audio_url: None,
            alignment_path: None,
            alignment_url: None,
            src: None,
            alt: None,
        }
    }

    pub fn image(src: impl Into<String>, alt: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
            alt: Some(alt.into()),
            ..Self::new(SectionType::Img, Vec::new())
        }
    }

    /// Span texts joined by single spaces, as sent to synthesis.
    pub fn text(&self) -> String {
        self.spans
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Outro {
    pub audio_path: PathBuf,
    pub audio_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptEntry {
    #[serde(rename = "type")]
    pub section_type: SectionType,
    pub body: String,
    #[serde(rename = "startTime")]
    pub start_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manuscript {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub state: ManuscriptState,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outro: Option<Outro>,
    #[serde(default = "Utc::now")]
    pub lastmod: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete_audio_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete_audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Vec<TranscriptEntry>>,
    #[serde(default)]
    pub progress: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
}

impl Manuscript {
    pub fn new(id: impl Into<String>, title: impl Into<String>, state: ManuscriptState) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: None,
            state,
            group: String::new(),
            categories: Vec::new(),
            sections: Vec::new(),
            outro: None,
            lastmod: Utc::now(),
            created: None,
            complete_audio_path: None,
            complete_audio_url: None,
            transcript: None,
            progress: 0.0,
            forced_voice: None,
            img: None,
        }
    }

    /// Title, url and sections differ; everything else is generation bookkeeping.
    pub fn content_differs(&self, other: &Manuscript) -> bool {
        self.title != other.title || self.url != other.url || self.sections != other.sections
    }

    /// Whether the assembled audio is recorded and still present on disk.
    pub fn has_complete_audio(&self) -> bool {
        self.complete_audio_url.is_some()
            && self.transcript.is_some()
            && self
                .complete_audio_path
                .as_deref()
                .is_some_and(|path| path.exists())
    }
}

/// One span per whitespace-separated word, with en dashes spoken as hyphens.
pub fn spans_from_text(text: &str) -> Vec<TextSpan> {
    text.split_whitespace()
        .map(|word| TextSpan {
            text: word.replace('–', "-"),
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
#[error("invalid article id {0:?}")]
pub struct InvalidArticleId(pub String);

/// An id must name a directory below the db dir.
pub fn check_article_id(article_id: &str) -> Result<(), InvalidArticleId> {
    let escapes = article_id.starts_with('/')
        || article_id.contains(['\\', '\0'])
        || article_id
            .split('/')
            .any(|part| part == "." || part == "..");
    if escapes {
        return Err(InvalidArticleId(article_id.to_owned()));
    }
    Ok(())
}

/// Article ids are stored with underscores in place of spaces.
pub fn id_from_article(article_id: &str) -> Result<String, InvalidArticleId> {
    let id = article_id.trim_matches('/').replace(' ', "_");
    check_article_id(&id)?;
    Ok(id)
}
