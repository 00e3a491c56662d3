use async_trait::async_trait;

use crate::alignment::Span;
use crate::audio::AudioClip;
use crate::credentials::Credential;
use crate::voice::{Voice, VoiceConfig};

/// Audio for one utterance plus its word alignment.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub audio: AudioClip,
    pub alignment: Vec<Span>,
}

/// Failure kinds a speech provider can report for a single synthesis session.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("remaining quota {remaining} is below the safe margin {margin}")]
    SafeQuotaStop { remaining: i64, margin: i64 },
    #[error("system busy: {0}")]
    SystemBusy(String),
    #[error("input timeout exceeded: {0}")]
    InputTimeoutExceeded(String),
    #[error("provider error ({code}): {message}")]
    Provider { code: String, message: String },
    #[error("voice {voice:?} not found: {message}")]
    VoiceNotFound { voice: String, message: String },
    #[error("unusual activity detected: {0}")]
    UnusualActivity(String),
    #[error("connection rejected by provider: {0}")]
    ConnectionRejected(String),
    #[error("connection closed unexpectedly: {0}")]
    ConnectionClosed(String),
}

impl SynthesisError {
    /// Maps a provider error code to its kind; unknown codes become generic provider errors.
    pub fn from_code(code: &str, message: String, voice: &Voice) -> Self {
        match code {
            "quota_exceeded" => Self::QuotaExceeded(message),
            "system_busy" => Self::SystemBusy(message),
            "input_timeout_exceeded" => Self::InputTimeoutExceeded(message),
            "voice_id_does_not_exist" => Self::VoiceNotFound {
                voice: voice.id.clone(),
                message,
            },
            "detected_unusual_activity" => Self::UnusualActivity(message),
            other => Self::Provider {
                code: other.to_owned(),
                message,
            },
        }
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::Provider {
            code: "something_went_wrong".to_owned(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Confirms which configured id the provider accepts and looks up its display name.
    async fn resolve_voice(
        &self,
        voice: &VoiceConfig,
        credential: &Credential,
    ) -> anyhow::Result<Voice>;

    async fn synthesize(
        &self,
        text: &str,
        voice: &Voice,
        credential: &Credential,
    ) -> Result<Synthesis, SynthesisError>;
}
