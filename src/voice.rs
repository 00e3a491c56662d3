use std::path::Path;

use anyhow::Context as _;
use rand::seq::SliceRandom as _;
use serde::{Deserialize, Serialize};

use crate::json_file::read_json;

/// Provider voice id: either one id or candidates tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VoiceId {
    Single(String),
    Candidates(Vec<String>),
}

impl VoiceId {
    pub fn candidates(&self) -> Vec<&str> {
        match self {
            Self::Single(id) => vec![id.as_str()],
            Self::Candidates(ids) => ids.iter().map(String::as_str).collect(),
        }
    }
}

/// A voice as listed in the voices file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub id: VoiceId,
    pub nickname: String,
    #[serde(rename = "use")]
    pub usable: bool,
    pub model: String,
}

/// A voice whose provider-side id has been confirmed for this job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub id: String,
    pub nickname: String,
    pub model: String,
    pub name: Option<String>,
}

pub async fn load_voices(path: &Path) -> anyhow::Result<Vec<VoiceConfig>> {
    let voices: Vec<VoiceConfig> = read_json(path)
        .await
        .with_context(|| format!("read voices: {}", path.display()))?
        .ok_or_else(|| anyhow::anyhow!("voices file not found: {}", path.display()))?;
    if !voices.iter().any(|v| v.usable) {
        anyhow::bail!("no usable voice in {}", path.display());
    }
    Ok(voices)
}

/// Picks a random usable voice unless the manuscript pins a known nickname.
pub fn choose_voice<'a>(
    voices: &'a [VoiceConfig],
    pinned: Option<&str>,
) -> anyhow::Result<&'a VoiceConfig> {
    if let Some(nickname) = pinned {
        match voices.iter().find(|v| v.nickname == nickname) {
            Some(voice) => return Ok(voice),
            None => tracing::warn!(
                nickname,
                "pinned voice is not configured; choosing a random voice"
            ),
        }
    }

    let usable = voices.iter().filter(|v| v.usable).collect::<Vec<_>>();
    usable
        .choose(&mut rand::thread_rng())
        .copied()
        .ok_or_else(|| anyhow::anyhow!("no usable voice configured"))
}
