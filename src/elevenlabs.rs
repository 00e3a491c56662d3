use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use futures_util::{SinkExt as _, StreamExt as _};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::alignment::{AlignmentBuilder, CharTimings};
use crate::audio::AudioClip;
use crate::credentials::Credential;
use crate::provider::{SpeechProvider, Synthesis, SynthesisError};
use crate::voice::{Voice, VoiceConfig};

pub const DEFAULT_API_URL: &str = "https://api.elevenlabs.io";
pub const DEFAULT_WS_URL: &str = "wss://api.elevenlabs.io";

const API_KEY_HEADER: &str = "xi-api-key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_url: String,
    pub ws_url: String,
    pub sample_rate: u32,
    pub safe_quota_margin: i64,
}

impl ElevenLabsConfig {
    fn subscription_endpoint(&self) -> String {
        format!("{}/v1/user/subscription", self.api_url.trim_end_matches('/'))
    }

    fn voice_endpoint(&self, voice_id: &str) -> String {
        format!("{}/v1/voices/{voice_id}", self.api_url.trim_end_matches('/'))
    }

    fn stream_endpoint(&self, voice: &Voice) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream-input?output_format=pcm_{}&model_id={}",
            self.ws_url.trim_end_matches('/'),
            voice.id,
            self.sample_rate,
            voice.model
        )
    }
}

/// Streaming ElevenLabs text-to-speech over the `stream-input` websocket.
#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    client: reqwest::Client,
    config: ElevenLabsConfig,
}

#[derive(Debug, Deserialize)]
struct Subscription {
    character_count: i64,
    character_limit: i64,
}

#[derive(Debug, Deserialize)]
struct VoiceDetails {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct StreamMessage {
    error: Option<String>,
    message: Option<String>,
    audio: Option<String>,
    alignment: Option<CharTimings>,
    #[serde(rename = "isFinal")]
    is_final: Option<bool>,
}

impl ElevenLabsClient {
    pub fn new(config: ElevenLabsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn check_quota(&self, credential: &Credential) -> Result<(), SynthesisError> {
        let response = self
            .client
            .get(self.config.subscription_endpoint())
            .header(API_KEY_HEADER, &credential.secret)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|err| SynthesisError::generic(format!("subscription lookup: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                credential = %credential.identity,
                %status,
                body = %body,
                "subscription lookup failed; skipping quota check"
            );
            return Ok(());
        }

        let subscription: Subscription = response
            .json()
            .await
            .map_err(|err| SynthesisError::generic(format!("parse subscription: {err}")))?;
        let remaining = subscription.character_limit - subscription.character_count;
        if remaining < self.config.safe_quota_margin {
            return Err(SynthesisError::SafeQuotaStop {
                remaining,
                margin: self.config.safe_quota_margin,
            });
        }
        Ok(())
    }

    async fn lookup_voice_name(&self, voice_id: &str, credential: &Credential) -> Option<String> {
        let response = self
            .client
            .get(self.config.voice_endpoint(voice_id))
            .header(API_KEY_HEADER, &credential.secret)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await;
        let response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::debug!(voice_id, status = %response.status(), "voice lookup rejected");
                return None;
            }
            Err(err) => {
                tracing::warn!(voice_id, ?err, "voice lookup failed");
                return None;
            }
        };
        match response.json::<VoiceDetails>().await {
            Ok(details) => Some(details.name),
            Err(err) => {
                tracing::warn!(voice_id, ?err, "voice lookup returned malformed json");
                None
            }
        }
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsClient {
    async fn resolve_voice(
        &self,
        voice: &VoiceConfig,
        credential: &Credential,
    ) -> anyhow::Result<Voice> {
        let candidates = voice.id.candidates();
        let Some(first) = candidates.first() else {
            anyhow::bail!("voice {:?} has no id", voice.nickname);
        };

        for id in &candidates {
            if let Some(name) = self.lookup_voice_name(id, credential).await {
                tracing::info!(nickname = %voice.nickname, voice_id = %id, name = %name, "resolved voice");
                return Ok(Voice {
                    id: (*id).to_owned(),
                    nickname: voice.nickname.clone(),
                    model: voice.model.clone(),
                    name: Some(name),
                });
            }
        }

        tracing::warn!(
            nickname = %voice.nickname,
            credential = %credential.identity,
            candidates = ?candidates,
            "no voice id accepted by provider; using the first candidate"
        );
        Ok(Voice {
            id: (*first).to_owned(),
            nickname: voice.nickname.clone(),
            model: voice.model.clone(),
            name: None,
        })
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &Voice,
        credential: &Credential,
    ) -> Result<Synthesis, SynthesisError> {
        self.check_quota(credential).await?;

        let url = self.config.stream_endpoint(voice);
        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|err| match err {
                tungstenite::Error::Http(response) => {
                    SynthesisError::ConnectionRejected(format!("handshake status {}", response.status()))
                }
                other => SynthesisError::ConnectionClosed(format!("connect: {other}")),
            })?;

        let utterance = serde_json::json!({
            "text": text,
            "try_trigger_generation": true,
            "xi-api-key": credential.secret,
        });
        for body in [utterance, serde_json::json!({ "text": "" })] {
            ws.send(Message::text(body.to_string()))
                .await
                .map_err(|err| SynthesisError::ConnectionClosed(format!("send: {err}")))?;
        }

        let mut pcm = Vec::new();
        let mut alignment = AlignmentBuilder::new();
        loop {
            let frame = match ws.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(err)) => return Err(SynthesisError::ConnectionClosed(err.to_string())),
                None => {
                    return Err(SynthesisError::ConnectionClosed(
                        "stream ended before the final message".to_owned(),
                    ));
                }
            };
            let payload = match &frame {
                Message::Text(_) => frame
                    .to_text()
                    .map_err(|err| SynthesisError::generic(format!("read frame: {err}")))?,
                Message::Close(close) => {
                    return Err(SynthesisError::ConnectionClosed(format!("closed: {close:?}")));
                }
                _ => continue,
            };

            let message: StreamMessage = serde_json::from_str(payload)
                .map_err(|err| SynthesisError::generic(format!("parse stream message: {err}")))?;
            if let Some(code) = message.error {
                return Err(SynthesisError::from_code(
                    &code,
                    message.message.unwrap_or_default(),
                    voice,
                ));
            }
            if let Some(chunk) = message.audio.filter(|chunk| !chunk.is_empty()) {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(chunk)
                    .map_err(|err| SynthesisError::generic(format!("decode audio chunk: {err}")))?;
                pcm.extend_from_slice(&bytes);
            }
            if let Some(batch) = &message.alignment {
                alignment.push_batch(batch);
            }
            if message.is_final == Some(true) {
                break;
            }
        }
        if let Err(err) = ws.close(None).await {
            tracing::debug!(voice_id = %voice.id, %err, "closing synthesis stream failed");
        }

        let audio = AudioClip::from_pcm_le(self.config.sample_rate, &pcm)
            .map_err(|err| SynthesisError::generic(format!("decode audio: {err:#}")))?;
        Ok(Synthesis {
            audio,
            alignment: alignment.finish(),
        })
    }
}
