use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use rand::Rng as _;
use tokio_util::sync::CancellationToken;

use crate::credentials::{Advance, CredentialPool};
use crate::normalize::Normalizer;
use crate::provider::{SpeechProvider, Synthesis, SynthesisError};
use crate::voice::Voice;

/// Waits between attempts; implementations must return early when the process shuts down.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct TokioSleeper {
    shutdown: CancellationToken,
}

impl TokioSleeper {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }
}

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) -> anyhow::Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.shutdown.cancelled() => anyhow::bail!("shutdown requested while waiting"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryDelays {
    pub long: Duration,
    pub short: Duration,
    pub rotation_min: Duration,
    pub rotation_max: Duration,
    pub exhausted_initial: Duration,
    pub exhausted_cap: Duration,
}

impl Default for RetryDelays {
    fn default() -> Self {
        Self {
            long: Duration::from_secs(10 * 60),
            short: Duration::from_secs(10),
            rotation_min: Duration::from_secs(10),
            rotation_max: Duration::from_secs(60),
            exhausted_initial: Duration::from_secs(60 * 60),
            exhausted_cap: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl RetryDelays {
    fn rotation_jitter(&self) -> Duration {
        if self.rotation_max <= self.rotation_min {
            return self.rotation_min;
        }
        rand::thread_rng().gen_range(self.rotation_min..=self.rotation_max)
    }
}

/// Wait before retrying once every credential is out of quota: doubles per cycle, capped.
#[derive(Debug, Clone)]
pub struct ExhaustionBackoff {
    next: Duration,
    cap: Duration,
}

impl ExhaustionBackoff {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self {
            next: initial.min(cap),
            cap,
        }
    }

    pub fn next_wait(&mut self) -> Duration {
        let wait = self.next;
        self.next = self.next.saturating_mul(2).min(self.cap);
        wait
    }
}

/// Drives one text through the provider until it succeeds, rotating credentials as needed.
pub struct FailoverController {
    provider: Arc<dyn SpeechProvider>,
    normalizer: Arc<Normalizer>,
    sleeper: Arc<dyn Sleeper>,
    delays: RetryDelays,
}

impl FailoverController {
    pub fn new(
        provider: Arc<dyn SpeechProvider>,
        normalizer: Arc<Normalizer>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            provider,
            normalizer,
            sleeper,
            delays: RetryDelays::default(),
        }
    }

    pub fn with_delays(mut self, delays: RetryDelays) -> Self {
        self.delays = delays;
        self
    }

    pub fn provider(&self) -> &dyn SpeechProvider {
        self.provider.as_ref()
    }

    pub async fn generate(
        &self,
        pool: &mut CredentialPool,
        text: &str,
        voice: &Voice,
    ) -> anyhow::Result<Synthesis> {
        let text = self.normalizer.for_speech(text);
        // Escalation restarts with every call.
        let mut backoff =
            ExhaustionBackoff::new(self.delays.exhausted_initial, self.delays.exhausted_cap);

        loop {
            let Some(credential) = pool.current().cloned() else {
                let wait = backoff.next_wait();
                tracing::error!(
                    wait_secs = wait.as_secs(),
                    "no usable credential left; waiting before retrying"
                );
                self.wait(wait).await?;
                continue;
            };

            let err = match self.provider.synthesize(&text, voice, &credential).await {
                Ok(mut synthesis) => {
                    synthesis.alignment = self.normalizer.for_transcript(synthesis.alignment);
                    return Ok(synthesis);
                }
                Err(err) => err,
            };

            match err {
                SynthesisError::VoiceNotFound { ref voice, .. } => {
                    tracing::warn!(
                        credential = %credential.identity,
                        voice_id = %voice,
                        %err,
                        "voice id not recognised; add the voice to the account library. retrying"
                    );
                    self.wait(self.delays.long).await?;
                }
                SynthesisError::Provider { .. } => {
                    tracing::warn!(%err, "provider error; retrying");
                    self.wait(self.delays.long).await?;
                }
                SynthesisError::SystemBusy(_)
                | SynthesisError::InputTimeoutExceeded(_)
                | SynthesisError::ConnectionClosed(_) => {
                    tracing::warn!(%err, "transient provider failure; retrying");
                    self.wait(self.delays.short).await?;
                }
                SynthesisError::QuotaExceeded(_) | SynthesisError::SafeQuotaStop { .. } => {
                    let safe_stop = matches!(err, SynthesisError::SafeQuotaStop { .. });
                    match pool.advance() {
                        Advance::Next => {
                            tracing::warn!(
                                credential = %credential.identity,
                                %err,
                                "credential out of quota; trying next credential"
                            );
                            if !safe_stop {
                                self.wait(self.delays.rotation_jitter()).await?;
                            }
                        }
                        Advance::Cycled => {
                            let wait = backoff.next_wait();
                            tracing::warn!(
                                wait_secs = wait.as_secs(),
                                "all credentials out of quota; waiting for quota reset"
                            );
                            self.wait(wait).await?;
                        }
                    }
                }
                SynthesisError::UnusualActivity(_) => {
                    pool.deactivate_current()
                        .await
                        .context("deactivate credential")?;
                    self.wait(self.delays.rotation_jitter()).await?;
                }
                SynthesisError::ConnectionRejected(_) => {
                    return Err(err).context("synthesis connection rejected");
                }
            }
        }
    }

    async fn wait(&self, duration: Duration) -> anyhow::Result<()> {
        self.sleeper.sleep(duration).await
    }
}
