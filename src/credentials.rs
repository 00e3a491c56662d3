use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::json_file::{read_json, write_json_atomic};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "username")]
    pub identity: String,
    #[serde(rename = "key")]
    pub secret: String,
    #[serde(rename = "use")]
    pub usable: bool,
}

impl Credential {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
            usable: true,
        }
    }
}

/// Outcome of moving past a credential that ran out of quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Another usable credential follows the exhausted one.
    Next,
    /// Every credential after the pointer is used up; the pointer is back at the first entry.
    Cycled,
}

/// Ordered synthesis credentials plus the rotation pointer.
///
/// Entries are never removed, so rotation order stays stable for the lifetime of the process.
/// Deactivations are written back to `persist_path` when one is configured.
#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
    pointer: usize,
    persist_path: Option<PathBuf>,
}

impl CredentialPool {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials,
            pointer: 0,
            persist_path: None,
        }
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let credentials: Vec<Credential> = read_json(path)
            .await
            .with_context(|| format!("read credentials: {}", path.display()))?
            .ok_or_else(|| anyhow::anyhow!("credentials file not found: {}", path.display()))?;
        if credentials.is_empty() {
            anyhow::bail!("credentials file is empty: {}", path.display());
        }
        tracing::info!(
            total = credentials.len(),
            usable = credentials.iter().filter(|c| c.usable).count(),
            "loaded credentials"
        );
        Ok(Self {
            credentials,
            pointer: 0,
            persist_path: Some(path.to_path_buf()),
        })
    }

    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn reset(&mut self) {
        self.pointer = 0;
    }

    /// Returns the credential at the pointer, first skipping (circularly) over unusable ones.
    pub fn current(&mut self) -> Option<&Credential> {
        let len = self.credentials.len();
        let idx = (0..len)
            .map(|step| (self.pointer + step) % len)
            .find(|&idx| self.credentials[idx].usable)?;
        self.pointer = idx;
        Some(&self.credentials[idx])
    }

    /// Moves to the next usable credential after the pointer without wrapping.
    pub fn advance(&mut self) -> Advance {
        let next = (self.pointer + 1..self.credentials.len()).find(|&idx| self.credentials[idx].usable);
        match next {
            Some(idx) => {
                self.pointer = idx;
                Advance::Next
            }
            None => {
                self.pointer = 0;
                Advance::Cycled
            }
        }
    }

    /// Benches the credential at the pointer for the rest of the run and persists the set.
    pub async fn deactivate_current(&mut self) -> anyhow::Result<()> {
        let Some(credential) = self.credentials.get_mut(self.pointer) else {
            return Ok(());
        };
        credential.usable = false;
        tracing::error!(
            credential = %credential.identity,
            "unusual activity detected; credential deactivated"
        );

        if let Some(path) = &self.persist_path {
            write_json_atomic(path, &self.credentials)
                .await
                .with_context(|| format!("persist credentials: {}", path.display()))?;
        }
        Ok(())
    }
}
