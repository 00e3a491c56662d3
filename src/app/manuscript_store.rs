use std::path::PathBuf;

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;

use crate::app::artifact_store::ArtifactLayout;
use crate::app::model::{Manuscript, check_article_id};
use crate::json_file::{read_json, write_json_atomic, write_json_new};

#[async_trait]
pub trait ManuscriptStore: Send + Sync {
    async fn get(&self, article_id: &str) -> anyhow::Result<Option<Manuscript>>;
    /// Inserts or wholesale replaces the document with the same id.
    async fn put(&self, manuscript: &Manuscript) -> anyhow::Result<()>;
    /// Stores the document only when none exists yet; returns whether it was stored.
    async fn put_new(&self, manuscript: &Manuscript) -> anyhow::Result<bool>;
    /// All stored manuscripts, sorted by id.
    async fn list(&self) -> anyhow::Result<Vec<Manuscript>>;
}

#[derive(Debug, Clone)]
pub struct LocalFsManuscriptStore {
    base_dir: PathBuf,
}

impl LocalFsManuscriptStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn manuscript_json_path(&self, article_id: &str) -> anyhow::Result<PathBuf> {
        check_article_id(article_id)?;
        Ok(self
            .base_dir
            .join(ArtifactLayout::dir_name(article_id))
            .join("manuscript.json"))
    }
}

#[async_trait]
impl ManuscriptStore for LocalFsManuscriptStore {
    async fn get(&self, article_id: &str) -> anyhow::Result<Option<Manuscript>> {
        let path = self.manuscript_json_path(article_id)?;
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn put(&self, manuscript: &Manuscript) -> anyhow::Result<()> {
        let path = self.manuscript_json_path(&manuscript.id)?;
        write_json_atomic(&path, manuscript)
            .await
            .with_context(|| format!("write manuscript: {}", path.display()))
    }

    async fn put_new(&self, manuscript: &Manuscript) -> anyhow::Result<bool> {
        let path = self.manuscript_json_path(&manuscript.id)?;
        write_json_new(&path, manuscript)
            .await
            .with_context(|| format!("create manuscript: {}", path.display()))
    }

    async fn list(&self) -> anyhow::Result<Vec<Manuscript>> {
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("read db dir: {}", self.base_dir.display()));
            }
        };

        let mut manuscripts = Vec::new();
        while let Some(entry) = entries.next_entry().await.context("read db dir entry")? {
            let path = entry.path().join("manuscript.json");
            match read_json::<Manuscript>(&path).await {
                Ok(Some(manuscript)) => manuscripts.push(manuscript),
                Ok(None) => {}
                Err(err) => tracing::warn!(path = %path.display(), ?err, "skipping unreadable manuscript"),
            }
        }
        manuscripts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(manuscripts)
    }
}
