use std::sync::Arc;

use axum::http::StatusCode;

use crate::app::assemble::Assembler;
use crate::app::manuscript_store::ManuscriptStore;
use crate::app::model::{
    InvalidArticleId, Manuscript, ManuscriptState, SectionType, id_from_article,
};
use crate::app::queue::JobQueue;
use crate::app::sentinel::{DISALLOWED_ID, ERROR_ID, new_article_placeholder, pending_shell};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("article {0:?} has not been generated")]
    NotGenerated(String),
    #[error(transparent)]
    InvalidId(#[from] InvalidArticleId),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotGenerated(_) => StatusCode::CONFLICT,
            Self::InvalidId(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// What request handlers may do: enqueue work and read manuscripts.
#[derive(Clone)]
pub struct ManuscriptService {
    store: Arc<dyn ManuscriptStore>,
    queue: JobQueue,
    assembler: Arc<Assembler>,
    default_source_url: String,
}

impl ManuscriptService {
    pub fn new(
        store: Arc<dyn ManuscriptStore>,
        queue: JobQueue,
        assembler: Arc<Assembler>,
        default_source_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            queue,
            assembler,
            default_source_url: default_source_url.into(),
        }
    }

    pub fn default_source_url(&self) -> &str {
        &self.default_source_url
    }

    pub async fn get(&self, article_id: &str) -> Result<Option<Manuscript>, ApiError> {
        Ok(self.store.get(&id_from_article(article_id)?).await?)
    }

    /// Queues the article for a freshness check and returns what is stored, or a placeholder.
    pub async fn request_manuscript(
        &self,
        article_id: &str,
        source_url: Option<&str>,
    ) -> Result<Manuscript, ApiError> {
        let article_id = id_from_article(article_id)?;
        let source_url = source_url.unwrap_or(&self.default_source_url);
        self.queue.enqueue(article_id.clone(), source_url);

        if let Some(manuscript) = self.store.get(&article_id).await? {
            return Ok(manuscript);
        }
        if !self.store.put_new(&pending_shell(&article_id, source_url)).await? {
            // The worker stored it after the lookup above.
            if let Some(manuscript) = self.store.get(&article_id).await? {
                return Ok(manuscript);
            }
        }
        tracing::info!(id = %article_id, "first request for article; stored placeholder");
        Ok(new_article_placeholder(&article_id, source_url))
    }

    /// URL of the assembled audio, assembling it first when the file is missing.
    pub async fn complete_audio(&self, article_id: &str) -> Result<String, ApiError> {
        let article_id = id_from_article(article_id)?;
        let manuscript = self
            .store
            .get(&article_id)
            .await?
            .filter(|m| m.state == ManuscriptState::Done)
            .ok_or_else(|| ApiError::NotGenerated(article_id.clone()))?;

        let manuscript = if manuscript.has_complete_audio() {
            manuscript
        } else {
            self.assembler.assemble(&article_id).await?
        };
        complete_audio_url(manuscript)
    }

    /// Rebuilds the complete audio even when a file already exists.
    pub async fn reassemble(&self, article_id: &str) -> Result<String, ApiError> {
        let article_id = id_from_article(article_id)?;
        let done = self
            .store
            .get(&article_id)
            .await?
            .is_some_and(|m| m.state == ManuscriptState::Done);
        if !done {
            return Err(ApiError::NotGenerated(article_id));
        }
        complete_audio_url(self.assembler.assemble(&article_id).await?)
    }

    pub async fn sitemap(&self, site_url: &str) -> Result<String, ApiError> {
        let manuscripts = self.store.list().await?;
        Ok(render_sitemap(site_url, &manuscripts))
    }
}

fn complete_audio_url(manuscript: Manuscript) -> Result<String, ApiError> {
    let id = manuscript.id;
    manuscript
        .complete_audio_url
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("no complete audio url for {id:?}")))
}

/// Status for the article page; the JSON API always answers 200.
pub fn page_status(manuscript: Option<&Manuscript>) -> StatusCode {
    let Some(manuscript) = manuscript else {
        return StatusCode::NOT_FOUND;
    };
    match manuscript.id.as_str() {
        ERROR_ID => return StatusCode::NOT_FOUND,
        DISALLOWED_ID => return StatusCode::BAD_REQUEST,
        _ => {}
    }
    match manuscript.state {
        ManuscriptState::Done => StatusCode::OK,
        ManuscriptState::Generating => StatusCode::TOO_EARLY,
        ManuscriptState::Error => StatusCode::NOT_FOUND,
        ManuscriptState::Disallowed => StatusCode::BAD_REQUEST,
    }
}

pub fn render_sitemap(site_url: &str, manuscripts: &[Manuscript]) -> String {
    let site_url = site_url.trim_end_matches('/');
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for manuscript in manuscripts
        .iter()
        .filter(|m| m.state == ManuscriptState::Done)
    {
        let id = url::form_urlencoded::byte_serialize(manuscript.id.as_bytes()).collect::<String>();
        out.push_str("\t<url>\n");
        out.push_str(&format!("\t\t<loc>{}</loc>\n", xml_escape(&format!("{site_url}/{id}"))));
        out.push_str(&format!(
            "\t\t<lastmod>{}</lastmod>\n",
            manuscript.lastmod.date_naive()
        ));
        if let Some(created) = manuscript.created {
            out.push_str(&format!("\t\t<created>{}</created>\n", created.date_naive()));
        }
        out.push_str("\t\t<changefreq>monthly</changefreq>\n");
        out.push_str("\t</url>\n");
    }
    out.push_str("</urlset>\n");
    out
}

/// Minimal server-rendered article page.
pub fn render_page(manuscript: Option<&Manuscript>) -> String {
    let mut out = String::from("<!doctype html>\n<html>\n<head><meta charset=\"utf-8\">");
    let title = manuscript.map(|m| m.title.as_str()).unwrap_or("articlecast");
    out.push_str(&format!("<title>{}</title>", xml_escape(title)));
    out.push_str("</head>\n<body>\n<article class=\"article-content\">\n");
    for section in manuscript.iter().flat_map(|m| &m.sections) {
        match section.section_type {
            SectionType::Img => out.push_str(&format!(
                "<img src=\"{}\" alt=\"{}\">\n",
                xml_escape(section.src.as_deref().unwrap_or_default()),
                xml_escape(section.alt.as_deref().unwrap_or_default())
            )),
            SectionType::Ul | SectionType::Ol => {
                let tag = section.section_type.as_str();
                out.push_str(&format!("<{tag}>"));
                for item in &section.spans {
                    out.push_str(&format!("<li>{}</li>", xml_escape(&item.text)));
                }
                out.push_str(&format!("</{tag}>\n"));
            }
            SectionType::Other => {
                out.push_str(&format!("<p>{}</p>\n", xml_escape(&section.text())));
            }
            kind => {
                let tag = kind.as_str();
                out.push_str(&format!("<{tag}>{}</{tag}>\n", xml_escape(&section.text())));
            }
        }
    }
    out.push_str("</article>\n</body>\n</html>\n");
    out
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
