use std::sync::Arc;

use chrono::Utc;

use crate::app::artifact_store::ArtifactLayout;
use crate::app::model::{Manuscript, ManuscriptState, Section, SectionType, spans_from_text};
use crate::app::sentinel::{
    self, DisallowedPatterns, ERROR_ID, HOME_ID, disallowed_manuscript, error_manuscript,
    home_manuscript,
};
use crate::extract::{ArticleContent, ArticleSource, Fetched};

/// Produces the skeleton manuscript for an article id: sections and artifact locations, no audio.
pub struct ManuscriptBuilder {
    layout: ArtifactLayout,
    source: Arc<dyn ArticleSource>,
    disallowed: DisallowedPatterns,
}

impl ManuscriptBuilder {
    pub fn new(
        layout: ArtifactLayout,
        source: Arc<dyn ArticleSource>,
        disallowed: DisallowedPatterns,
    ) -> Self {
        Self {
            layout,
            source,
            disallowed,
        }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Fails only when the article source is unreachable.
    pub async fn build(&self, article_id: &str, source_url: &str) -> anyhow::Result<Manuscript> {
        if self.disallowed.matches(article_id) {
            tracing::warn!(id = article_id, "article is disallowed");
            return Ok(disallowed_manuscript(&self.layout, article_id, source_url));
        }
        if article_id == HOME_ID {
            return Ok(home_manuscript(&self.layout));
        }
        if article_id == ERROR_ID {
            return Ok(error_manuscript(&self.layout, article_id, source_url));
        }

        match self.source.fetch(article_id, source_url).await? {
            Fetched::Article(content) => Ok(self.article_manuscript(article_id, source_url, content)),
            Fetched::Unavailable { url, reason } => {
                tracing::error!(id = article_id, url = %url, reason = %reason, "could not get article");
                Ok(error_manuscript(&self.layout, article_id, source_url))
            }
        }
    }

    fn article_manuscript(
        &self,
        article_id: &str,
        source_url: &str,
        content: ArticleContent,
    ) -> Manuscript {
        let mut sections = Vec::with_capacity(content.sections.len() + 1);
        sections.push(Section::new(SectionType::H1, spans_from_text(&content.title)));
        sections.extend(content.sections);
        for (index, section) in sections.iter_mut().enumerate() {
            if section.section_type.is_audible() {
                self.layout.assign_section(article_id, index, section);
            }
        }

        let mut manuscript = Manuscript::new(article_id, content.title, ManuscriptState::Generating);
        manuscript.url = Some(content.url);
        manuscript.group = source_url.to_owned();
        manuscript.categories = content.categories;
        manuscript.sections = sections;
        manuscript.outro = Some(self.layout.outro(article_id));
        manuscript.lastmod = Utc::now();
        manuscript.created = Some(manuscript.lastmod);
        manuscript.img = content.img;
        manuscript
    }
}

/// Whether an article's audio should carry the source attribution.
pub fn needs_attribution(article_id: &str) -> bool {
    !sentinel::is_sentinel(article_id)
}
