use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use readability_js::{Readability, ReadabilityError, ReadabilityOptions};

use crate::app::model::{Section, SectionType, TextSpan, spans_from_text};

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Article body as extracted from its source page, before artifact paths are assigned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleContent {
    pub title: String,
    pub url: String,
    pub sections: Vec<Section>,
    pub categories: Vec<String>,
    pub img: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Article(ArticleContent),
    /// The source answered but there is no usable article (missing page, unparsable body).
    Unavailable { url: String, reason: String },
}

#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Returns `Err` only when the source could not be reached at all.
    async fn fetch(&self, article_id: &str, source_url: &str) -> anyhow::Result<Fetched>;
}

pub fn article_url(source_url: &str, article_id: &str) -> String {
    let url = format!("{}/{article_id}", source_url.trim_end_matches('/'));
    let url = url.split('#').next().unwrap_or_default();
    url.replace('?', "%3F")
}

#[derive(Debug, Clone, Default)]
pub struct HttpArticleSource {
    client: reqwest::Client,
}

impl HttpArticleSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArticleSource for HttpArticleSource {
    async fn fetch(&self, article_id: &str, source_url: &str) -> anyhow::Result<Fetched> {
        let url = article_url(source_url, article_id);
        let response = self
            .client
            .get(&url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            return Ok(Fetched::Unavailable {
                url,
                reason: format!("status {status}"),
            });
        }
        let html = match response.text().await {
            Ok(html) => html,
            Err(err) => {
                return Ok(Fetched::Unavailable {
                    url,
                    reason: format!("read body: {err}"),
                });
            }
        };

        let categories = page_categories(&html).context("read page categories")?;
        let page_url = url.clone();
        let extracted = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
            let readability = Readability::new().context("initialize readability-js")?;
            extract_with_readability(&readability, &html, &page_url)
                .map_err(|err| anyhow::anyhow!("readability: {err}"))
        })
        .await
        .context("join extraction task")?;

        let (title, body_md) = match extracted {
            Ok(extracted) => extracted,
            Err(err) => {
                return Ok(Fetched::Unavailable {
                    url,
                    reason: format!("{err:#}"),
                });
            }
        };

        let title = match title.trim() {
            "" => article_id.replace('_', " "),
            title => title.to_owned(),
        };
        let sections = sections_from_markdown(&body_md);
        let img = sections
            .iter()
            .find(|s| s.section_type == SectionType::Img)
            .and_then(|s| s.src.clone());
        Ok(Fetched::Article(ArticleContent {
            title,
            url,
            sections,
            categories,
            img,
        }))
    }
}

/// Link texts of the wiki's category footer (`<div id="pageCategories">`).
pub fn page_categories(html: &str) -> anyhow::Result<Vec<String>> {
    let footer = regex::Regex::new(
        r#"(?is)<div[^>]*\bid\s*=\s*["']pageCategories["'][^>]*>(.*?)</div>"#,
    )
    .context("compile category footer pattern")?;
    let link = regex::Regex::new(r"(?is)<a\b[^>]*>(.*?)</a>").context("compile link pattern")?;
    let tag = regex::Regex::new(r"(?s)<[^>]*>").context("compile tag pattern")?;

    let Some(block) = footer.captures(html).and_then(|c| c.get(1)) else {
        return Ok(Vec::new());
    };
    Ok(link
        .captures_iter(block.as_str())
        .filter_map(|c| c.get(1))
        .map(|text| {
            tag.replace_all(text.as_str(), "")
                .replace("&amp;", "&")
                .trim()
                .to_owned()
        })
        .filter(|text| !text.is_empty())
        .collect())
}

fn extract_with_readability(
    readability: &Readability,
    html: &str,
    url: &str,
) -> Result<(String, String), ReadabilityError> {
    match readability.parse_with_url(html, url) {
        Ok(article) => Ok((article.title, html2md::parse_html(&article.content))),
        Err(ReadabilityError::ReadabilityCheckFailed) => {
            let options = ReadabilityOptions::new()
                .char_threshold(0)
                .nb_top_candidates(10)
                .link_density_modifier(2.0);
            let article = readability.parse_with_options(html, Some(url), Some(options))?;
            Ok((article.title, html2md::parse_html(&article.content)))
        }
        Err(err) => Err(err),
    }
}

/// Splits Markdown into narration sections: headings, paragraphs, whole lists, quotes and images.
pub fn sections_from_markdown(markdown: &str) -> Vec<Section> {
    let mut collector = SectionCollector::default();
    for event in Parser::new_ext(markdown, Options::ENABLE_STRIKETHROUGH) {
        collector.push(event);
    }
    collector.sections
}

#[derive(Debug)]
struct ListState {
    kind: SectionType,
    items: Vec<String>,
    current: String,
}

#[derive(Debug, Default)]
struct SectionCollector {
    sections: Vec<Section>,
    block: Option<SectionType>,
    text: String,
    list: Option<ListState>,
    list_depth: usize,
    quote_depth: usize,
    image: Option<(String, String)>,
}

impl SectionCollector {
    fn push(&mut self, event: Event<'_>) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => self.open_block(heading_type(level)),
            Event::Start(Tag::Paragraph) if self.list_depth == 0 => {
                let kind = if self.quote_depth > 0 {
                    SectionType::Cite
                } else {
                    SectionType::P
                };
                self.open_block(kind);
            }
            Event::End(TagEnd::Heading(_)) => self.close_block(),
            Event::End(TagEnd::Paragraph) if self.list_depth == 0 => self.close_block(),
            Event::Start(Tag::BlockQuote(_)) => self.quote_depth += 1,
            Event::End(TagEnd::BlockQuote(_)) => self.quote_depth = self.quote_depth.saturating_sub(1),
            Event::Start(Tag::List(start)) => {
                self.list_depth += 1;
                if self.list_depth == 1 {
                    self.list = Some(ListState {
                        kind: if start.is_some() {
                            SectionType::Ol
                        } else {
                            SectionType::Ul
                        },
                        items: Vec::new(),
                        current: String::new(),
                    });
                }
            }
            Event::End(TagEnd::Item) if self.list_depth == 1 => {
                if let Some(list) = &mut self.list {
                    let item = normalize_text(&list.current);
                    if !item.is_empty() {
                        list.items.push(item);
                    }
                    list.current.clear();
                }
            }
            Event::End(TagEnd::List(_)) => {
                self.list_depth = self.list_depth.saturating_sub(1);
                if self.list_depth == 0 {
                    if let Some(list) = self.list.take() {
                        if !list.items.is_empty() {
                            let spans = list
                                .items
                                .into_iter()
                                .map(|text| TextSpan { text })
                                .collect();
                            self.sections.push(Section::new(list.kind, spans));
                        }
                    }
                }
            }
            Event::Start(Tag::Image { dest_url, .. }) => {
                self.image = Some((dest_url.to_string(), String::new()));
            }
            Event::End(TagEnd::Image) => {
                if let Some((src, alt)) = self.image.take() {
                    self.sections.push(Section::image(src, alt.trim()));
                }
            }
            Event::Text(text) | Event::Code(text) => self.push_text(&text),
            Event::SoftBreak | Event::HardBreak => self.push_text(" "),
            _ => {}
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some((_, alt)) = &mut self.image {
            alt.push_str(text);
        } else if self.list_depth > 0 {
            let nested = self.list_depth > 1;
            if let Some(list) = &mut self.list {
                if nested && !list.current.is_empty() && !list.current.ends_with(' ') {
                    list.current.push(' ');
                }
                list.current.push_str(text);
            }
        } else if self.block.is_some() {
            self.text.push_str(text);
        }
    }

    fn open_block(&mut self, kind: SectionType) {
        self.block = Some(kind);
        self.text.clear();
    }

    fn close_block(&mut self) {
        let Some(kind) = self.block.take() else {
            return;
        };
        let spans = spans_from_text(&self.text);
        self.text.clear();
        if !spans.is_empty() {
            self.sections.push(Section::new(kind, spans));
        }
    }
}

fn heading_type(level: HeadingLevel) -> SectionType {
    match level {
        HeadingLevel::H1 => SectionType::H1,
        HeadingLevel::H2 => SectionType::H2,
        HeadingLevel::H3 => SectionType::H3,
        _ => SectionType::H4,
    }
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('–', "-")
}
