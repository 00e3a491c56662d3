use anyhow::Context as _;
use regex::{Regex, RegexBuilder};

use crate::app::artifact_store::ArtifactLayout;
use crate::app::model::{
    Manuscript, ManuscriptState, Section, SectionType, TextSpan, spans_from_text,
};
use crate::extract::article_url;

pub const HOME_ID: &str = "";
pub const DISALLOWED_ID: &str = "text-to-speech:disallowed";
pub const ERROR_ID: &str = "text-to-speech:error";
pub const SENTINEL_GROUP: &str = "info";

pub const SENTINEL_IDS: [&str; 3] = [HOME_ID, DISALLOWED_ID, ERROR_ID];

const HOME_TITLE: &str = "Empire Wikipedia Winds of Speech";

const HOME_INTRO: &[&str] = &[
    "This is an unofficial text-to-speech tool to help better focus on and understand the articles on the Empire Wikipedia.",
    "It is pretty simple to use: When you find an article on the Empire Wikipedia you would like to listen to and read along with, add a \"p\" to the start of the URL. You'll then go directly to the text-to-speech article on this website (see the video clip below). If the article seems outdated, it may be because you are the first to visit it in a while, so please let the system update the article - this can take a bit.",
    "If you would rather listen to the articles as a podcast you can find buttons for various podcast websites on the right. Please contact me if you would like more to be added.",
];

const HOME_CLIP_SRC: &str = "/static/img/tts.gif";
const HOME_CLIP_ALT: &str =
    "A video clip illustrating how to access text-to-speech directly from the Empire Wikipedia.";

const HOME_OUTRO: &[&str] = &[
    "The system was initially designed for personal use, but after making it publicly available, I've received some valuable suggestions. Some are now part of the accessibility settings in the left side burger menu; some have changed how articles are generated, shown, and read aloud; and some have changed the navigation buttons and sliders. Please share suggestions and any improvements you'd like to see - either by email (click the letter at the bottom right) or by finding me during out-of-character time at any of the Empire events (Bloodcrow Knott, Imperial Orcs).",
    "If you want to support me, you can buy me a coffee or beer in the field or donate by clicking the coffee cup on the bottom right.",
    "I hope this can help others who struggle as much with reading the Wikipedia as I have!",
];

const ERROR_TEXT: &[&str] = &[
    "The system could not process this article. Either the article does not exist, or an error occurred during the download. The system will continue to attempt to process the article, in case the problem is temporary.",
];

const DISALLOWED_TEXT: &[&str] = &[
    "This article is too long or unnecessary. The purpose of this system is to help other people and myself better understand the world of Empire. It is created and maintained out of the goodwill of a single player, and I do it entirely in my spare time without any help from Profound Decisions.",
    "I have no security protections, captchas, anti-DDOS, fancy load-balancing, IP registration, cookies, or anything else - the system's viability relies entirely on its users not abusing it. Unfortunately, I have experienced some people abusing the system a bit, so I've been forced to start disallowing some articles.",
    "This article has been deemed unfit for text-to-speech, either automatically or directly by me. This is likely because it is either an internal Wiki-specific article, too long compared to how often it is updated, makes no sense as text-to-speech, or is generally unnecessary to understand the world and game of Empire.",
    "I try only to exclude an absolute minimum of articles, so if you think this is a mistake and the article should still have text-to-speech, please get in touch with me either by email (click the letter at the bottom right) or by finding me during out-of-character time at any of the Empire events (Bloodcrow Knott, Imperial Orcs).",
];

pub const DEFAULT_DISALLOWED: &[&str] = &[
    "Category:.*",
    "Construct_.*",
    "Contact_Profound_Decisions",
    "Empire_rules",
    "File:.*",
    "Gazetteer",
    "Maps",
    "Nation_overview",
    "Pronunciation_guide",
    "Raise_Dawnish_army_Summer_385YE",
    "Recent_history",
    "Reconstruct_.*",
    "Safety_overview",
    "Skills",
    "Wiki_Updates",
    r"\d{3}YE_\w+_\w+_imperial_elections",
];

pub fn is_sentinel(article_id: &str) -> bool {
    SENTINEL_IDS.contains(&article_id)
}

/// Article ids that must never be synthesized; each pattern is anchored at the start of the id.
#[derive(Debug, Clone)]
pub struct DisallowedPatterns {
    patterns: Vec<Regex>,
}

impl DisallowedPatterns {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> anyhow::Result<Self> {
        let mut patterns = patterns
            .iter()
            .map(|pattern| compile_anchored(pattern.as_ref()))
            .collect::<anyhow::Result<Vec<_>>>()?;
        patterns.push(compile_anchored(&regex::escape(DISALLOWED_ID))?);
        Ok(Self { patterns })
    }

    pub fn standard() -> anyhow::Result<Self> {
        Self::new(DEFAULT_DISALLOWED)
    }

    pub fn matches(&self, article_id: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(article_id))
    }
}

fn compile_anchored(pattern: &str) -> anyhow::Result<Regex> {
    RegexBuilder::new(&format!("^(?:{pattern})"))
        .case_insensitive(true)
        .build()
        .with_context(|| format!("compile disallowed pattern: {pattern}"))
}

fn paragraphs<'a>(texts: &'a [&'a str]) -> impl Iterator<Item = Section> + 'a {
    texts
        .iter()
        .map(|text| Section::new(SectionType::P, spans_from_text(text)))
}

fn fixed_manuscript(
    layout: &ArtifactLayout,
    artifact_id: &str,
    article_id: &str,
    title: &str,
    state: ManuscriptState,
    mut sections: Vec<Section>,
) -> Manuscript {
    for (index, section) in sections.iter_mut().enumerate() {
        if section.section_type.is_audible() {
            layout.assign_section(artifact_id, index, section);
        }
    }
    let mut manuscript = Manuscript::new(article_id, title, state);
    manuscript.group = SENTINEL_GROUP.to_owned();
    manuscript.sections = sections;
    manuscript.outro = Some(layout.outro(artifact_id));
    manuscript
}

pub fn home_manuscript(layout: &ArtifactLayout) -> Manuscript {
    let sections = std::iter::once(Section::new(SectionType::H1, spans_from_text(HOME_TITLE)))
        .chain(paragraphs(HOME_INTRO))
        .chain(std::iter::once(Section::image(HOME_CLIP_SRC, HOME_CLIP_ALT)))
        .chain(paragraphs(HOME_OUTRO))
        .collect();
    fixed_manuscript(
        layout,
        HOME_ID,
        HOME_ID,
        HOME_TITLE,
        ManuscriptState::Generating,
        sections,
    )
}

fn notice_manuscript(
    layout: &ArtifactLayout,
    sentinel_id: &str,
    heading: &str,
    texts: &[&str],
    failed_state: ManuscriptState,
    article_id: &str,
    source_url: &str,
) -> Manuscript {
    let sections = std::iter::once(Section::new(SectionType::H1, spans_from_text(heading)))
        .chain(paragraphs(texts))
        .collect();
    let is_self = article_id == sentinel_id;
    let mut manuscript = fixed_manuscript(
        layout,
        sentinel_id,
        article_id,
        &article_id.replace('_', " "),
        if is_self {
            ManuscriptState::Generating
        } else {
            failed_state
        },
        sections,
    );
    if !is_self {
        manuscript.url = Some(article_url(source_url, article_id));
    }
    manuscript
}

/// Stand-in for an article the source could not provide; audio is shared with the error article.
pub fn error_manuscript(layout: &ArtifactLayout, article_id: &str, source_url: &str) -> Manuscript {
    notice_manuscript(
        layout,
        ERROR_ID,
        "Error",
        ERROR_TEXT,
        ManuscriptState::Error,
        article_id,
        source_url,
    )
}

/// Stand-in for a disallowed article; audio is shared with the disallowed article.
pub fn disallowed_manuscript(
    layout: &ArtifactLayout,
    article_id: &str,
    source_url: &str,
) -> Manuscript {
    notice_manuscript(
        layout,
        DISALLOWED_ID,
        "Disallowed article",
        DISALLOWED_TEXT,
        ManuscriptState::Disallowed,
        article_id,
        source_url,
    )
}

/// Shell stored on the first request for an article nobody has asked for yet.
pub fn pending_shell(article_id: &str, source_url: &str) -> Manuscript {
    let mut manuscript = Manuscript::new(article_id, article_id, ManuscriptState::Generating);
    manuscript.url = Some(article_url(source_url, article_id));
    manuscript.sections = vec![
        Section::new(
            SectionType::H1,
            vec![TextSpan {
                text: article_id.to_owned(),
            }],
        ),
        Section::new(
            SectionType::P,
            sentences(&[
                "The system is still processing this article.",
                "This will take anywhere from a couple of minutes to hours, depending on the article and how many articles are ahead of this one in the queue.",
                "You are welcome to come back to check the progress, but unfortunately the system is not smart enough to give you an estimate.",
            ]),
        ),
    ];
    manuscript
}

/// Answer returned to the first visitor of an article.
pub fn new_article_placeholder(article_id: &str, source_url: &str) -> Manuscript {
    let mut manuscript = Manuscript::new(article_id, article_id, ManuscriptState::Generating);
    manuscript.url = Some(article_url(source_url, article_id));
    manuscript.sections = vec![
        Section::new(SectionType::H1, sentences(&["New Article!"])),
        Section::new(
            SectionType::P,
            sentences(&["Congratulations! You are the first to visit this article!"]),
        ),
        Section::new(
            SectionType::P,
            sentences(&[
                "Unfortunately, this means that the system has not yet generated this article.",
                "It will take anywhere from a couple of minutes to hours, depending on the article and how many articles are ahead of this one in the queue.",
                "You are welcome to come back later to check again but unfortunately the system is not smart enough to give you an estimate.",
            ]),
        ),
    ];
    manuscript
}

fn sentences(texts: &[&str]) -> Vec<TextSpan> {
    texts
        .iter()
        .map(|text| TextSpan {
            text: (*text).to_owned(),
        })
        .collect()
}
