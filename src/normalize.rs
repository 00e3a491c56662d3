use anyhow::Context as _;
use regex::{Regex, RegexBuilder};

use crate::alignment::Span;

/// Rewrites applied, in order, to section text before it is spoken.
const SPEECH_REWRITES: &[(&str, &str)] = &[
    ("sumaah", "Suhmah"),
    ("jotun", "Jotoon"),
    ("vallorn", "Valorn"),
    ("feni", "Fenni"),
    ("in-character", "incharacter"),
    ("temeschwar", "Temmeschwar"),
    ("sermersuaq", "semmersuak"),
    ("thule", "thool"),
    ("egregore", "egrigore"),
    (r"(\d{3})YE", "${1} Year of the Empire"),
    ("yegarra", "yehgarra"),
    (r"profounddecisions\.co\.uk", ""),
    ("mareave", "mareeve"),
];

/// Span runs collapsed back after synthesis: (token patterns, replacement, leading context).
const TRANSCRIPT_RECOMBINATIONS: &[(&[&str], &str, usize)] = &[(
    &["Year", "of", "the", r#"Empire[,;.:?!'")]*"#],
    "YE",
    1,
)];

#[derive(Debug, Clone)]
enum TokenPattern {
    Regex(Regex),
    Literal(String),
}

impl TokenPattern {
    fn matches(&self, text: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(text),
            Self::Literal(expected) => expected.to_lowercase() == text.to_lowercase(),
        }
    }
}

/// Collapses a run of spans matching `patterns` (preceded by `context` spans) into one span.
#[derive(Debug, Clone)]
pub struct Recombination {
    patterns: Vec<TokenPattern>,
    replacement: String,
    context: usize,
}

impl Recombination {
    pub fn regex(patterns: &[&str], replacement: &str, context: usize) -> anyhow::Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(&format!("^(?:{pattern})"))
                    .case_insensitive(true)
                    .build()
                    .map(TokenPattern::Regex)
                    .with_context(|| format!("compile token pattern: {pattern}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            patterns,
            replacement: replacement.to_owned(),
            context,
        })
    }

    /// Matches the whitespace-separated words of `phrase` literally and restores the phrase.
    pub fn phrase(phrase: &str) -> Self {
        Self {
            patterns: phrase
                .split_whitespace()
                .map(|word| TokenPattern::Literal(word.to_owned()))
                .collect(),
            replacement: phrase.to_owned(),
            context: 0,
        }
    }

    pub fn apply(&self, spans: Vec<Span>) -> Vec<Span> {
        let width = self.context + self.patterns.len();
        if self.patterns.is_empty() || spans.len() < width {
            return spans;
        }

        let mut out = Vec::with_capacity(spans.len());
        let mut i = 0;
        while i < spans.len() {
            if i + width <= spans.len() && self.matches_at(&spans, i) {
                let run = &spans[i..i + width];
                let context = run[..self.context]
                    .iter()
                    .map(|s| s.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                let length = run.iter().map(|s| s.length).sum();
                out.push(Span::new(
                    format!("{context}{}", self.replacement),
                    run[0].start,
                    length,
                ));
                i += width;
            } else {
                out.push(spans[i].clone());
                i += 1;
            }
        }
        out
    }

    fn matches_at(&self, spans: &[Span], i: usize) -> bool {
        let from = i + self.context;
        self.patterns
            .iter()
            .zip(&spans[from..from + self.patterns.len()])
            .all(|(pattern, span)| pattern.matches(&span.text))
    }
}

/// Text clean-up around synthesis: pronunciation rewrites before, transcript repair after.
#[derive(Debug, Clone)]
pub struct Normalizer {
    rewrites: Vec<(Regex, String)>,
    recombinations: Vec<Recombination>,
}

impl Normalizer {
    pub fn new(
        rewrites: &[(&str, &str)],
        recombinations: &[(&[&str], &str, usize)],
    ) -> anyhow::Result<Self> {
        let rewrites = rewrites
            .iter()
            .map(|(pattern, replacement)| {
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("compile rewrite pattern: {pattern}"))?;
                Ok((re, (*replacement).to_owned()))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let recombinations = recombinations
            .iter()
            .map(|(patterns, replacement, context)| {
                Recombination::regex(patterns, replacement, *context)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            rewrites,
            recombinations,
        })
    }

    pub fn standard() -> anyhow::Result<Self> {
        Self::new(SPEECH_REWRITES, TRANSCRIPT_RECOMBINATIONS)
    }

    pub fn for_speech(&self, text: &str) -> String {
        let mut text = text.to_owned();
        for (re, replacement) in &self.rewrites {
            text = re.replace_all(&text, replacement.as_str()).into_owned();
        }
        text
    }

    pub fn for_transcript(&self, spans: Vec<Span>) -> Vec<Span> {
        self.recombinations
            .iter()
            .fold(spans, |spans, rule| rule.apply(spans))
    }
}
