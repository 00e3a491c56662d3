use std::path::PathBuf;

use anyhow::Context as _;

use crate::app::synthesize::DEFAULT_ATTRIBUTION;
use crate::elevenlabs::{DEFAULT_API_URL, DEFAULT_WS_URL, ElevenLabsConfig};

pub const DEFAULT_SOURCE_URL: &str = "https://www.profounddecisions.co.uk/empire-wiki";

const PREFIX: &str = "ARTICLECAST_";

/// Process configuration, read from `ARTICLECAST_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_dir: PathBuf,
    pub public_prefix: String,
    pub credentials_path: PathBuf,
    pub voices_path: PathBuf,
    pub safe_quota_margin: i64,
    pub generate: bool,
    pub refresh: bool,
    pub always_update: Vec<String>,
    /// Extra disallowed id patterns, on top of the built-in list.
    pub disallowed: Vec<String>,
    pub source_url: String,
    pub attribution: String,
    pub provider_api_url: String,
    pub provider_ws_url: String,
    pub sample_rate: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_dir: PathBuf::from("web/db"),
            public_prefix: "/db".to_owned(),
            credentials_path: PathBuf::from("config/credentials.json"),
            voices_path: PathBuf::from("config/voices.json"),
            safe_quota_margin: 1000,
            generate: true,
            refresh: false,
            always_update: Vec::new(),
            disallowed: Vec::new(),
            source_url: DEFAULT_SOURCE_URL.to_owned(),
            attribution: DEFAULT_ATTRIBUTION.to_owned(),
            provider_api_url: DEFAULT_API_URL.to_owned(),
            provider_ws_url: DEFAULT_WS_URL.to_owned(),
            sample_rate: 44_100,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| {
            lookup(&format!("{PREFIX}{name}"))
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            db_dir: var("DB_DIR").map(PathBuf::from).unwrap_or(defaults.db_dir),
            public_prefix: var("PUBLIC_PREFIX")
                .map(|v| v.trim_end_matches('/').to_owned())
                .unwrap_or(defaults.public_prefix),
            credentials_path: var("CREDENTIALS")
                .map(PathBuf::from)
                .unwrap_or(defaults.credentials_path),
            voices_path: var("VOICES").map(PathBuf::from).unwrap_or(defaults.voices_path),
            safe_quota_margin: parse_var(var("SAFE_QUOTA_MARGIN"), "SAFE_QUOTA_MARGIN")?
                .unwrap_or(defaults.safe_quota_margin),
            generate: bool_var(var("GENERATE"), "GENERATE")?.unwrap_or(defaults.generate),
            refresh: bool_var(var("REFRESH"), "REFRESH")?.unwrap_or(defaults.refresh),
            always_update: list_var(var("ALWAYS_UPDATE"), "ALWAYS_UPDATE")?,
            disallowed: list_var(var("DISALLOWED"), "DISALLOWED")?,
            source_url: var("SOURCE_URL")
                .map(|v| v.trim_end_matches('/').to_owned())
                .unwrap_or(defaults.source_url),
            attribution: var("ATTRIBUTION").unwrap_or(defaults.attribution),
            provider_api_url: var("PROVIDER_API_URL").unwrap_or(defaults.provider_api_url),
            provider_ws_url: var("PROVIDER_WS_URL").unwrap_or(defaults.provider_ws_url),
            sample_rate: parse_var(var("SAMPLE_RATE"), "SAMPLE_RATE")?
                .unwrap_or(defaults.sample_rate),
        })
    }

    pub fn elevenlabs(&self) -> ElevenLabsConfig {
        ElevenLabsConfig {
            api_url: self.provider_api_url.clone(),
            ws_url: self.provider_ws_url.clone(),
            sample_rate: self.sample_rate,
            safe_quota_margin: self.safe_quota_margin,
        }
    }
}

pub fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("unsupported boolean: {other}"),
    }
}

fn bool_var(raw: Option<String>, name: &str) -> anyhow::Result<Option<bool>> {
    raw.map(|raw| {
        parse_bool(&raw).with_context(|| {
            format!("invalid {PREFIX}{name}={raw:?}. expected one of: 1, true, yes, on, 0, false, no, off")
        })
    })
    .transpose()
}

fn parse_var<T>(raw: Option<String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.map(|raw| {
        raw.parse::<T>()
            .with_context(|| format!("invalid {PREFIX}{name}={raw:?}"))
    })
    .transpose()
}

fn list_var(raw: Option<String>, name: &str) -> anyhow::Result<Vec<String>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid {PREFIX}{name}={raw:?}. expected a JSON list of strings"))
}
