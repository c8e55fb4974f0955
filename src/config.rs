//! Engine configuration, read once at startup and passed to constructors.

use std::path::PathBuf;
use std::time::Duration;
use std::{env, io};
use tracing::debug;

/// Tokens that mark heraldry, logos, maps and other non-scenic files.
pub const DEFAULT_BLOCKLIST: &[&str] = &[
    "armoiries", "blason", "logo", "drapeau", "flag", "coat_of_arms",
    "emblème", "symbol", "badge", "map", "carte", "plan", "banner", "coat",
    "textes", "texte", "allemands", "banc", "coupe", "graphique",
    "illustration",
];

/// Landmark and landscape vocabulary that qualifies a file without a name match.
pub const DEFAULT_ALLOWLIST: &[&str] = &[
    "eglise", "église", "chateau", "château", "jardin", "place", "rue",
    "pont", "mairie", "panorama", "vue", "paysage", "montagne", "plage",
    "rivière", "lac", "skyline", "aérien", "aerial", "panoramique",
    "ville", "tour", "historique", "centre-ville", "vieux", "vieille",
    "naturelle", "l'église", "halle", "monument", "statue", "tower",
    "arc", "champs", "louvre", "museum", "city",
];

#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub blocklist: Vec<String>,
    pub allowlist: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            blocklist: DEFAULT_BLOCKLIST.iter().map(|s| s.to_string()).collect(),
            allowlist: DEFAULT_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// MediaWiki endpoint; `{lang}` is replaced by the wiki language.
    pub api_url: String,
    pub user_agent: String,
    /// Wiki language used for image lookups (independent of description language).
    pub lang: String,
    pub timeout: Duration,
    pub thumb_width: u32,
    pub extra_count: usize,
    pub max_fetch: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            api_url: "https://{lang}.wikipedia.org/w/api.php".into(),
            user_agent: format!("TownAtlas/{} (travel-enrichment)", env!("CARGO_PKG_VERSION")),
            lang: "fr".into(),
            timeout: Duration::from_secs(5),
            thumb_width: 1200,
            extra_count: 10,
            max_fetch: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".into(),
            api_key: None,
            model: "gpt-4.1-nano".into(),
            temperature: 0.7,
            top_p: 0.9,
            frequency_penalty: 0.1,
            timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_path: PathBuf,
    pub media: MediaConfig,
    pub generator: GeneratorConfig,
    pub filter: FilterConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            media: MediaConfig::default(),
            generator: GeneratorConfig::default(),
            filter: FilterConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Build from environment variables, loading `.env` in debug builds.
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        let defaults = Self::default();
        let media = MediaConfig {
            api_url: env::var("ATLAS_MEDIA_API").unwrap_or(defaults.media.api_url),
            user_agent: defaults.media.user_agent,
            lang: env::var("ATLAS_MEDIA_LANG")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.media.lang),
            timeout: Duration::from_secs(parse_u64("ATLAS_MEDIA_TIMEOUT_SECS", 5).max(1)),
            thumb_width: parse_u64("ATLAS_THUMB_WIDTH", defaults.media.thumb_width as u64) as u32,
            extra_count: parse_usize("ATLAS_EXTRA_IMAGES", defaults.media.extra_count),
            max_fetch: parse_usize("ATLAS_MAX_FETCH", defaults.media.max_fetch).max(1),
        };
        let generator = GeneratorConfig {
            api_url: env::var("OPENAI_API_URL").unwrap_or(defaults.generator.api_url),
            api_key: env::var("OPENAI_API_KEY").ok().filter(|v| !v.trim().is_empty()),
            model: env::var("OPENAI_MODEL").unwrap_or(defaults.generator.model),
            timeout: Duration::from_secs(parse_u64("ATLAS_GENERATOR_TIMEOUT_SECS", 20).max(1)),
            ..defaults.generator
        };
        let filter = FilterConfig {
            blocklist: parse_list("ATLAS_BLOCKLIST").unwrap_or(defaults.filter.blocklist),
            allowlist: parse_list("ATLAS_ALLOWLIST").unwrap_or(defaults.filter.allowlist),
        };
        Self {
            database_path: env::var("ATLAS_DATABASE")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            media,
            generator,
            filter,
        }
    }
}

fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".town_atlas")
        .join("atlas.db")
}

fn load_dotenv_if_applicable() {
    if !(cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)) {
        return;
    }
    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

/// Comma-separated token list; `None` when unset or empty.
fn parse_list(key: &str) -> Option<Vec<String>> {
    let raw = env::var(key).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
