//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const ENV_PREFIX: &str = "FOLIO";
const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
const DEFAULT_BRANCH: &str = "main";
const DEFAULT_CONTENT_ROOT: &str = "content";
const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CACHE_CAPACITY: u64 = 1000;
const DEFAULT_CACHE_TTL_SECS: u64 = 60 * 60 * 24 * 14;
const DEFAULT_CACHE_SWR_SECS: u64 = 60 * 60 * 24 * 365 * 100;
pub const DEFAULT_WARM_CONCURRENCY: usize = 4;

/// Command-line arguments for the Folio binary.
#[derive(Debug, Parser)]
#[command(name = "folio", version, about = "Cached documentation pages from a GitHub repository")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Resolve and print one compiled page.
    Page(PageArgs),
    /// Search the docs directory for a term.
    Search(SearchArgs),
    /// List the pages of a content directory.
    List(ListArgs),
    /// Resolve every page of a content directory.
    Warm(WarmArgs),
}

#[derive(Debug, Args, Clone)]
pub struct PageArgs {
    /// Content directory, e.g. `docs` or `decisions`.
    pub content_dir: String,
    pub slug: String,
    /// Bypass cached values.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub fresh: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SearchArgs {
    pub term: String,
}

#[derive(Debug, Args, Clone)]
pub struct ListArgs {
    pub content_dir: String,
}

#[derive(Debug, Args, Clone)]
pub struct WarmArgs {
    pub content_dir: String,
    /// Maximum number of pages resolved at once.
    #[arg(long, default_value_t = DEFAULT_WARM_CONCURRENCY, value_parser = clap::value_parser!(usize))]
    pub concurrency: usize,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the repository owner.
    #[arg(long = "source-owner", value_name = "OWNER", global = true)]
    pub source_owner: Option<String>,

    /// Override the repository name.
    #[arg(long = "source-repo", value_name = "REPO", global = true)]
    pub source_repo: Option<String>,

    /// Override the branch pages are read from.
    #[arg(long = "source-branch", value_name = "BRANCH", global = true)]
    pub source_branch: Option<String>,

    /// Override the number of cache entries kept in memory.
    #[arg(long = "cache-capacity", value_name = "COUNT", global = true)]
    pub cache_capacity: Option<u64>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub source: SourceSettings,
    pub cache: CacheSettings,
    pub pages: PageSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub api_base_url: Url,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub content_root: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub capacity: NonZeroUsize,
    pub ttl: Duration,
    pub stale_while_revalidate: Duration,
}

#[derive(Debug, Clone)]
pub struct PageSettings {
    pub edit_base_url: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    source: RawSourceSettings,
    cache: RawCacheSettings,
    pages: RawPageSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(owner) = overrides.source_owner.as_ref() {
            self.source.owner = Some(owner.clone());
        }
        if let Some(repo) = overrides.source_repo.as_ref() {
            self.source.repo = Some(repo.clone());
        }
        if let Some(branch) = overrides.source_branch.as_ref() {
            self.source.branch = Some(branch.clone());
        }
        if let Some(capacity) = overrides.cache_capacity {
            self.cache.capacity = Some(capacity);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            source,
            cache,
            pages,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let source = build_source_settings(source)?;
        let cache = build_cache_settings(cache)?;
        let pages = build_page_settings(pages, &source)?;

        Ok(Self {
            logging,
            source,
            cache,
            pages,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_source_settings(source: RawSourceSettings) -> Result<SourceSettings, LoadError> {
    let api_base_url = source
        .api_base_url
        .as_deref()
        .unwrap_or(DEFAULT_API_BASE_URL);
    let api_base_url = Url::parse(api_base_url)
        .map_err(|err| LoadError::invalid("source.api_base_url", format!("invalid URL: {err}")))?;

    let owner = required(source.owner, "source.owner")?;
    let repo = required(source.repo, "source.repo")?;
    let branch = non_blank(source.branch).unwrap_or_else(|| DEFAULT_BRANCH.to_string());
    let content_root = source
        .content_root
        .map(|root| root.trim().trim_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_CONTENT_ROOT.to_string());
    let token = non_blank(source.token);

    let timeout_secs = source
        .timeout_seconds
        .unwrap_or(DEFAULT_SOURCE_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "source.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(SourceSettings {
        api_base_url,
        owner,
        repo,
        branch,
        content_root,
        token,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let capacity = non_zero_usize(
        cache.capacity.unwrap_or(DEFAULT_CACHE_CAPACITY),
        "cache.capacity",
    )?;
    let ttl = Duration::from_secs(cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS));
    let stale_while_revalidate = Duration::from_secs(
        cache
            .stale_while_revalidate_seconds
            .unwrap_or(DEFAULT_CACHE_SWR_SECS),
    );

    Ok(CacheSettings {
        capacity,
        ttl,
        stale_while_revalidate,
    })
}

fn build_page_settings(
    pages: RawPageSettings,
    source: &SourceSettings,
) -> Result<PageSettings, LoadError> {
    let edit_base_url = match non_blank(pages.edit_base_url) {
        Some(url) => {
            Url::parse(&url).map_err(|err| {
                LoadError::invalid("pages.edit_base_url", format!("invalid URL: {err}"))
            })?;
            url.trim_end_matches('/').to_string()
        }
        None => {
            let base = format!(
                "https://github.com/{}/{}/edit/{}",
                source.owner, source.repo, source.branch
            );
            if source.content_root.is_empty() {
                base
            } else {
                format!("{base}/{}", source.content_root)
            }
        }
    };

    Ok(PageSettings { edit_base_url })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSourceSettings {
    api_base_url: Option<String>,
    owner: Option<String>,
    repo: Option<String>,
    branch: Option<String>,
    content_root: Option<String>,
    token: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    capacity: Option<u64>,
    ttl_seconds: Option<u64>,
    stale_while_revalidate_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPageSettings {
    edit_base_url: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn required(value: Option<String>, key: &'static str) -> Result<String, LoadError> {
    non_blank(value).ok_or_else(|| LoadError::invalid(key, "must be set"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::cache::CacheConfig;

    fn raw_with_repo() -> RawSettings {
        let mut raw = RawSettings::default();
        raw.source.owner = Some("acme".to_string());
        raw.source.repo = Some("handbook".to_string());
        raw
    }

    #[test]
    fn defaults_resolve_when_repository_is_set() {
        let settings = Settings::from_raw(raw_with_repo()).expect("valid settings");

        assert_eq!(settings.source.api_base_url.as_str(), "https://api.github.com/");
        assert_eq!(settings.source.branch, "main");
        assert_eq!(settings.source.content_root, "content");
        assert_eq!(settings.source.timeout, Duration::from_secs(10));
        assert!(settings.source.token.is_none());
        assert_eq!(settings.cache.capacity.get(), 1000);
        assert_eq!(settings.cache.ttl, Duration::from_secs(14 * 24 * 60 * 60));
        assert_eq!(
            settings.pages.edit_base_url,
            "https://github.com/acme/handbook/edit/main/content"
        );
        assert_eq!(settings.logging.level, LevelFilter::INFO);
    }

    #[test]
    fn cache_settings_feed_cache_config() {
        let settings = Settings::from_raw(raw_with_repo()).expect("valid settings");
        let config = CacheConfig::from(&settings.cache);
        let defaults = CacheConfig::default();

        assert_eq!(config.capacity, defaults.capacity);
        assert_eq!(config.ttl, defaults.ttl);
        assert_eq!(config.stale_while_revalidate, defaults.stale_while_revalidate);
    }

    #[test]
    fn missing_repository_is_rejected() {
        let err = Settings::from_raw(RawSettings::default()).expect_err("owner required");
        assert!(matches!(err, LoadError::Invalid { key: "source.owner", .. }));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut raw = raw_with_repo();
        raw.cache.capacity = Some(0);
        let err = Settings::from_raw(raw).expect_err("capacity must be non-zero");
        assert!(matches!(err, LoadError::Invalid { key: "cache.capacity", .. }));
    }

    #[test]
    fn zero_ttl_is_allowed() {
        let mut raw = raw_with_repo();
        raw.cache.ttl_seconds = Some(0);
        let settings = Settings::from_raw(raw).expect("zero ttl");
        assert_eq!(settings.cache.ttl, Duration::ZERO);
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = raw_with_repo();
        raw.logging.level = Some("info".to_string());
        raw.source.branch = Some("main".to_string());

        let overrides = Overrides {
            log_level: Some("debug".to_string()),
            log_json: Some(true),
            source_branch: Some("preview".to_string()),
            cache_capacity: Some(16),
            ..Default::default()
        };

        raw.apply_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert!(matches!(settings.logging.format, LogFormat::Json));
        assert_eq!(settings.source.branch, "preview");
        assert_eq!(settings.cache.capacity.get(), 16);
        assert_eq!(
            settings.pages.edit_base_url,
            "https://github.com/acme/handbook/edit/preview/content"
        );
    }

    #[test]
    fn explicit_edit_base_url_is_trimmed() {
        let mut raw = raw_with_repo();
        raw.pages.edit_base_url = Some("https://example.com/edit/".to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.pages.edit_base_url, "https://example.com/edit");
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let mut raw = raw_with_repo();
        raw.logging.level = Some("loud".to_string());
        let err = Settings::from_raw(raw).expect_err("bad level");
        assert!(matches!(err, LoadError::Invalid { key: "logging.level", .. }));
    }

    #[test]
    fn config_file_is_layered_under_cli() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("tmp file");
        writeln!(
            file,
            "[source]\nowner = \"acme\"\nrepo = \"handbook\"\ncontent_root = \"/pages/\"\n\n[cache]\nttl_seconds = 60"
        )
        .expect("write config");

        let path = file.path().to_string_lossy().to_string();
        let cli = CliArgs::parse_from([
            "folio",
            "--config-file",
            path.as_str(),
            "--source-repo",
            "manual",
            "list",
            "docs",
        ]);
        let settings = load(&cli).expect("settings load");

        assert_eq!(settings.source.owner, "acme");
        assert_eq!(settings.source.repo, "manual");
        assert_eq!(settings.source.content_root, "pages");
        assert_eq!(settings.cache.ttl, Duration::from_secs(60));
    }

    #[test]
    fn parse_page_arguments() {
        let args = CliArgs::parse_from(["folio", "page", "decisions", "001-adopt", "--fresh"]);

        match args.command {
            Command::Page(page) => {
                assert_eq!(page.content_dir, "decisions");
                assert_eq!(page.slug, "001-adopt");
                assert!(page.fresh);
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_warm_arguments_with_global_override() {
        let args = CliArgs::parse_from([
            "folio",
            "warm",
            "docs",
            "--concurrency",
            "8",
            "--log-level",
            "warn",
        ]);

        assert_eq!(args.overrides.log_level.as_deref(), Some("warn"));
        match args.command {
            Command::Warm(warm) => {
                assert_eq!(warm.content_dir, "docs");
                assert_eq!(warm.concurrency, 8);
            }
            _ => panic!("wrong command parsed"),
        }
    }
}
