//! Configuration module
//!
//! Environment-driven configuration for the server, the storage backend, the
//! resolution service and the domain rewrite filter.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::constants::{
    DEFAULT_AGENT_SCRIPT_PATH, DEFAULT_CDN_SUFFIX, DEFAULT_FALLBACK_IMAGE, SOURCE_TIMEOUT_SECS,
};
use crate::paths::{PathCodec, SizeAllowList};
use crate::rewrite::DomainRewriteRule;
use crate::storage_types::StorageBackend;

const SERVER_PORT: u16 = 3000;
const HTTP_CONCURRENCY_LIMIT: usize = 512;
const MAX_REWRITE_BODY_MB: usize = 8;
const RESOLUTION_QUEUE_CAPACITY: usize = 1024;

/// Where the resolution service reads original bytes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFetchMode {
    /// Read through the object store gateway.
    #[default]
    Storage,
    /// HTTP GET against the canonical bucket domain.
    Http,
}

impl FromStr for SourceFetchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "storage" => Ok(SourceFetchMode::Storage),
            "http" => Ok(SourceFetchMode::Http),
            other => Err(anyhow::anyhow!(
                "Invalid IMAGE_SOURCE_FETCH: {} (expected storage or http)",
                other
            )),
        }
    }
}

impl Display for SourceFetchMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SourceFetchMode::Storage => write!(f, "storage"),
            SourceFetchMode::Http => write!(f, "http"),
        }
    }
}

/// Settings shared by every binary
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub environment: String,
    pub http_concurrency_limit: usize,
    pub max_rewrite_body_bytes: usize,
}

/// Full application configuration
#[derive(Clone, Debug)]
pub struct ImageShiftConfig {
    pub base: BaseConfig,
    // Storage
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    // Resolution
    pub bucket_domain: String,
    pub strip_bucket_prefix: Option<String>,
    pub allowed_sizes: SizeAllowList,
    pub fallback_image: String,
    pub source_fetch: SourceFetchMode,
    pub source_timeout_secs: u64,
    pub queue_bucket_check: bool,
    pub queue_capacity: usize,
    // Domain rewrite
    pub new_domain: String,
    pub old_domains: Vec<String>,
    pub regex_patterns: Vec<String>,
    pub regex_suffix: String,
    pub agent_script_path: String,
    /// wasm-pack output of `imgshift-agent-web`, served at `agent_script_path`.
    pub agent_asset_dir: Option<String>,
    pub admin_path_prefixes: Vec<String>,
    pub site_root: Option<String>,
    // Anti-forgery
    pub fallback_require_csrf: bool,
    pub csrf_secret: Option<String>,
}

impl Default for ImageShiftConfig {
    fn default() -> Self {
        Self {
            base: BaseConfig {
                server_port: SERVER_PORT,
                environment: "development".to_string(),
                http_concurrency_limit: HTTP_CONCURRENCY_LIMIT,
                max_rewrite_body_bytes: MAX_REWRITE_BODY_MB * 1024 * 1024,
            },
            storage_backend: StorageBackend::S3,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            aws_region: None,
            local_storage_path: None,
            local_storage_base_url: None,
            bucket_domain: String::new(),
            strip_bucket_prefix: None,
            allowed_sizes: SizeAllowList::default(),
            fallback_image: DEFAULT_FALLBACK_IMAGE.to_string(),
            source_fetch: SourceFetchMode::Storage,
            source_timeout_secs: SOURCE_TIMEOUT_SECS,
            queue_bucket_check: false,
            queue_capacity: RESOLUTION_QUEUE_CAPACITY,
            new_domain: String::new(),
            old_domains: Vec::new(),
            regex_patterns: Vec::new(),
            regex_suffix: DEFAULT_CDN_SUFFIX.to_string(),
            agent_script_path: DEFAULT_AGENT_SCRIPT_PATH.to_string(),
            agent_asset_dir: None,
            admin_path_prefixes: vec!["admin".to_string(), "scms".to_string()],
            site_root: None,
            fallback_require_csrf: false,
            csrf_secret: None,
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<ImageShiftConfig>);

impl Config {
    pub fn new(inner: ImageShiftConfig) -> Self {
        Config(Box::new(inner))
    }

    fn inner(&self) -> &ImageShiftConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.inner().base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = ImageShiftConfig::from_env()?;
        Ok(Config::new(config))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    pub fn server_port(&self) -> u16 {
        self.inner().base.server_port
    }

    pub fn environment(&self) -> &str {
        &self.inner().base.environment
    }

    pub fn http_concurrency_limit(&self) -> usize {
        self.inner().base.http_concurrency_limit
    }

    pub fn max_rewrite_body_bytes(&self) -> usize {
        self.inner().base.max_rewrite_body_bytes
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.inner().storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.inner().s3_bucket.as_deref()
    }

    /// `S3_REGION` wins over `AWS_REGION`.
    pub fn s3_region(&self) -> Option<&str> {
        self.inner()
            .s3_region
            .as_deref()
            .or(self.inner().aws_region.as_deref())
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.inner().s3_endpoint.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.inner().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.inner().local_storage_base_url.as_deref()
    }

    pub fn bucket_domain(&self) -> &str {
        &self.inner().bucket_domain
    }

    pub fn strip_bucket_prefix(&self) -> Option<&str> {
        self.inner().strip_bucket_prefix.as_deref()
    }

    pub fn allowed_sizes(&self) -> &SizeAllowList {
        &self.inner().allowed_sizes
    }

    pub fn fallback_image(&self) -> &str {
        &self.inner().fallback_image
    }

    pub fn source_fetch(&self) -> SourceFetchMode {
        self.inner().source_fetch
    }

    pub fn source_timeout_secs(&self) -> u64 {
        self.inner().source_timeout_secs
    }

    pub fn queue_bucket_check(&self) -> bool {
        self.inner().queue_bucket_check
    }

    pub fn queue_capacity(&self) -> usize {
        self.inner().queue_capacity
    }

    pub fn agent_script_path(&self) -> &str {
        &self.inner().agent_script_path
    }

    pub fn agent_asset_dir(&self) -> Option<&str> {
        self.inner().agent_asset_dir.as_deref()
    }

    pub fn admin_path_prefixes(&self) -> &[String] {
        &self.inner().admin_path_prefixes
    }

    pub fn site_root(&self) -> Option<&str> {
        self.inner().site_root.as_deref()
    }

    pub fn fallback_require_csrf(&self) -> bool {
        self.inner().fallback_require_csrf
    }

    pub fn csrf_secret(&self) -> Option<&str> {
        self.inner().csrf_secret.as_deref()
    }

    /// Path codec bound to the canonical bucket domain.
    pub fn path_codec(&self) -> PathCodec {
        PathCodec::new(self.bucket_domain())
            .with_bucket_prefix(self.inner().strip_bucket_prefix.clone())
    }

    /// Rewrite rule assembled from the `IMAGE_*` settings.
    pub fn domain_rewrite_rule(&self) -> DomainRewriteRule {
        let inner = self.inner();
        DomainRewriteRule {
            new_domain: inner.new_domain.clone(),
            old_domains: inner.old_domains.clone(),
            prefix_tokens: inner.regex_patterns.clone(),
            cdn_suffix: inner.regex_suffix.clone(),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .to_lowercase()
        .parse()
        .unwrap_or(default)
}

fn env_non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl ImageShiftConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let defaults = ImageShiftConfig::default();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let base = BaseConfig {
            server_port: env::var("SERVER_PORT")
                .or_else(|_| env::var("PORT"))
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SERVER_PORT must be a valid number"))?,
            environment,
            http_concurrency_limit: env::var("HTTP_CONCURRENCY_LIMIT")
                .unwrap_or_else(|_| HTTP_CONCURRENCY_LIMIT.to_string())
                .parse()
                .unwrap_or(HTTP_CONCURRENCY_LIMIT),
            max_rewrite_body_bytes: env::var("MAX_REWRITE_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.base.max_rewrite_body_bytes),
        };

        let storage_backend = match env_non_empty("STORAGE_BACKEND")
            .or_else(|| env_non_empty("STORAGE_TYPE"))
        {
            Some(value) => value.parse()?,
            None => StorageBackend::S3,
        };

        let allowed_sizes = match env_non_empty("IMAGE_ALLOWED_SIZES") {
            Some(value) => value.parse()?,
            None => SizeAllowList::default(),
        };

        let source_fetch = match env_non_empty("IMAGE_SOURCE_FETCH") {
            Some(value) => value.parse()?,
            None => SourceFetchMode::Storage,
        };

        let config = ImageShiftConfig {
            base,
            storage_backend,
            s3_bucket: env_non_empty("S3_BUCKET"),
            s3_region: env_non_empty("S3_REGION"),
            s3_endpoint: env_non_empty("S3_ENDPOINT"),
            aws_region: env_non_empty("AWS_REGION"),
            local_storage_path: env_non_empty("LOCAL_STORAGE_PATH"),
            local_storage_base_url: env_non_empty("LOCAL_STORAGE_BASE_URL"),
            bucket_domain: env_non_empty("IMAGE_BUCKET_DOMAIN")
                .or_else(|| env_non_empty("IMAGE_DOMAIN_REPLACE_NEW"))
                .unwrap_or_default(),
            strip_bucket_prefix: env_non_empty("IMAGE_STRIP_BUCKET_PREFIX"),
            allowed_sizes,
            fallback_image: env_non_empty("IMAGE_DOMAIN_REPLACE_FALLBACK")
                .unwrap_or(defaults.fallback_image),
            source_fetch,
            source_timeout_secs: env::var("IMAGE_SOURCE_TIMEOUT_SECS")
                .unwrap_or_else(|_| SOURCE_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(SOURCE_TIMEOUT_SECS),
            queue_bucket_check: env_flag("IMAGE_QUEUE_BUCKET_CHECK", false),
            queue_capacity: env::var("IMAGE_QUEUE_CAPACITY")
                .unwrap_or_else(|_| RESOLUTION_QUEUE_CAPACITY.to_string())
                .parse()
                .unwrap_or(RESOLUTION_QUEUE_CAPACITY),
            new_domain: env_non_empty("IMAGE_DOMAIN_REPLACE_NEW").unwrap_or_default(),
            old_domains: DomainRewriteRule::parse_list(
                &env::var("IMAGE_OLD_DOMAINS").unwrap_or_default(),
            ),
            regex_patterns: DomainRewriteRule::parse_list(
                &env::var("IMAGE_REGEX_PATTERNS").unwrap_or_default(),
            ),
            regex_suffix: env_non_empty("IMAGE_REGEX_SUFFIX").unwrap_or(defaults.regex_suffix),
            agent_script_path: env_non_empty("AGENT_SCRIPT_PATH")
                .unwrap_or(defaults.agent_script_path),
            agent_asset_dir: env_non_empty("AGENT_ASSET_DIR"),
            admin_path_prefixes: env::var("ADMIN_PATH_PREFIXES")
                .map(|s| DomainRewriteRule::parse_list(&s))
                .unwrap_or(defaults.admin_path_prefixes),
            site_root: env_non_empty("SITE_ROOT"),
            fallback_require_csrf: env_flag("FALLBACK_REQUIRE_CSRF", false),
            csrf_secret: env_non_empty("CSRF_SECRET"),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.bucket_domain.is_empty() {
            return Err(anyhow::anyhow!(
                "IMAGE_BUCKET_DOMAIN (or IMAGE_DOMAIN_REPLACE_NEW) must be set"
            ));
        }

        if self.allowed_sizes.is_empty() {
            return Err(anyhow::anyhow!(
                "IMAGE_ALLOWED_SIZES must contain at least one width"
            ));
        }

        if self.source_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "IMAGE_SOURCE_TIMEOUT_SECS must be greater than zero"
            ));
        }

        if self.fallback_require_csrf {
            match &self.csrf_secret {
                Some(secret) if secret.len() >= 32 => {}
                _ => {
                    return Err(anyhow::anyhow!(
                        "FALLBACK_REQUIRE_CSRF=true requires CSRF_SECRET of at least 32 characters"
                    ))
                }
            }
        }

        if !self.agent_script_path.starts_with('/') {
            return Err(anyhow::anyhow!(
                "AGENT_SCRIPT_PATH must be an absolute path, got {}",
                self.agent_script_path
            ));
        }

        if self.queue_bucket_check && self.queue_capacity == 0 {
            return Err(anyhow::anyhow!(
                "IMAGE_QUEUE_CAPACITY must be greater than zero when IMAGE_QUEUE_BUCKET_CHECK=true"
            ));
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
            StorageBackend::Memory => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> ImageShiftConfig {
        ImageShiftConfig {
            storage_backend: StorageBackend::Memory,
            bucket_domain: "https://storage.example.com/bucket".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_memory_backend_validates() {
        assert!(memory_config().validate().is_ok());
    }

    #[test]
    fn test_bucket_domain_is_required() {
        let config = ImageShiftConfig {
            bucket_domain: String::new(),
            ..memory_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_s3_requires_bucket_and_region() {
        let mut config = ImageShiftConfig {
            storage_backend: StorageBackend::S3,
            ..memory_config()
        };
        assert!(config.validate().is_err());
        config.s3_bucket = Some("media".to_string());
        assert!(config.validate().is_err());
        config.aws_region = Some("sgp1".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_csrf_enforcement_requires_secret() {
        let mut config = ImageShiftConfig {
            fallback_require_csrf: true,
            ..memory_config()
        };
        assert!(config.validate().is_err());
        config.csrf_secret = Some("x".repeat(32));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_source_fetch_mode_parse() {
        assert_eq!("HTTP".parse::<SourceFetchMode>().unwrap(), SourceFetchMode::Http);
        assert_eq!("storage".parse::<SourceFetchMode>().unwrap(), SourceFetchMode::Storage);
        assert!("ftp".parse::<SourceFetchMode>().is_err());
    }

    #[test]
    fn test_region_fallback_and_rule_assembly() {
        let config = Config::new(ImageShiftConfig {
            aws_region: Some("nyc3".to_string()),
            new_domain: "new.example.com".to_string(),
            old_domains: vec!["old.cdn".to_string()],
            ..memory_config()
        });
        assert_eq!(config.s3_region(), Some("nyc3"));
        let rule = config.domain_rewrite_rule();
        assert_eq!(rule.new_domain, "new.example.com");
        assert_eq!(rule.cdn_suffix, DEFAULT_CDN_SUFFIX);
        assert!(rule.is_active());
    }
}
