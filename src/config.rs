use std::time::Duration;
use tracing::debug;

pub const MAX_CONCURRENT_REQUESTS: usize = 500;
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// How the service consults the result cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    #[default]
    UseCache,
    NoCache,
    /// Always recompute and refresh the stored entry.
    ForceUpdate,
}

/// Credentials for first-party provider APIs. Blank values disable the
/// corresponding authoritative strategy.
#[derive(Debug, Clone, Default)]
pub struct ApiCredentials {
    pub facebook_auth_token: Option<String>,
    pub twitter_bearer_token: Option<String>,
    pub youtube_api_key: Option<String>,
    pub dropbox_access_token: Option<String>,
}

/// Provider endpoints. Overridable so tests can point them at a local server.
#[derive(Debug, Clone)]
pub struct ApiEndpoints {
    pub facebook_graph: String,
    pub facebook_oembed: String,
    pub twitter_api: String,
    pub twitter_oembed: String,
    pub youtube_api: String,
    pub youtube_oembed: String,
    pub instagram_web: String,
    pub instagram_oembed: String,
    pub dropbox_api: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            facebook_graph: "https://graph.facebook.com/v2.6".to_string(),
            facebook_oembed: "https://www.facebook.com/plugins/post/oembed.json/".to_string(),
            twitter_api: "https://api.twitter.com/1.1".to_string(),
            twitter_oembed: "https://publish.twitter.com/oembed".to_string(),
            youtube_api: "https://www.googleapis.com/youtube/v3".to_string(),
            youtube_oembed: "https://www.youtube.com/oembed".to_string(),
            instagram_web: "https://www.instagram.com".to_string(),
            instagram_oembed: "https://api.instagram.com/oembed/".to_string(),
            dropbox_api: "https://api.dropboxapi.com/2".to_string(),
        }
    }
}

/// Configuration passed explicitly through the pipeline.
///
/// # Examples
/// ```ignore
/// let config = ParserConfig::from_env()
///     .with_timeout(Duration::from_secs(20))
///     .with_screenshot_base_url("https://media.example.org");
/// let service = MediaService::new_with_config(config);
/// ```
#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub credentials: ApiCredentials,
    pub endpoints: ApiEndpoints,
    pub user_agent: String,
    pub timeout: Duration,
    pub max_redirects: usize,
    /// Probe the `https://` variant of plain `http://` URLs.
    pub upgrade_to_https: bool,
    pub screenshot_base_url: String,
    pub cache_strategy: CacheStrategy,
    pub max_concurrent_requests: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            credentials: ApiCredentials::default(),
            endpoints: ApiEndpoints::default(),
            user_agent: "Mozilla/5.0 (compatible; media_parser/0.1)".to_string(),
            timeout: Duration::from_secs(20),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            upgrade_to_https: true,
            screenshot_base_url: "http://localhost".to_string(),
            cache_strategy: CacheStrategy::UseCache,
            max_concurrent_requests: MAX_CONCURRENT_REQUESTS,
        }
    }
}

impl ParserConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads credentials and the screenshot host from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.credentials.facebook_auth_token = env_value("FACEBOOK_AUTH_TOKEN");
        config.credentials.twitter_bearer_token = env_value("TWITTER_BEARER_TOKEN");
        config.credentials.youtube_api_key = env_value("YOUTUBE_API_KEY");
        config.credentials.dropbox_access_token = env_value("DROPBOX_ACCESS_TOKEN");

        if let Some(base_url) = env_value("SCREENSHOT_BASE_URL") {
            config.screenshot_base_url = base_url;
        }

        debug!(
            facebook = config.credentials.facebook_auth_token.is_some(),
            twitter = config.credentials.twitter_bearer_token.is_some(),
            youtube = config.credentials.youtube_api_key.is_some(),
            dropbox = config.credentials.dropbox_access_token.is_some(),
            "Loaded API credentials from environment"
        );
        config
    }

    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_endpoints(mut self, endpoints: ApiEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_https_upgrade(mut self, enabled: bool) -> Self {
        self.upgrade_to_https = enabled;
        self
    }

    pub fn with_screenshot_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.screenshot_base_url = base_url.into();
        self
    }

    pub fn with_cache_strategy(mut self, cache_strategy: CacheStrategy) -> Self {
        self.cache_strategy = cache_strategy;
        self
    }

    pub fn with_max_concurrent_requests(mut self, max_concurrent_requests: usize) -> Self {
        self.max_concurrent_requests = max_concurrent_requests;
        self
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let config = ParserConfig::new()
            .with_timeout(Duration::from_secs(3))
            .with_max_redirects(2)
            .with_https_upgrade(false)
            .with_cache_strategy(CacheStrategy::NoCache);

        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.max_redirects, 2);
        assert!(!config.upgrade_to_https);
        assert_eq!(config.cache_strategy, CacheStrategy::NoCache);
        assert_eq!(config.max_concurrent_requests, MAX_CONCURRENT_REQUESTS);
    }

    #[test]
    fn test_default_endpoints() {
        let endpoints = ApiEndpoints::default();
        assert!(endpoints.facebook_graph.ends_with("/v2.6"));
        assert!(endpoints.twitter_oembed.starts_with("https://publish.twitter.com"));
    }
}
