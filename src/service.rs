use crate::canonicalizer::{canonicalize, UrlResolver};
use crate::classifier::Classification;
use crate::config::{CacheStrategy, ParserConfig};
use crate::oembed::{as_oembed, OEmbedProjection};
use crate::providers::{ExtractionContext, ProviderRegistry};
use crate::screenshot::{NoopScreenshotQueue, ScreenshotQueue};
use crate::{Cache, Fetcher, MediaError, MediaParser, MediaRecord, MetadataExtractor, Provider};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

/// Per-request switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Recompute even when a record is cached, then refresh the entry.
    pub force: bool,
}

/// MediaService runs the whole pipeline: canonicalize, resolve, classify,
/// extract and cache.
#[derive(Clone)]
pub struct MediaService {
    registry: Arc<ProviderRegistry>,
    fetcher: Fetcher,
    resolver: UrlResolver,
    metadata: MetadataExtractor,
    pub cache: Cache,
    screenshots: Arc<dyn ScreenshotQueue>,
    config: Arc<ParserConfig>,
    // Max Concurrent Requests
    semaphore: Arc<Semaphore>,
}

impl Default for MediaService {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaService {
    /// Service with default configuration and 1000 cache entries.
    pub fn new() -> Self {
        Self::new_with_config(ParserConfig::default())
    }

    pub fn from_env() -> Self {
        Self::new_with_config(ParserConfig::from_env())
    }

    pub fn new_with_config(config: ParserConfig) -> Self {
        Self::with_cache_cap(config, 1000)
    }

    pub fn with_cache_cap(config: ParserConfig, cache_capacity: usize) -> Self {
        debug!(
            cache_capacity,
            cache_strategy = ?config.cache_strategy,
            "Initializing MediaService"
        );

        let fetcher = Fetcher::new_with_config(&config);
        let resolver = UrlResolver::new(
            fetcher.clone(),
            config.max_redirects,
            config.upgrade_to_https,
        );

        Self {
            registry: Arc::new(ProviderRegistry::new()),
            resolver,
            fetcher,
            metadata: MetadataExtractor::new(),
            cache: Cache::new(cache_capacity),
            screenshots: Arc::new(NoopScreenshotQueue),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            config: Arc::new(config),
        }
    }

    /// Replaces the queue that receives screenshot jobs.
    pub fn with_screenshot_queue(mut self, queue: impl ScreenshotQueue + 'static) -> Self {
        self.screenshots = Arc::new(queue);
        self
    }

    /// Replaces the HTTP layer, for custom clients (proxies, DNS overrides).
    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.resolver = UrlResolver::new(
            fetcher.clone(),
            self.config.max_redirects,
            self.config.upgrade_to_https,
        );
        self.fetcher = fetcher;
        self
    }

    /// Replaces the provider table, e.g. to add a custom extractor.
    pub fn with_registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub async fn parse(&self, url: &str) -> Result<MediaRecord, MediaError> {
        self.parse_with(url, ParseOptions::default()).await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn parse_with(
        &self,
        url: &str,
        options: ParseOptions,
    ) -> Result<MediaRecord, MediaError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| MediaError::ConcurrencyLimitError)?;

        let original_url = url.trim();
        let canonical_url = canonicalize(original_url)?;

        let strategy = if options.force {
            CacheStrategy::ForceUpdate
        } else {
            self.config.cache_strategy
        };

        let mut record = match strategy {
            CacheStrategy::NoCache => {
                let resolved = self.resolver.resolve(&canonical_url).await;
                self.extract(original_url, &resolved).await?
            }
            CacheStrategy::UseCache => {
                if let Some(cached) = self.cache.get(&canonical_url) {
                    debug!(url = %canonical_url, "Serving cached record");
                    cached
                } else {
                    let resolved = self.resolver.resolve(&canonical_url).await;
                    let record = self
                        .cache
                        .get_or_try_init(&resolved, || self.extract(original_url, &resolved))
                        .await?;
                    self.cache.put_if_absent(canonical_url.as_str(), record.clone());
                    self.cache.put_if_absent(record.canonical_url.as_str(), record.clone());
                    record
                }
            }
            CacheStrategy::ForceUpdate => {
                let resolved = self.resolver.resolve(&canonical_url).await;
                let record = self
                    .cache
                    .refresh(&resolved, || self.extract(original_url, &resolved))
                    .await?;
                self.cache.put(canonical_url.as_str(), record.clone());
                self.cache.put(record.canonical_url.as_str(), record.clone());
                record
            }
        };

        // Cached records may have been computed for another spelling.
        record.url = original_url.to_string();
        Ok(record)
    }

    /// Parses every URL concurrently, bounded by the service semaphore.
    pub async fn parse_batch(&self, urls: &[&str]) -> Vec<Result<MediaRecord, MediaError>> {
        join_all(urls.iter().map(|url| self.parse(url))).await
    }

    pub fn as_oembed(
        &self,
        record: &MediaRecord,
        viewer_url: &str,
        width: u32,
        height: u32,
    ) -> OEmbedProjection {
        as_oembed(record, viewer_url, width, height)
    }

    /// Classifies `resolved_url` and runs its provider's extractor.
    async fn extract(
        &self,
        original_url: &str,
        resolved_url: &str,
    ) -> Result<MediaRecord, MediaError> {
        let mut classification = self.registry.classify(resolved_url);
        let extractor = match self.registry.extractor_for(classification.provider) {
            Some(extractor) => extractor,
            None => {
                debug!(provider = %classification.provider, "No extractor registered, treating as page");
                classification = Classification::fallback();
                self.registry
                    .extractor_for(Provider::Page)
                    .ok_or_else(|| MediaError::ExtractError("no page extractor registered".into()))?
            }
        };

        debug!(
            url = %resolved_url,
            provider = %classification.provider,
            rule = %classification.rule,
            "Classified URL"
        );

        let mut ctx = ExtractionContext::new(
            original_url,
            resolved_url,
            classification,
            &self.fetcher,
            &self.metadata,
            &self.config,
            self.screenshots.as_ref(),
        );

        if let Err(e) = extractor.extract(&mut ctx).await {
            e.log();
            return Err(e);
        }
        Ok(ctx.record)
    }
}

#[async_trait]
impl MediaParser for MediaService {
    async fn parse(&self, url: &str) -> Result<MediaRecord, MediaError> {
        MediaService::parse(self, url).await
    }
}
