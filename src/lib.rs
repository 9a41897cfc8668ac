//! Classifies social and web media URLs and extracts normalized metadata
//! records.
//!
//! ```ignore
//! let service = MediaService::from_env();
//! let record = service.parse("https://www.facebook.com/teste637621352/posts/1028416870556238").await?;
//! println!("{}", record.to_json());
//! ```

use async_trait::async_trait;

mod cache;
pub mod canonicalizer;
pub mod classifier;
mod config;
mod error;
mod fetcher;
#[cfg(feature = "logging")]
mod logging;
mod metadata;
mod oembed;
pub mod providers;
mod record;
mod screenshot;
mod service;
pub mod utils;

pub use cache::Cache;
pub use canonicalizer::{canonicalize, UrlResolver};
pub use classifier::{Classification, PatternRule, PatternTable};
pub use config::{
    ApiCredentials, ApiEndpoints, CacheStrategy, ParserConfig, DEFAULT_MAX_REDIRECTS,
    MAX_CONCURRENT_REQUESTS,
};
pub use error::{ErrorKind, MediaError};
pub use fetcher::{ApiResponse, FetchedPage, Fetcher, OEmbedPayload, OEmbedResponse, Probe};
#[cfg(feature = "logging")]
pub use logging::{log_error_card, log_media_card, setup_logging, LogConfig, LogLevelGuard};
pub use metadata::{MetadataExtractor, PageMetadata};
pub use oembed::{as_oembed, OEmbedProjection};
pub use providers::{ExtractionContext, MediaExtractor, ProviderRegistry};
pub use record::{
    EvidenceSource, Fields, Identity, MediaRecord, MediaType, Provider, RawEvidence, RecordError,
    Subtype,
};
pub use screenshot::{
    placeholder_url, ChannelScreenshotQueue, NoopScreenshotQueue, ScreenshotJob, ScreenshotQueue,
};
pub use service::{MediaService, ParseOptions};

#[async_trait]
pub trait MediaParser {
    async fn parse(&self, url: &str) -> Result<MediaRecord, MediaError>;
}
