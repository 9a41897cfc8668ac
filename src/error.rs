use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Failed to parse URL: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to fetch content: {0}")]
    FetchError(String),

    #[error("Failed to decompress response body: {0}")]
    DecompressionError(String),

    #[error("Request timeout: {0}")]
    TimeoutError(String),

    #[error("Failed to extract metadata: {0}")]
    ExtractError(String),

    #[error("Rate limit reached for {provider}: {message}")]
    RateLimited { provider: String, message: String },

    #[error("Invalid or expired credentials for {provider}: {message}")]
    AuthInvalid { provider: String, message: String },

    #[error("External service error: {service} - {message}")]
    ExternalServiceError { service: String, message: String },

    #[error("Concurrency limit reached")]
    ConcurrencyLimitError,
}

impl MediaError {
    pub fn log(&self) {
        match self {
            MediaError::UrlParseError(e) => {
                warn!(error = %e, "URL parsing failed");
            }
            MediaError::InvalidUrl(e) => {
                warn!(error = %e, "Invalid URL rejected");
            }
            MediaError::FetchError(e) => {
                error!(error = %e, "Content fetch failed");
            }
            MediaError::DecompressionError(e) => {
                warn!(error = %e, "Response body could not be decompressed");
            }
            MediaError::TimeoutError(e) => {
                warn!(error = %e, "Request timed out");
            }
            MediaError::ExtractError(e) => {
                error!(error = %e, "Metadata extraction failed");
            }
            MediaError::RateLimited { provider, message } => {
                warn!(provider = %provider, error = %message, "Rate limit reached");
            }
            MediaError::AuthInvalid { provider, message } => {
                error!(
                    provider = %provider,
                    error = %message,
                    "Provider rejected API credentials"
                );
            }
            MediaError::ExternalServiceError { service, message } => {
                error!(
                    service = %service,
                    error = %message,
                    "External service error occurred"
                );
            }
            MediaError::ConcurrencyLimitError => {
                warn!("Concurrency limit reached");
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::RateLimited { .. } => ErrorKind::RateLimited,
            MediaError::AuthInvalid { .. } => ErrorKind::AuthInvalid,
            MediaError::FetchError(_)
            | MediaError::DecompressionError(_)
            | MediaError::TimeoutError(_)
            | MediaError::ExternalServiceError { .. }
            | MediaError::ConcurrencyLimitError => ErrorKind::Network,
            MediaError::UrlParseError(_) | MediaError::InvalidUrl(_) => {
                ErrorKind::UnresolvableIdentity
            }
            MediaError::ExtractError(_) => ErrorKind::Extraction,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, MediaError::RateLimited { .. })
    }

    /// Maps a reqwest failure onto the taxonomy, keeping timeouts and body
    /// decoding failures distinguishable from plain connection errors.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MediaError::TimeoutError(e.to_string())
        } else if e.is_decode() {
            MediaError::DecompressionError(e.to_string())
        } else {
            MediaError::FetchError(e.to_string())
        }
    }
}

/// Failure classes carried by a best-effort record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    AuthInvalid,
    Network,
    MalformedPage,
    UnresolvableIdentity,
    Extraction,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::AuthInvalid => "auth_invalid",
            ErrorKind::Network => "network",
            ErrorKind::MalformedPage => "malformed_page",
            ErrorKind::UnresolvableIdentity => "unresolvable_identity",
            ErrorKind::Extraction => "extraction",
        };
        f.write_str(name)
    }
}
