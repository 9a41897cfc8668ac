use crate::config::ParserConfig;
use crate::MediaError;
use reqwest::{header, redirect::Policy, Client, Method, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

const RETRY_DELAY: Duration = Duration::from_millis(250);

/// A fetched HTML page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after the client followed redirects.
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// Result of a single non-following request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Redirect(String),
    Final(u16),
}

/// A provider API answer. Non-2xx answers are returned, not raised, so each
/// provider can classify its own error payloads.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OEmbedResponse {
    pub html: String,
    pub title: String,
    pub author_name: String,
    pub author_url: String,
    pub provider_name: String,
    pub provider_url: String,
    pub thumbnail_url: String,
}

impl OEmbedResponse {
    /// Reads the string members of an oEmbed document. Providers send
    /// `null` or omit members freely; both read as blank.
    pub fn from_raw(raw: &Value) -> Self {
        let member = |key: &str| raw.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
        Self {
            html: member("html"),
            title: member("title"),
            author_name: member("author_name"),
            author_url: member("author_url"),
            provider_name: member("provider_name"),
            provider_url: member("provider_url"),
            thumbnail_url: member("thumbnail_url"),
        }
    }
}

/// Typed oEmbed fields plus the payload exactly as served.
#[derive(Debug, Clone)]
pub struct OEmbedPayload {
    pub data: OEmbedResponse,
    pub raw: Value,
    pub frame_restricted: bool,
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    probe_client: Client,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher {
    pub fn new() -> Self {
        debug!("Fetcher initialized with default configuration");
        Self::new_with_config(&ParserConfig::default())
    }

    pub fn new_with_config(config: &ParserConfig) -> Self {
        let client = build_client(config, Policy::limited(config.max_redirects));
        let probe_client = build_client(config, Policy::none());
        Fetcher {
            client,
            probe_client,
        }
    }

    /// Wraps pre-built clients; `probe_client` must not follow redirects.
    pub fn with_clients(client: Client, probe_client: Client) -> Self {
        Self {
            client,
            probe_client,
        }
    }

    /// Fetches a page body. A body that fails to decompress is requested
    /// once more without content encoding; a connection failure or timeout
    /// gets one more attempt after a short pause. HTTP error statuses are
    /// final.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn fetch_html(&self, url: &str) -> Result<FetchedPage, MediaError> {
        let page = match self.fetch_html_with_encoding(url, None).await {
            Err(MediaError::DecompressionError(e)) => {
                warn!(url = %url, error = %e, "Retrying without content encoding");
                self.fetch_html_with_encoding(url, Some("identity")).await
            }
            Err(e @ (MediaError::FetchError(_) | MediaError::TimeoutError(_))) => {
                warn!(url = %url, error = %e, "Request failed, retrying after delay");
                tokio::time::sleep(RETRY_DELAY).await;
                self.fetch_html_with_encoding(url, Some("identity")).await
            }
            other => other,
        }?;

        if !(200..300).contains(&page.status) {
            return Err(MediaError::FetchError(format!(
                "{url} returned HTTP {}",
                page.status
            )));
        }
        Ok(page)
    }

    async fn fetch_html_with_encoding(
        &self,
        url: &str,
        accept_encoding: Option<&str>,
    ) -> Result<FetchedPage, MediaError> {
        let mut request = self
            .client
            .get(url)
            .header(header::ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9");
        if let Some(encoding) = accept_encoding {
            request = request.header(header::ACCEPT_ENCODING, encoding);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, url = %url, "Failed to send request");
            MediaError::from_reqwest(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Ok(FetchedPage {
                url: response.url().to_string(),
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let final_url = response.url().to_string();
        let body = response.text().await.map_err(|e| {
            error!(error = %e, url = %url, "Failed to read response body");
            MediaError::from_reqwest(e)
        })?;

        debug!(url = %url, content_length = body.len(), "Successfully fetched webpage");
        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }

    /// GET a JSON API. `bearer` becomes an `Authorization` header.
    #[instrument(level = "debug", skip(self, bearer), err)]
    pub async fn get_json(
        &self,
        service: &str,
        url: &str,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, MediaError> {
        let mut request = self.client.get(url).header(header::ACCEPT, "application/json");
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| {
            error!(error = %e, service = %service, "API request failed");
            MediaError::from_reqwest(e)
        })?;
        Self::read_api_response(service, response).await
    }

    /// POST a JSON body to an API.
    #[instrument(level = "debug", skip(self, body, bearer), err)]
    pub async fn post_json(
        &self,
        service: &str,
        url: &str,
        body: &Value,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, MediaError> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| {
            error!(error = %e, service = %service, "API request failed");
            MediaError::from_reqwest(e)
        })?;
        Self::read_api_response(service, response).await
    }

    async fn read_api_response(service: &str, response: Response) -> Result<ApiResponse, MediaError> {
        let status = response.status();
        let text = response.text().await.map_err(|e| {
            error!(error = %e, service = %service, "Failed to read API response");
            MediaError::from_reqwest(e)
        })?;

        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        debug!(service = %service, status = %status, "API responded");
        Ok(ApiResponse { status, body })
    }

    /// Fetches an oEmbed document from a fully built endpoint URL.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn fetch_oembed(&self, service: &str, endpoint: &str) -> Result<OEmbedPayload, MediaError> {
        let response = self.client.get(endpoint).send().await.map_err(|e| {
            error!(error = %e, endpoint = %endpoint, "Failed to fetch oEmbed");
            MediaError::ExternalServiceError {
                service: service.to_string(),
                message: e.to_string(),
            }
        })?;

        if !response.status().is_success() {
            return Err(MediaError::ExternalServiceError {
                service: service.to_string(),
                message: format!("oEmbed endpoint returned HTTP {}", response.status()),
            });
        }

        let frame_restricted = response.headers().contains_key("x-frame-options");
        let raw: Value = response.json().await.map_err(|e| {
            error!(error = %e, endpoint = %endpoint, "Failed to parse oEmbed response");
            MediaError::ExternalServiceError {
                service: service.to_string(),
                message: e.to_string(),
            }
        })?;
        if !raw.is_object() {
            return Err(MediaError::ExternalServiceError {
                service: service.to_string(),
                message: "oEmbed response is not a JSON object".to_string(),
            });
        }
        let data = OEmbedResponse::from_raw(&raw);

        debug!(endpoint = %endpoint, "Successfully fetched oEmbed data");
        Ok(OEmbedPayload {
            data,
            raw,
            frame_restricted,
        })
    }

    /// One request without following redirects. HEAD first, GET when the
    /// server refuses HEAD.
    pub async fn probe(&self, url: &str) -> Result<Probe, MediaError> {
        let mut response = self.send_probe(Method::HEAD, url).await?;
        if matches!(
            response.status(),
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
        ) {
            response = self.send_probe(Method::GET, url).await?;
        }

        let status = response.status();
        if status.is_redirection() {
            if let Some(location) = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
            {
                return Ok(Probe::Redirect(location.to_string()));
            }
        }
        Ok(Probe::Final(status.as_u16()))
    }

    async fn send_probe(&self, method: Method, url: &str) -> Result<Response, MediaError> {
        self.probe_client
            .request(method, url)
            .send()
            .await
            .map_err(MediaError::from_reqwest)
    }

    pub async fn is_reachable(&self, url: &str) -> bool {
        match self.probe(url).await {
            Ok(Probe::Redirect(_)) => true,
            Ok(Probe::Final(status)) => status < 400,
            Err(e) => {
                debug!(url = %url, error = %e, "URL not reachable");
                false
            }
        }
    }
}

fn build_client(config: &ParserConfig, redirect: Policy) -> Client {
    Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.timeout.min(Duration::from_secs(10)))
        .user_agent(config.user_agent.as_str())
        .redirect(redirect)
        .pool_max_idle_per_host(10)
        .build()
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to create HTTP client");
            panic!("Failed to initialize HTTP client: {}", e);
        })
}
