use crate::detect::detect_format;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use respdiff_common::{EndpointRequest, FetchConfig, HttpMethod, RawResponse, RespDiffError};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Obtains the raw response of one endpoint
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a response. A successful response with an empty body is returned
    /// as-is; only network and HTTP failures are errors.
    async fn fetch(&self, endpoint: &EndpointRequest) -> Result<RawResponse, RespDiffError>;
}

/// `Fetcher` over HTTP with timeouts and bounded retries
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_retries: usize,
    backoff_base: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, RespDiffError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RespDiffError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        })
    }

    fn build_request(&self, endpoint: &EndpointRequest) -> Result<reqwest::RequestBuilder, RespDiffError> {
        let url = endpoint_url(endpoint)?;
        let mut builder = self.client.request(to_method(endpoint.method), url);

        for (name, value) in &endpoint.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(payload) = &endpoint.payload {
            if !has_header(&endpoint.headers, "content-type") {
                builder = builder.header("Content-Type", payload_content_type(payload));
            }
            builder = builder.body(payload.clone());
        }

        Ok(builder)
    }

    async fn read_response(
        &self,
        endpoint: &EndpointRequest,
        response: reqwest::Response,
    ) -> Result<RawResponse, reqwest::Error> {
        let status_code = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let content_type = headers.get("content-type").cloned().unwrap_or_default();
        let body = response.bytes().await?;

        debug!(
            "{} {} -> {} ({} bytes, {:?})",
            endpoint.method,
            endpoint.url,
            status_code,
            body.len(),
            content_type
        );

        Ok(RawResponse {
            status_code,
            headers,
            body,
            content_type,
        })
    }

    fn should_retry(&self, status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    /// Transient transport failures only; malformed exchanges fail at once
    fn is_retryable_error(&self, err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || err.is_body()
    }

    /// Delay before retry number `attempt` (1-based)
    fn retry_backoff(&self, attempt: usize) -> Duration {
        let capped = attempt.saturating_sub(1).min(5) as u32;
        self.backoff_base * (1 << capped)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, endpoint: &EndpointRequest) -> Result<RawResponse, RespDiffError> {
        let transport = |message: String| RespDiffError::Transport {
            url: endpoint.url.clone(),
            message,
        };

        let mut attempt = 0usize;
        loop {
            let request = self.build_request(endpoint)?;
            let failure = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() || status.is_redirection() {
                        match self.read_response(endpoint, response).await {
                            Ok(raw) => return Ok(raw),
                            Err(err) if self.is_retryable_error(&err) => err.to_string(),
                            Err(err) => return Err(transport(err.to_string())),
                        }
                    } else if self.should_retry(status) {
                        format!("HTTP {}", status)
                    } else {
                        return Err(transport(format!("HTTP {}", status)));
                    }
                }
                Err(err) if self.is_retryable_error(&err) => err.to_string(),
                Err(err) => return Err(transport(err.to_string())),
            };

            if attempt >= self.max_retries {
                return Err(transport(format!(
                    "{} (gave up after {} attempts)",
                    failure,
                    attempt + 1
                )));
            }

            attempt += 1;
            let delay = self.retry_backoff(attempt);
            warn!(
                "Fetching {} failed: {}; retry {}/{} in {:?}",
                endpoint.url, failure, attempt, self.max_retries, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Content type to send with a request payload, classified like a response body
pub fn payload_content_type(payload: &str) -> &'static str {
    detect_format("", payload.as_bytes()).mime_type()
}

/// Parse and validate the endpoint URL, appending its query parameters
pub fn endpoint_url(endpoint: &EndpointRequest) -> Result<Url, RespDiffError> {
    let mut url = Url::parse(&endpoint.url)
        .map_err(|e| RespDiffError::InvalidRequest(format!("Invalid URL '{}': {}", endpoint.url, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(RespDiffError::InvalidRequest(format!(
            "Unsupported URL scheme '{}' in {}",
            url.scheme(),
            endpoint.url
        )));
    }

    if !endpoint.query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &endpoint.query {
            pairs.append_pair(name, value);
        }
    }

    Ok(url)
}

fn has_header(headers: &BTreeMap<String, String>, name: &str) -> bool {
    headers.keys().any(|key| key.eq_ignore_ascii_case(name))
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}
