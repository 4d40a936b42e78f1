//! HTTP lookup client for per-ID record retrieval.
//!
//! The client is created once per run and shared read-only by every
//! concurrent lookup, taking advantage of reqwest's connection pooling.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::RecordLookup;
use super::error::FetchError;
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use crate::record::Record;

/// Default per-request timeout (5 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default User-Agent sent with every lookup.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

/// Default JSON field holding the display name.
pub const DEFAULT_NAME_FIELD: &str = "displayName";

const PLACEHOLDERS: [&str; 2] = ["{id}", "{}"];

/// Endpoint URL template with exactly one integer placeholder (`{}` or `{id}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    prefix: String,
    suffix: String,
}

impl UrlTemplate {
    /// Parses and validates a template.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidTemplate`] when the template does not hold
    /// exactly one placeholder or does not render to an absolute http(s) URL.
    pub fn parse(template: &str) -> Result<Self, FetchError> {
        let count: usize = PLACEHOLDERS
            .iter()
            .map(|marker| template.matches(marker).count())
            .sum();
        if count != 1 {
            return Err(FetchError::invalid_template(
                template,
                format!("expected exactly one `{{}}` or `{{id}}` placeholder, found {count}"),
            ));
        }

        let Some((prefix, suffix)) = PLACEHOLDERS
            .iter()
            .find_map(|marker| template.split_once(marker))
        else {
            return Err(FetchError::invalid_template(template, "placeholder not found"));
        };

        let parsed = Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        };
        let probe = parsed.render(0);
        let url = Url::parse(&probe)
            .map_err(|e| FetchError::invalid_template(template, e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::invalid_template(
                template,
                format!("unsupported scheme `{}`", url.scheme()),
            ));
        }
        Ok(parsed)
    }

    /// Renders the URL for `id`.
    #[must_use]
    pub fn render(&self, id: i64) -> String {
        format!("{}{id}{}", self.prefix, self.suffix)
    }
}

/// Read-only configuration for the lookup client.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// Endpoint URL template.
    pub url_template: String,
    /// JSON field carrying the display name.
    pub name_field: String,
    /// User-Agent header value.
    pub user_agent: String,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
    /// Per-request timeout covering connect, headers and body.
    pub timeout: Duration,
    /// Retry policy for transient failures.
    pub retry_policy: RetryPolicy,
}

impl LookupConfig {
    /// Creates a configuration with default headers, timeout and retry policy.
    #[must_use]
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            name_field: DEFAULT_NAME_FIELD.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_invalid_certs: false,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// HTTP client performing one classified lookup per ID.
///
/// # Example
///
/// ```no_run
/// use idscan_core::fetch::{LookupClient, LookupConfig, RecordLookup};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = LookupClient::new(LookupConfig::new("https://api.example.com/users/{}"))?;
/// if let Some(record) = client.fetch(42).await {
///     println!("{} -> {}", record.id, record.display_name);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LookupClient {
    client: Client,
    template: UrlTemplate,
    name_field: String,
    retry_policy: RetryPolicy,
}

impl LookupClient {
    /// Builds the client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidTemplate`] for a bad template and
    /// [`FetchError::ClientBuild`] if reqwest rejects the configuration.
    #[instrument(level = "debug", skip(config), fields(template = %config.url_template))]
    pub fn new(config: LookupConfig) -> Result<Self, FetchError> {
        let template = UrlTemplate::parse(&config.url_template)?;
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .gzip(true)
            .user_agent(config.user_agent.as_str())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(FetchError::ClientBuild)?;

        debug!(
            timeout_ms = config.timeout.as_millis(),
            max_attempts = config.retry_policy.max_attempts(),
            insecure_tls = config.accept_invalid_certs,
            "created lookup client"
        );

        Ok(Self {
            client,
            template,
            name_field: config.name_field,
            retry_policy: config.retry_policy,
        })
    }

    /// Renders the endpoint URL for `id`.
    #[must_use]
    pub fn url_for(&self, id: i64) -> String {
        self.template.render(id)
    }

    /// Looks up `id`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the final error together with the number of attempts made.
    pub async fn lookup(&self, id: i64) -> Result<Record, (FetchError, u32)> {
        let url = self.url_for(id);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.fetch_name(&url).await {
                Ok(display_name) => return Ok(Record::new(id, display_name)),
                Err(e) => match self.retry_policy.should_retry(classify_error(&e), attempt) {
                    RetryDecision::Retry { delay, attempt: next_attempt } => {
                        debug!(id, attempt = next_attempt, delay_ms = delay.as_millis(), error = %e, "retrying lookup");
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(id, %reason, "not retrying lookup");
                        return Err((e, attempt));
                    }
                },
            }
        }
    }

    async fn fetch_name(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::http_status(url, response.status().as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        let value: Value = serde_json::from_slice(&body).map_err(|e| FetchError::decode(url, e))?;

        value
            .get(&self.name_field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| FetchError::missing_field(url, &self.name_field))
    }
}

#[async_trait]
impl RecordLookup for LookupClient {
    async fn fetch(&self, id: i64) -> Option<Record> {
        match self.lookup(id).await {
            Ok(record) => Some(record),
            Err((e, attempts)) => {
                debug!(id, attempts, error = %e, "id absent");
                None
            }
        }
    }
}
