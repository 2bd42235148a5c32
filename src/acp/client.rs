//! HTTP client for the ACP observatory web interface
//!
//! This module provides the [`AcpClient`], which drives an ACP server
//! through its ASP pages with features including:
//! - Basic authentication with a persistent cookie session
//! - Rate limiting with governor
//! - Automatic retry with exponential backoff for transient failures
//! - Page title extraction on connect
//! - Imaging plan form building

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT},
    Client, Method, StatusCode,
};
use scraper::{Html, Selector};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use super::error::{AcpError, AcpResult};
use super::status::{extract_warnings, ObservatoryStatus};
use super::ObservatoryClient;
use crate::config::ServerConfig;
use crate::models::{ImagingPlan, StatusSnapshot};
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Number of filter rows the acquisition form accepts
pub const MAX_FILTER_SLOTS: usize = 16;

const INDEX_PAGE: &str = "/index.asp";
const STATUS_PAGE: &str = "/ac/asystemstatus.asp";
const PLAN_FORM: &str = "/ac/aacqform.asp";
const STOP_SCRIPT: &str = "/ac/astopscript.asp";

/// ACP web client
pub struct AcpClient {
    /// HTTP client with cookie store, timeout and default headers
    client: Client,

    /// Server root, e.g. `http://observatory.local/`
    base_url: Url,

    username: String,
    password: String,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Request-level retry with backoff
    retry: RetryConfig,

    connected: AtomicBool,

    /// `<title>` of the index page, recorded on connect
    title: RwLock<Option<String>>,
}

impl AcpClient {
    /// Create a client from the `[server]` configuration section
    ///
    /// # Errors
    ///
    /// Returns `AcpError::InvalidUrl` for a malformed server URL and
    /// `AcpError::Http` if the HTTP client cannot be created
    pub fn new(config: &ServerConfig) -> AcpResult<Self> {
        let base_url = Self::parse_base_url(&config.url)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,*/*;q=0.8"));
        if let Ok(agent) = HeaderValue::from_str(&config.user_agent) {
            headers.insert(USER_AGENT, agent);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .gzip(true)
            .cookie_store(true)
            .default_headers(headers)
            .build()?;

        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
            rate_limiter,
            retry: RetryConfig::with_delays(
                config.max_retries,
                config.retry_delay_ms,
                config.retry_delay_ms.saturating_mul(8),
            ),
            connected: AtomicBool::new(false),
            title: RwLock::new(None),
        })
    }

    /// Create a client against a custom base URL for testing
    pub fn with_base_url(base_url: &str, username: &str, password: &str) -> AcpResult<Self> {
        let config = ServerConfig {
            url: base_url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            ..ServerConfig::default()
        };
        Self::new(&config)
    }

    /// Override the request retry configuration
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn parse_base_url(raw: &str) -> AcpResult<Url> {
        let trimmed = raw.trim();
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };
        Url::parse(&with_scheme).map_err(|e| AcpError::InvalidUrl(format!("{raw}: {e}")))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Title of the ACP index page, once connected
    pub async fn title(&self) -> Option<String> {
        self.title.read().await.clone()
    }

    fn endpoint(&self, path: &str) -> AcpResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AcpError::InvalidUrl(format!("{path}: {e}")))
    }

    fn ensure_connected(&self) -> AcpResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(AcpError::NotConnected)
        }
    }

    /// Map a non-success status code to an error
    ///
    /// 401 is an authentication failure; 429 and 5xx are server errors and
    /// retried; everything else is rejected without retry.
    fn status_error(status: StatusCode, url: &Url) -> AcpError {
        let url = url.to_string();
        match status.as_u16() {
            401 => AcpError::Unauthorized { url },
            429 | 500..=599 => AcpError::Server {
                status: status.as_u16(),
                url,
            },
            code => AcpError::Rejected { status: code, url },
        }
    }

    fn transport_error(err: reqwest::Error, url: &Url) -> AcpError {
        if err.is_timeout() {
            AcpError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_connect() {
            AcpError::Connection(err.to_string())
        } else {
            AcpError::Http(err)
        }
    }

    /// Send one request with rate limiting and retry, returning the body
    async fn request(
        &self,
        method: Method,
        path: &str,
        form: Option<&[(String, String)]>,
    ) -> AcpResult<String> {
        let url = self.endpoint(path)?;
        let url = &url;
        let method = &method;

        with_retry_if(
            &self.retry,
            || async move {
                self.rate_limiter.until_ready().await;

                let builder = self
                    .client
                    .request(method.clone(), url.clone())
                    .basic_auth(&self.username, Some(&self.password));
                let builder = match form {
                    Some(fields) => builder.form(fields),
                    None => builder.body(""),
                };

                let response = builder
                    .send()
                    .await
                    .map_err(|e| Self::transport_error(e, url))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(Self::status_error(status, url));
                }

                response.text().await.map_err(|e| Self::transport_error(e, url))
            },
            AcpError::is_recoverable,
        )
        .await
    }

    /// Fetch and decode the full status page
    pub async fn observatory_status(&self) -> AcpResult<ObservatoryStatus> {
        self.ensure_connected()?;
        let body = self.request(Method::POST, STATUS_PAGE, None).await?;
        let status = ObservatoryStatus::parse_response(&body)?;
        if !status.warnings.is_empty() {
            warn!(warnings = %status.warnings.join("; "), "Observatory reported warnings");
        }
        Ok(status)
    }
}

/// Extract the text of the first `<title>` element
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Build the `aacqform.asp` fields for a plan
///
/// Filters beyond [`MAX_FILTER_SLOTS`] are dropped; unused slots are sent
/// empty with filter `0` and binning `1`.
pub fn build_plan_form(plan: &ImagingPlan) -> Vec<(String, String)> {
    let yes_no = |flag: bool| if flag { "yes" } else { "no" }.to_string();

    let mut form = vec![
        ("Target".to_string(), plan.target.clone()),
        ("visOnly".to_string(), "true".to_string()),
        ("isOrb".to_string(), "dsky".to_string()),
        ("RA".to_string(), plan.ra.clone()),
        ("Dec".to_string(), plan.dec.clone()),
        ("Dither".to_string(), plan.dither.to_string()),
        ("AF".to_string(), yes_no(plan.auto_focus)),
        ("PerAF".to_string(), yes_no(plan.periodic_af_interval > 0)),
        ("PerAFInt".to_string(), plan.periodic_af_interval.to_string()),
    ];

    for slot in 1..=MAX_FILTER_SLOTS {
        let (used, count, filter, exposure, binning) = match plan.filters.get(slot - 1) {
            Some(f) => (
                "yes".to_string(),
                f.count.to_string(),
                f.filter_id.to_string(),
                f.exposure_seconds.to_string(),
                f.binning.to_string(),
            ),
            None => (
                String::new(),
                String::new(),
                "0".to_string(),
                String::new(),
                "1".to_string(),
            ),
        };
        form.push((format!("ColorUse{slot}"), used));
        form.push((format!("ColorCount{slot}"), count));
        form.push((format!("ColorFilter{slot}"), filter));
        form.push((format!("ColorExposure{slot}"), exposure));
        form.push((format!("ColorBinning{slot}"), binning));
    }

    form
}

#[async_trait]
impl ObservatoryClient for AcpClient {
    fn name(&self) -> &str {
        "acp"
    }

    async fn connect(&self) -> AcpResult<()> {
        info!(url = %self.base_url, user = %self.username, "Connecting to ACP server");
        let body = self.request(Method::GET, INDEX_PAGE, None).await?;

        let title = extract_title(&body);
        info!(title = ?title, "Connected to ACP server");
        *self.title.write().await = title;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!(url = %self.base_url, "Disconnected from ACP server");
        }
    }

    async fn get_status(&self) -> AcpResult<StatusSnapshot> {
        let status = self.observatory_status().await?;
        debug!(
            observatory = %status.observatory_status,
            owner = %status.owner,
            filter = %status.image_filter,
            progress = %status.plan_progress,
            "Observatory status"
        );
        Ok(status.to_snapshot())
    }

    async fn submit_plan(&self, plan: &ImagingPlan) -> AcpResult<()> {
        self.ensure_connected()?;
        let form = build_plan_form(plan);
        if plan.filters.len() > MAX_FILTER_SLOTS {
            warn!(
                target = %plan.target,
                filters = plan.filters.len(),
                "Plan has more filters than the form accepts, extra rows dropped"
            );
        }

        let body = self.request(Method::POST, PLAN_FORM, Some(&form)).await?;
        debug!(target = %plan.target, response = %body.trim(), "Plan submission response");

        if body.to_lowercase().contains("warning") {
            let warnings = extract_warnings(&body);
            let message = if warnings.is_empty() {
                "imaging plan start returned a warning".to_string()
            } else {
                warnings.join("; ")
            };
            return Err(AcpError::Warning(message));
        }

        info!(target = %plan.target, images = plan.total_images(), "Imaging plan started");
        Ok(())
    }

    async fn stop_current_operation(&self, wait: Duration) -> AcpResult<bool> {
        self.ensure_connected()?;
        let form = [("Command".to_string(), "StopScript".to_string())];
        let body = self.request(Method::POST, STOP_SCRIPT, Some(&form)).await?;
        let received = body.contains("Received");
        debug!(received, settle_secs = wait.as_secs(), "Stop script response");
        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FilterExposure, ImagingDefaults, Target};
    use chrono::Utc;

    fn field<'a>(form: &'a [(String, String)], key: &str) -> &'a str {
        form.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[test]
    fn test_build_plan_form() {
        let target = Target::new("M42", "05:35:17", "-05:23:28", Utc::now())
            .with_filter(FilterExposure::new(0, "L", 300.0, 10))
            .with_filter(FilterExposure::new(4, "Ha", 2.5, 20).with_binning(2));
        let defaults = ImagingDefaults {
            dither: 3,
            auto_focus: false,
            periodic_af_interval: 0,
        };
        let form = build_plan_form(&target.imaging_plan(&defaults));

        assert_eq!(form.len(), 9 + 5 * MAX_FILTER_SLOTS);
        assert_eq!(field(&form, "Target"), "M42");
        assert_eq!(field(&form, "isOrb"), "dsky");
        assert_eq!(field(&form, "Dither"), "3");
        assert_eq!(field(&form, "AF"), "no");
        assert_eq!(field(&form, "PerAF"), "no");
        assert_eq!(field(&form, "ColorUse1"), "yes");
        assert_eq!(field(&form, "ColorExposure1"), "300");
        assert_eq!(field(&form, "ColorFilter2"), "4");
        assert_eq!(field(&form, "ColorExposure2"), "2.5");
        assert_eq!(field(&form, "ColorBinning2"), "2");
        assert_eq!(field(&form, "ColorUse3"), "");
        assert_eq!(field(&form, "ColorFilter16"), "0");
        assert_eq!(field(&form, "ColorBinning16"), "1");
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_title("<html><head><title> ACP Observatory Control </title></head></html>")
                .as_deref(),
            Some("ACP Observatory Control")
        );
        assert!(extract_title("<html><body>no title</body></html>").is_none());
    }

    #[test]
    fn test_base_url_without_scheme() {
        let client = AcpClient::with_base_url("observatory.local:8080", "user", "pw").unwrap();
        assert_eq!(client.base_url().as_str(), "http://observatory.local:8080/");
        assert_eq!(
            client.endpoint(STATUS_PAGE).unwrap().as_str(),
            "http://observatory.local:8080/ac/asystemstatus.asp"
        );
    }

    #[test]
    fn test_status_error_mapping() {
        let url = Url::parse("http://obs/ac/aacqform.asp").unwrap();
        assert!(matches!(
            AcpClient::status_error(StatusCode::UNAUTHORIZED, &url),
            AcpError::Unauthorized { .. }
        ));
        assert!(matches!(
            AcpClient::status_error(StatusCode::BAD_GATEWAY, &url),
            AcpError::Server { status: 502, .. }
        ));
        assert!(matches!(
            AcpClient::status_error(StatusCode::NOT_FOUND, &url),
            AcpError::Rejected { status: 404, .. }
        ));
    }
}
