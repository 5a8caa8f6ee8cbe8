//! HTTP client for the Bybit v5 API.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ExchangeConfig;

/// Production Bybit HTTP API endpoint.
pub const MAINNET_API_URL: &str = "https://api.bybit.com";

/// Testnet Bybit HTTP API endpoint.
pub const TESTNET_API_URL: &str = "https://api-testnet.bybit.com";

/// Default rate limit (requests per minute).
const DEFAULT_RATE_LIMIT: i64 = 600;

/// Length of the client-side rate limit window.
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

const DEFAULT_RECEIVE_WINDOW: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Bybit API error (non-zero `retCode`).
#[derive(Debug, Error)]
#[error("bybit api error {code}: {message}")]
pub struct ApiError {
    pub code: i64,
    pub message: String,
}

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("rate limit exceeded: {current}/{limit} per minute")]
    RateLimitExceeded { current: i64, limit: i64 },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("response has no result")]
    MissingResult,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Configuration for creating a new Client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub rate_limit: i64,
    pub receive_window: Duration,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: String, api_secret: String) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            api_secret,
            rate_limit: DEFAULT_RATE_LIMIT,
            receive_window: DEFAULT_RECEIVE_WINDOW,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Unauthenticated client for public endpoints.
    pub fn public(base_url: impl Into<String>) -> Self {
        Self::new(base_url, String::new(), String::new())
    }

    pub fn with_rate_limit(mut self, rate_limit: i64) -> Self {
        if rate_limit > 0 {
            self.rate_limit = rate_limit;
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_receive_window(mut self, receive_window: Duration) -> Self {
        self.receive_window = receive_window;
        self
    }
}

/// Standard v5 response envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    result: Option<T>,
}

struct RateLimitState {
    window_start: Instant,
}

/// HTTP client for the Bybit v5 API.
/// Handles request signing, rate limiting, and the response envelope.
pub struct Client {
    config: ClientConfig,
    http_client: HttpClient,
    request_count: AtomicI64,
    rate_limit_state: Mutex<RateLimitState>,
}

impl Client {
    /// Creates a new Bybit API client.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http_client = HttpClient::builder().timeout(config.timeout).build()?;

        Ok(Self {
            config,
            http_client,
            request_count: AtomicI64::new(0),
            rate_limit_state: Mutex::new(RateLimitState {
                window_start: Instant::now(),
            }),
        })
    }

    /// Creates a signed client from exchange config.
    pub fn from_config(exchange_config: &ExchangeConfig) -> Result<Self> {
        let base_url = if exchange_config.testnet {
            TESTNET_API_URL
        } else {
            MAINNET_API_URL
        };

        let config = ClientConfig::new(
            base_url,
            exchange_config.api_key.clone(),
            exchange_config.api_secret.clone(),
        )
        .with_rate_limit(exchange_config.rate_limit.map(i64::from).unwrap_or(DEFAULT_RATE_LIMIT))
        .with_timeout(exchange_config.request_timeout())
        .with_receive_window(exchange_config.recv_window());

        Self::new(config)
    }

    /// Creates an HMAC-SHA256 signature for the Bybit v5 API.
    ///
    /// Signed string: timestamp + api_key + recv_window + payload, where the
    /// payload is the query string for GET and the JSON body for POST.
    fn sign(&self, timestamp: i64, payload: &str) -> Result<String> {
        let sign_payload = format!(
            "{}{}{}{}",
            timestamp,
            self.config.api_key,
            self.config.receive_window.as_millis(),
            payload
        );

        let mut mac = Hmac::<Sha256>::new_from_slice(self.config.api_secret.as_bytes())
            .map_err(|e| ClientError::Signing(e.to_string()))?;
        mac.update(sign_payload.as_bytes());

        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Sends a GET request; `params` are encoded in the given order.
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<T> {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let url = if query.is_empty() {
            format!("{}{}", self.config.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.config.base_url, endpoint, query)
        };

        let request = self.http_client.get(&url);
        self.send("GET", endpoint, request, &query, signed).await
    }

    /// Sends a signed POST request with a JSON body.
    pub async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let json_body = serde_json::to_string(body)?;
        let url = format!("{}{}", self.config.base_url, endpoint);

        let request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(json_body.clone());

        self.send("POST", endpoint, request, &json_body, true).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        endpoint: &str,
        mut request: RequestBuilder,
        payload: &str,
        signed: bool,
    ) -> Result<T> {
        self.check_rate_limit()?;

        if signed {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let signature = self.sign(timestamp, payload)?;

            let mut headers = HeaderMap::new();
            headers.insert("X-BAPI-API-KEY", HeaderValue::from_str(&self.config.api_key)?);
            headers.insert("X-BAPI-TIMESTAMP", HeaderValue::from_str(&timestamp.to_string())?);
            headers.insert("X-BAPI-SIGN", HeaderValue::from_str(&signature)?);
            headers.insert(
                "X-BAPI-RECV-WINDOW",
                HeaderValue::from_str(&self.config.receive_window.as_millis().to_string())?,
            );
            request = request.headers(headers);
        }

        debug!(method = %method, endpoint = %endpoint, signed = signed, "sending request");

        let response = request.send().await?;
        self.increment_request_count();

        let status = response.status();
        let body = response.bytes().await?;

        if status.is_client_error() || status.is_server_error() {
            return Err(self.parse_error_response(status, &body));
        }

        let envelope: Envelope<T> = serde_json::from_slice(&body)?;
        if envelope.ret_code != 0 {
            warn!(
                endpoint = %endpoint,
                code = envelope.ret_code,
                message = %envelope.ret_msg,
                "api error"
            );
            return Err(ClientError::Api(ApiError {
                code: envelope.ret_code,
                message: envelope.ret_msg,
            }));
        }

        envelope.result.ok_or(ClientError::MissingResult)
    }

    /// Verifies we haven't exceeded the rate limit.
    fn check_rate_limit(&self) -> Result<()> {
        let mut state = self
            .rate_limit_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if state.window_start.elapsed() > RATE_LIMIT_WINDOW {
            self.request_count.store(0, Ordering::SeqCst);
            state.window_start = Instant::now();
        }

        let current = self.request_count.load(Ordering::SeqCst);
        if current >= self.config.rate_limit {
            return Err(ClientError::RateLimitExceeded {
                current,
                limit: self.config.rate_limit,
            });
        }

        Ok(())
    }

    /// Increments the request counter.
    fn increment_request_count(&self) {
        self.request_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Creates a ClientError from an HTTP error response.
    fn parse_error_response(&self, status: StatusCode, body: &[u8]) -> ClientError {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ErrorResponse {
            ret_code: Option<i64>,
            ret_msg: Option<String>,
        }

        let api_err = match serde_json::from_slice::<ErrorResponse>(body) {
            Ok(resp) => ApiError {
                code: resp.ret_code.unwrap_or(i64::from(status.as_u16())),
                message: resp
                    .ret_msg
                    .unwrap_or_else(|| String::from_utf8_lossy(body).to_string()),
            },
            Err(_) => ApiError {
                code: i64::from(status.as_u16()),
                message: String::from_utf8_lossy(body).to_string(),
            },
        };

        warn!(code = api_err.code, message = %api_err.message, "http error");

        ClientError::Api(api_err)
    }

    /// Fetches the current server time from Bybit.
    pub async fn get_server_time(&self) -> Result<chrono::DateTime<chrono::Utc>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ServerTime {
            time_second: String,
        }

        let resp: ServerTime = self.get("/v5/market/time", &[], false).await?;
        let seconds: i64 = resp.time_second.parse().map_err(|_| ClientError::MissingResult)?;

        Ok(chrono::DateTime::from_timestamp(seconds, 0).unwrap_or_default())
    }

    /// True when requests go to the testnet.
    pub fn is_testnet(&self) -> bool {
        self.config.base_url == TESTNET_API_URL
    }
}
