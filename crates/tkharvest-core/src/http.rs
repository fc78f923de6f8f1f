//! Bounded HTTP GET with a synchronous interface.
//!
//! Uses async reqwest on a shared tokio runtime, wrapped in an overall
//! deadline, but presents a blocking [`Transport`] so the harvest loop and
//! rayon workers stay plain functions.

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;

/// Timeouts and body cap applied to every request
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Whole-request bound: connect, headers and body
    pub request_timeout: Duration,
    /// Responses larger than this are rejected
    pub max_body_bytes: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Error types for fetch operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// No complete response within the configured deadline
    Timeout(String),
    /// Body exceeded `max_body_bytes`
    TooLarge { limit: u64 },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Timeout(message) => write!(f, "timeout: {message}"),
            Self::TooLarge { limit } => write!(f, "response body exceeds {limit} bytes"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Create fetch error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout(e.to_string());
        }
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// A successful (2xx) response, fully buffered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Final URL after redirects
    pub url: String,
    /// Raw `Content-Type` header, parameters included
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Blocking GET capability.
///
/// Implementations must return `Err` for non-2xx statuses and must bound
/// every call in time.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

/// Shared tokio runtime for HTTP operations.
static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// reqwest-backed [`Transport`]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    config: HttpConfig,
}

impl ReqwestTransport {
    pub fn new(config: HttpConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(concat!("tkharvest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::from_reqwest(&e))?;
        Ok(Self { client, config })
    }

    async fn get_async(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let limit = self.config.max_body_bytes;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(FetchError::TooLarge { limit });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?
        {
            if body.len() as u64 + chunk.len() as u64 > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(HttpResponse {
            url: final_url,
            content_type,
            body,
        })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        // reqwest's own timeout covers the request; this also bounds a stalled connect
        let deadline = self.config.connect_timeout + self.config.request_timeout;
        SHARED_RUNTIME.handle().block_on(async {
            match tokio::time::timeout(deadline, self.get_async(url)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(format!(
                    "{url}: no response within {}s",
                    deadline.as_secs()
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_err(status: u16) -> FetchError {
        FetchError::Http {
            status: Some(status),
            message: "test".to_string(),
        }
    }

    #[test]
    fn display_http_with_status() {
        assert_eq!(format!("{}", http_err(404)), "HTTP 404: test");
    }

    #[test]
    fn display_http_without_status() {
        let err = FetchError::Http {
            status: None,
            message: "connection refused".to_string(),
        };
        assert_eq!(format!("{err}"), "HTTP error: connection refused");
    }

    #[test]
    fn display_too_large() {
        let err = FetchError::TooLarge { limit: 10 };
        assert_eq!(format!("{err}"), "response body exceeds 10 bytes");
    }

    #[test]
    fn status_only_for_http_variant() {
        assert_eq!(http_err(500).status(), Some(500));
        assert_eq!(FetchError::Timeout("slow".into()).status(), None);
    }

    #[test]
    fn timeout_detection() {
        assert!(FetchError::Timeout("slow".into()).is_timeout());
        assert!(!http_err(504).is_timeout());
    }

    #[test]
    fn default_config_bounds() {
        let config = HttpConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.connect_timeout < config.request_timeout);
        assert!(config.max_body_bytes > 0);
    }
}
