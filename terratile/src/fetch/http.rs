//! HTTP client abstraction for testability.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Transient retrieval failures.
///
/// None of these mark a tile absent: a later cache miss may enqueue the
/// same tile again.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Could not establish a connection.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Connect or read deadline exceeded.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Any other transport failure.
    #[error("transfer failed: {0}")]
    Io(String),

    /// The HTTP client itself could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    ClientBuild(String),
}

/// A completed HTTP exchange, successful or not at the protocol level.
///
/// Status handling is the post-processor's job; the client only reports
/// what the server said.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Lowercased `Content-Type` header value, if present.
    pub content_type: Option<String>,
    /// Response body.
    pub body: Bytes,
}

impl FetchResponse {
    /// True for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True for 204 No Content.
    pub fn is_no_content(&self) -> bool {
        self.status == 204
    }

    /// True if the content type contains the given token.
    pub fn content_type_contains(&self, token: &str) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.contains(token))
            .unwrap_or(false)
    }
}

/// Trait for HTTP GET operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request and reads the full response body.
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<FetchResponse, FetchError>>;
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with the given timeouts.
    ///
    /// # Arguments
    ///
    /// * `connect_timeout` - Deadline for establishing the connection
    /// * `read_timeout` - Deadline for the whole request/response exchange
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<FetchResponse, FetchError>> {
        Box::pin(async move {
            let response = self.client.get(url).send().await.map_err(classify)?;

            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.to_ascii_lowercase());

            let body = response.bytes().await.map_err(classify)?;

            Ok(FetchResponse {
                status,
                content_type,
                body,
            })
        })
    }
}

fn classify(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(error.to_string())
    } else if error.is_connect() {
        FetchError::Connect(error.to_string())
    } else {
        FetchError::Io(error.to_string())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Mock HTTP client for testing.
    pub struct MockHttpClient {
        pub response: Result<FetchResponse, FetchError>,
    }

    impl HttpClient for MockHttpClient {
        fn get<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<FetchResponse, FetchError>> {
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    #[tokio::test]
    async fn test_mock_client_success() {
        let mock = MockHttpClient {
            response: Ok(FetchResponse {
                status: 200,
                content_type: Some("image/png".into()),
                body: Bytes::from_static(&[1, 2, 3, 4]),
            }),
        };

        let response = mock.get("http://example.com").await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_ref(), &[1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_mock_client_error() {
        let mock = MockHttpClient {
            response: Err(FetchError::Timeout("deadline elapsed".into())),
        };

        assert!(mock.get("http://example.com").await.is_err());
    }

    #[test]
    fn test_response_predicates() {
        let response = FetchResponse {
            status: 204,
            content_type: Some("text/html; charset=utf-8".into()),
            body: Bytes::new(),
        };
        assert!(response.is_success());
        assert!(response.is_no_content());
        assert!(response.content_type_contains("html"));
        assert!(!response.content_type_contains("image"));
    }

    #[test]
    fn test_response_without_content_type() {
        let response = FetchResponse {
            status: 404,
            content_type: None,
            body: Bytes::new(),
        };
        assert!(!response.is_success());
        assert!(!response.content_type_contains("image"));
    }
}
