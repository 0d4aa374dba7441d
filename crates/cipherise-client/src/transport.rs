//! HTTP transport for the driver.
//!
//! The [`Transport`] trait is the only network seam: flows produce
//! [`HttpRequest`]s and the driver hands them to a transport. Status codes and
//! bodies are returned untouched; interpreting them is the core's job.

use std::{future::Future, time::Duration};

use cipherise_core::{HttpRequest, HttpResponse};

use crate::error::TransportError;

/// Default per-request timeout. Long-poll requests use the same budget.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Executes HTTP requests.
///
/// # Implementations
///
/// - [`HttpTransport`]: reqwest over rustls (`transport` feature)
/// - Tests: scripted in-memory replies
pub trait Transport: Send + Sync {
    /// Perform one request.
    ///
    /// # Errors
    ///
    /// Only when no response was received. Non-2xx statuses are responses.
    fn request(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

#[cfg(feature = "transport")]
pub use http::HttpTransport;

#[cfg(feature = "transport")]
mod http {
    use std::time::Duration;

    use cipherise_core::{HttpRequest, HttpResponse, Method};
    use cipherise_proto::paths::SESSION_HEADER;
    use tracing::debug;

    use super::{DEFAULT_REQUEST_TIMEOUT, Transport};
    use crate::error::TransportError;

    /// reqwest-backed transport.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: reqwest::Client,
        timeout: Duration,
    }

    impl HttpTransport {
        /// Transport with [`DEFAULT_REQUEST_TIMEOUT`].
        pub fn new() -> Result<Self, TransportError> {
            Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
        }

        /// Transport with a custom per-request timeout.
        pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| TransportError::Connection(e.to_string()))?;
            Ok(Self { client, timeout })
        }

        fn classify(&self, err: &reqwest::Error) -> TransportError {
            if err.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else if err.is_body() || err.is_decode() {
                TransportError::Body(err.to_string())
            } else {
                TransportError::Connection(err.to_string())
            }
        }
    }

    impl Transport for HttpTransport {
        async fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            debug!(method = ?request.method, url = %request.url, "http request");

            let mut builder = match request.method {
                Method::Get => self.client.get(&request.url),
                Method::Post => self.client.post(&request.url),
            };
            if let Some(session) = &request.session_id {
                builder = builder.header(SESSION_HEADER, session);
            }
            if let Some(body) = request.body {
                builder = builder.header("Content-Type", "application/json").body(body);
            }

            let response = builder.send().await.map_err(|e| self.classify(&e))?;
            let status = response.status().as_u16();
            let body = response.bytes().await.map_err(|e| self.classify(&e))?;

            debug!(status, bytes = body.len(), "http response");
            Ok(HttpResponse::new(status, body.to_vec()))
        }
    }
}
