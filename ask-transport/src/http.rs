use crate::error::{Result, TransportError};
use crate::policy::RetryPolicy;
use crate::retry::RetryTransport;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest silence tolerated between body reads, so streamed bodies may run indefinitely.
const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// A `reqwest` client whose every request goes through [`RetryTransport`].
///
/// Request construction is passed as a closure so that each attempt sends a
/// freshly built request.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    retry: RetryTransport,
}

impl HttpTransport {
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        // Per-attempt timeouts come from `RetryTransport`. No total request
        // timeout is set here, so a long agent stream is never cut off.
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_IDLE_TIMEOUT)
            .build()?;
        Ok(Self::with_client(http, policy))
    }

    pub fn with_client(http: reqwest::Client, policy: RetryPolicy) -> Self {
        Self {
            http,
            retry: RetryTransport::new(policy),
        }
    }

    /// Sends and decodes a JSON response body.
    pub async fn send_json<T, B>(&self, operation: &str, build: B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let http = &self.http;
        let build = &build;
        self.retry
            .execute(operation, || async move {
                let response = send_checked(build(http)).await?;
                let body = response.text().await?;
                serde_json::from_str(&body).map_err(|e| {
                    TransportError::ResponseFormat(format!("{operation}: {e} body={body}"))
                })
            })
            .await
    }

    /// Sends a request whose response body is irrelevant (e.g. `204 No Content`).
    pub async fn send_empty<B>(&self, operation: &str, build: B) -> Result<()>
    where
        B: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let http = &self.http;
        let build = &build;
        self.retry
            .execute(operation, || async move {
                send_checked(build(http)).await?;
                Ok(())
            })
            .await
    }

    /// Returns the response once headers arrive with a success status.
    ///
    /// Only establishing the response is bounded by the retry policy; the
    /// caller owns reading the body. A client from [`HttpTransport::new`] has
    /// no total timeout, only a per-read idle timeout, so the body may stream
    /// for as long as the server keeps sending.
    pub async fn send_streaming<B>(&self, operation: &str, build: B) -> Result<Response>
    where
        B: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let http = &self.http;
        let build = &build;
        self.retry
            .execute(operation, || async move { send_checked(build(http)).await })
            .await
    }
}

async fn send_checked(request: RequestBuilder) -> Result<Response> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|error| format!("<failed to read error body: {error}>"));
    Err(TransportError::Status {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        body,
    })
}
