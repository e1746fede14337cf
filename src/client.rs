use crate::error::RagError;

use reqwest::{header, Client, Method, StatusCode};
use serde_json::Value as JsonValue;

/// A successful HTTP exchange: status plus the raw body.
#[derive(Debug, Clone)]
pub struct ApiReply {
    pub status: StatusCode,
    pub body: String,
}

/// Builds the HTTP client shared by every call of a session.
///
/// No client-side timeout is configured; long completions are bounded by
/// the backend's own limits.
pub fn build_http_client() -> Result<Client, RagError> {
    Client::builder()
        .user_agent(concat!("audit-rag/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(Into::into)
}

/// Executes a single API call. Failures are returned as-is, never retried.
pub async fn execute_single_call(
        client: &Client,
        method: Method,
        url: &str,
        headers: header::HeaderMap,
        body: Option<&JsonValue>,
    ) -> Result<ApiReply, RagError> {
    let mut request = client.request(method.clone(), url).headers(headers);
    if let Some(body) = body {
        request = request.json(body);
    }

    log::debug!("[CLIENT] {} {}", method, url);
    let response = request.send().await?;
    let status = response.status();
    let response_text = response.text().await?;
    log::debug!("[CLIENT] {} answered {}: {}", url, status, response_text);

    if status.is_success() {
        return Ok(ApiReply { status, body: response_text });
    }

    Err(RagError::ApiError {
        status: status.as_u16(),
        body: response_text,
    })
}
