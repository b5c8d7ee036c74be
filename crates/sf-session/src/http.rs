//! HTTP client with the authorization interceptor pipeline
//!
//! Outbound, every request carries the currently known access token. Inbound, a
//! 401 on a request that carried a token runs the recovery sequence:
//!
//! ```text
//! Initial --401--> refresh --ok--> Replay --2xx/4xx/5xx--> caller
//!                          \                \--401--> caller (no third send)
//!                           \--fail--> terminate session, SessionExpired
//! ```
//!
//! Refresh exchanges are serialized. A request that waited on another request's
//! exchange reuses its outcome: the rotated token, or the terminated session.

use crate::api::{RefreshResponse, REFRESH_PATH};
use crate::error::{message_from_body, Error, Result};
use crate::session::SessionContext;
use reqwest::{header, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sf_config::ApiConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Correlation header attached to every outbound request
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Per-request extras
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header. `Authorization` is owned by the pipeline and is ignored here.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }
}

/// Successful API response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    /// JSON body; `Null` when the body was empty, a string when it was not JSON
    pub body: Value,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }

    pub fn into_json<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.body)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Initial,
    Replay,
}

impl Attempt {
    fn as_str(&self) -> &'static str {
        match self {
            Attempt::Initial => "initial",
            Attempt::Replay => "replay",
        }
    }
}

/// Bearer-authenticated client for the commerce API
#[derive(Debug)]
pub struct HttpClient {
    base_url: String,
    http: reqwest::Client,
    context: Arc<SessionContext>,
    refresh_lock: Mutex<()>,
}

impl HttpClient {
    pub fn new(config: &ApiConfig, context: Arc<SessionContext>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .build()?;
        Ok(Self::with_client(http, config.base_url.as_str(), context))
    }

    /// Use an existing `reqwest::Client`
    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        context: Arc<SessionContext>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http,
            context,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Send a request through the pipeline.
    ///
    /// Authorization expiry is recovered transparently. When recovery is
    /// impossible the session is terminated and `Error::SessionExpired` returned.
    /// Every other failure status is returned as-is and never retried.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<ApiResponse> {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("api_request", %method, path, request_id = %request_id);
        self.run(&method, path, body, options, &request_id)
            .instrument(span)
            .await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::GET, path, None, &RequestOptions::default())
            .await?
            .into_json()
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, Some(&body), &RequestOptions::default())
            .await?
            .into_json()
    }

    async fn run(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
        options: &RequestOptions,
        request_id: &str,
    ) -> Result<ApiResponse> {
        let mut attempt = Attempt::Initial;

        loop {
            let ticket = self.context.generation();
            let token = self.context.access_token();

            let response = self
                .send(method, path, body, options, token.as_deref(), request_id)
                .await?;
            let status = response.status();
            debug!(attempt = attempt.as_str(), status = status.as_u16(), "Response received");

            if status != StatusCode::UNAUTHORIZED {
                return read_response(response).await;
            }

            // Without a token there is nothing to refresh: the credentials
            // themselves were rejected.
            let Some(rejected) = token else {
                return Err(error_from_response(response).await);
            };

            match attempt {
                Attempt::Replay => {
                    warn!("Request rejected again after refresh");
                    return Err(error_from_response(response).await);
                }
                Attempt::Initial => {
                    drop(response);
                    self.refresh_access_token(ticket, &rejected).await?;
                    attempt = Attempt::Replay;
                }
            }
        }
    }

    async fn send(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
        options: &RequestOptions,
        access_token: Option<&str>,
        request_id: &str,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .http
            .request(method.clone(), &url)
            .header(REQUEST_ID_HEADER, request_id);

        for (name, value) in &options.headers {
            if name.eq_ignore_ascii_case(header::AUTHORIZATION.as_str()) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }

    /// Obtain a replacement for `rejected`, the token that just failed.
    async fn refresh_access_token(&self, ticket: u64, rejected: &str) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;

        // Another request may have settled this while we waited.
        if self.context.generation() != ticket {
            debug!("Session changed while waiting for refresh");
            return Err(Error::SessionExpired);
        }
        if let Some(current) = self.context.access_token() {
            if current != rejected {
                debug!("Access token already refreshed");
                return Ok(current);
            }
        }

        let Some(refresh_token) = self.context.refresh_token() else {
            warn!("Access token rejected and no refresh token available");
            self.context.terminate(ticket);
            return Err(Error::SessionExpired);
        };

        match self.exchange_refresh_token(&refresh_token).await {
            Ok(access_token) => {
                if self
                    .context
                    .rotate_access_token(ticket, rejected, access_token.clone())
                {
                    info!("Access token refreshed");
                    Ok(access_token)
                } else {
                    debug!("Discarding refreshed token for a replaced session");
                    Err(Error::Superseded)
                }
            }
            Err(e) => {
                warn!(error = %e, "Refresh exchange failed");
                self.context.terminate(ticket);
                Err(Error::SessionExpired)
            }
        }
    }

    /// `POST /auth/refresh-token`, authenticated with the refresh token only.
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, REFRESH_PATH);
        let response = self
            .http
            .post(&url)
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string())
            .bearer_auth(refresh_token)
            .send()
            .await?;

        let refreshed: RefreshResponse = read_response(response).await?.into_json()?;
        if refreshed.access_token.is_empty() {
            return Err(Error::Authentication(
                "refresh exchange returned an empty access token".to_string(),
            ));
        }
        Ok(refreshed.access_token)
    }
}

async fn read_response(response: reqwest::Response) -> Result<ApiResponse> {
    let status = response.status();
    if !status.is_success() {
        return Err(error_from_response(response).await);
    }

    let bytes = response.bytes().await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    Ok(ApiResponse { status, body })
}

async fn error_from_response(response: reqwest::Response) -> Error {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| message_from_body(&body))
        .unwrap_or_else(|| text.trim().to_string());

    match Error::from_status(status, message) {
        Error::RateLimited { .. } => Error::RateLimited { retry_after },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RecordingNavigator;
    use crate::storage::CredentialStore;

    fn client(base_url: &str) -> HttpClient {
        let context = Arc::new(SessionContext::new(
            CredentialStore::in_memory(),
            Arc::new(RecordingNavigator::new()),
            "/login",
        ));
        HttpClient::with_client(reqwest::Client::new(), base_url, context)
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(client("http://api.test/api/").base_url(), "http://api.test/api");
    }

    #[test]
    fn test_request_options_builder() {
        let options = RequestOptions::new()
            .with_header("X-Store", "main")
            .with_query("page", "2");
        assert_eq!(options.headers, vec![("X-Store".to_string(), "main".to_string())]);
        assert_eq!(options.query, vec![("page".to_string(), "2".to_string())]);
    }

    #[test]
    fn test_api_response_json() {
        let response = ApiResponse {
            status: StatusCode::OK,
            body: serde_json::json!({"accessToken": "t"}),
        };
        let refreshed: RefreshResponse = response.json().unwrap();
        assert_eq!(refreshed.access_token, "t");
    }
}
