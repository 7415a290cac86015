//! Authenticated JSON-over-HTTP client shared by the REST connectors
//!
//! Each connector builds one [`ApiClient`] at startup with its auth headers
//! baked in. Responses are classified here so that every connector reports
//! HTTP failures the same way.

use crate::error::BackendError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, Url};
use serde_json::Value;
use tracing::debug;

/// Authentication scheme for a backend
#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    /// `Authorization: Bearer <token>`
    Bearer(&'a str),
    /// `Authorization: Token <key>` (Make.com)
    Token(&'a str),
    /// A custom header carrying the key (`xi-api-key` for ElevenLabs)
    Header(&'static str, &'a str),
}

/// HTTP client bound to one backend's base URL and credentials
#[derive(Debug, Clone)]
pub struct ApiClient {
    service: &'static str,
    base_url: Url,
    http: reqwest::Client,
}

impl ApiClient {
    /// Build a client; fails if the base URL or a header value is unusable.
    pub fn new(
        service: &'static str,
        base_url: &str,
        auth: Auth<'_>,
        extra_headers: &[(&'static str, &str)],
    ) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            BackendError::not_configured(format!("{service}: invalid base URL '{base_url}': {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::not_configured(format!(
                "{service}: base URL cannot carry a path"
            )));
        }

        let mut headers = HeaderMap::new();
        let (name, value) = match auth {
            Auth::Bearer(token) => (AUTHORIZATION, format!("Bearer {token}")),
            Auth::Token(key) => (AUTHORIZATION, format!("Token {key}")),
            Auth::Header(name, key) => (HeaderName::from_static(name), key.to_string()),
        };
        let mut value = HeaderValue::from_str(&value).map_err(|_| {
            BackendError::not_configured(format!("{service}: credential is not a valid header value"))
        })?;
        value.set_sensitive(true);
        headers.insert(name, value);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        for (name, value) in extra_headers {
            let value = HeaderValue::from_str(value).map_err(|_| {
                BackendError::not_configured(format!("{service}: invalid value for header {name}"))
            })?;
            headers.insert(HeaderName::from_static(name), value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("sm-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::not_configured(format!("{service}: {e}")))?;

        Ok(Self {
            service,
            base_url,
            http,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Base URL with `segments` appended, each percent-encoded.
    pub fn url<S: AsRef<str>>(&self, segments: &[S]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment.as_ref());
            }
        }
        url
    }

    pub async fn get<S: AsRef<str>>(
        &self,
        segments: &[S],
        query: &[(&str, String)],
    ) -> Result<Value, BackendError> {
        self.send(Method::GET, self.url(segments), query, None).await
    }

    pub async fn post<S: AsRef<str>>(
        &self,
        segments: &[S],
        body: Option<&Value>,
    ) -> Result<Value, BackendError> {
        self.send(Method::POST, self.url(segments), &[], body).await
    }

    pub async fn put<S: AsRef<str>>(&self, segments: &[S], body: &Value) -> Result<Value, BackendError> {
        self.send(Method::PUT, self.url(segments), &[], Some(body)).await
    }

    /// Send a request and decode the JSON reply.
    ///
    /// An empty success body decodes to `null`.
    pub async fn send(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, BackendError> {
        debug!(service = self.service, %method, path = url.path(), "Backend request");

        let mut request = self.http.request(method, url).query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(BackendError::from_status(self.service, status.as_u16(), &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            BackendError::malformed(format!("{}: response is not JSON: {e}", self.service))
        })
    }
}
