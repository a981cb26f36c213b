//! Payment validation delegate
//!
//! The gate does not run the payment protocol itself. It re-issues the request
//! against the validation endpoint over HTTP:
//!
//! ```text
//!   POST /api/add?x=1            ──▶  POST {APP_URL}/api/payment-validate?x=1&original_path=/api/add
//!   (method, headers, body)            (same method, same headers, same body; GET sends no body)
//! ```
//!
//! Whatever the endpoint answers comes back untouched. A 2xx means the caller
//! may proceed; anything else is the response the caller must receive instead.
//! Transport failures and timeouts are errors, never a denial.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use reqwest::{redirect, Client};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::payment::PAYMENT_RESPONSE_HEADER;

/// Query parameter carrying the path the caller originally asked for.
pub const ORIGINAL_PATH_PARAM: &str = "original_path";

#[derive(Debug, Error)]
pub enum GateError {
    #[error("validation endpoint timed out after {0:?}")]
    Timeout(Duration),

    #[error("validation endpoint unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("invalid validation endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("could not build validation client: {0}")]
    Client(#[source] reqwest::Error),
}

/// What gets forwarded to the validation endpoint.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    /// `None` for GET, which never forwards a body.
    pub body: Option<Bytes>,
}

/// The validation endpoint's answer, captured in full.
#[derive(Debug, Clone)]
pub struct ValidationResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub enum PaymentDecision {
    /// Proceed; these headers (the x402 settlement receipt) go onto the
    /// handler's response.
    Allow(HeaderMap),
    /// Replace the caller's response with this one.
    Deny(Response),
}

impl ValidationResponse {
    pub fn decision(self) -> PaymentDecision {
        if self.status.is_success() {
            PaymentDecision::Allow(receipt_headers(&self.headers))
        } else {
            PaymentDecision::Deny(self.into_response())
        }
    }
}

impl IntoResponse for ValidationResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        let mut headers = self.headers;
        headers.remove(header::TRANSFER_ENCODING);
        headers.remove(header::CONNECTION);
        *response.headers_mut() = headers;
        response
    }
}

/// x402 headers from an allowing validation response that the caller must see.
fn receipt_headers(headers: &HeaderMap) -> HeaderMap {
    let mut receipt = HeaderMap::new();
    for (name, value) in headers {
        if name.as_str() == PAYMENT_RESPONSE_HEADER {
            receipt.append(name.clone(), value.clone());
        }
    }
    receipt
}

#[async_trait]
pub trait ValidationDelegate: Send + Sync {
    async fn validate(&self, request: ValidationRequest) -> Result<ValidationResponse, GateError>;
}

/// Copy every original query pair onto `endpoint`, then set `original_path`.
pub fn build_validation_url(endpoint: &Url, path: &str, query: Option<&str>) -> Url {
    let mut url = endpoint.clone();
    url.set_query(None);
    {
        let mut pairs = url.query_pairs_mut();
        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                if key != ORIGINAL_PATH_PARAM {
                    pairs.append_pair(&key, &value);
                }
            }
        }
        pairs.append_pair(ORIGINAL_PATH_PARAM, path);
    }
    url
}

/// Headers that must not be copied verbatim onto the forwarded request.
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    forwarded.remove(header::HOST);
    forwarded.remove(header::CONTENT_LENGTH);
    forwarded.remove(header::TRANSFER_ENCODING);
    forwarded.remove(header::CONNECTION);
    forwarded
}

pub struct HttpValidationDelegate {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpValidationDelegate {
    /// `app_url` is the origin of this service, `validation_path` the endpoint on it.
    pub fn new(app_url: &str, validation_path: &str, timeout: Duration) -> Result<Self, GateError> {
        let endpoint = Url::parse(app_url)
            .and_then(|base| base.join(validation_path))
            .map_err(|e| GateError::InvalidUrl(format!("{}{}: {}", app_url, validation_path, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(GateError::Client)?;

        Ok(Self { client, endpoint, timeout })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ValidationDelegate for HttpValidationDelegate {
    async fn validate(&self, request: ValidationRequest) -> Result<ValidationResponse, GateError> {
        let url = build_validation_url(&self.endpoint, &request.path, request.query.as_deref());
        debug!(method = %request.method, %url, "Delegating payment validation");

        let mut outgoing = self
            .client
            .request(request.method.clone(), url)
            .headers(forwardable_headers(&request.headers));
        if request.method != Method::GET {
            if let Some(body) = request.body {
                outgoing = outgoing.body(body);
            }
        }

        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                GateError::Timeout(self.timeout)
            } else {
                GateError::Transport(e)
            }
        };

        let response = outgoing.send().await.map_err(map_err)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_err)?;

        debug!(%status, bytes = body.len(), "Validation endpoint answered");
        Ok(ValidationResponse { status, headers, body })
    }
}

#[cfg(test)]
pub(crate) fn header_map<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            header::HeaderName::from_bytes(name.as_bytes()),
            axum::http::HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    headers
}
