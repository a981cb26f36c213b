//! Payment gate middleware
//!
//! ```text
//!  request ─▶ classify ──(unprotected / validation endpoint)──────────────▶ next
//!               │
//!               ▼ protected
//!           needs validation? ──(no: human on a page)─────────────────────▶ next
//!               │ yes
//!               ▼
//!           delegate ──(2xx)──────────────────────────────────────────────▶ next
//!               │  ├──(non-2xx)──▶ relay validation response verbatim
//!               │  └──(error)────▶ fail open (or 503 on API routes in closed-api)
//! ```
//!
//! Installed with `axum::middleware::from_fn_with_state`.

use super::delegate::{PaymentDecision, ValidationDelegate, ValidationRequest};
use super::policy::{RouteClassification, RoutePolicy};
use super::scraper::BotClassifier;
use crate::config::FailMode;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct PaymentGate {
    policy: Arc<RoutePolicy>,
    classifier: BotClassifier,
    delegate: Arc<dyn ValidationDelegate>,
    fail_mode: FailMode,
    max_body_bytes: usize,
}

impl PaymentGate {
    pub fn new(
        policy: RoutePolicy,
        classifier: BotClassifier,
        delegate: Arc<dyn ValidationDelegate>,
        fail_mode: FailMode,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            policy: Arc::new(policy),
            classifier,
            delegate,
            fail_mode,
            max_body_bytes,
        }
    }

    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    /// Response to send instead of passing through when validation broke.
    fn failure_response(&self, path: &str) -> Option<Response> {
        if self.fail_mode == FailMode::ClosedApi && self.policy.is_api_path(path) {
            return Some(
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "Payment validation unavailable" })),
                )
                    .into_response(),
            );
        }
        None
    }
}

pub async fn payment_gate(State(gate): State<PaymentGate>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();

    if gate.policy.classify(&path) != RouteClassification::Protected {
        return next.run(request).await;
    }

    let query = request.uri().query().map(str::to_string);
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if !gate.policy.needs_payment_validation(
        &path,
        user_agent.as_deref(),
        query.as_deref(),
        &gate.classifier,
    ) {
        debug!(%path, "Human caller on protected page, passing through");
        return next.run(request).await;
    }

    let mut validation = ValidationRequest {
        method: request.method().clone(),
        path: path.clone(),
        query,
        headers: request.headers().clone(),
        body: None,
    };

    // GET bodies are neither buffered nor forwarded.
    let request = if request.method() == Method::GET {
        request
    } else {
        let (parts, body) = request.into_parts();
        match to_bytes(body, gate.max_body_bytes).await {
            Ok(bytes) => {
                validation.body = Some(bytes.clone());
                Request::from_parts(parts, Body::from(bytes))
            }
            Err(e) => {
                info!(%path, limit = gate.max_body_bytes, error = %e, "Request body over forward limit");
                return (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    Json(json!({ "error": "Request body too large" })),
                )
                    .into_response();
            }
        }
    };

    match gate.delegate.validate(validation).await {
        Ok(response) => match response.decision() {
            PaymentDecision::Allow(receipt) => {
                debug!(%path, "Payment validated");
                let mut response = next.run(request).await;
                response.headers_mut().extend(receipt);
                response
            }
            PaymentDecision::Deny(response) => {
                info!(%path, status = %response.status(), "Payment validation denied request");
                response
            }
        },
        Err(e) => {
            error!(%path, error = %e, "Payment validation failed");
            match gate.failure_response(&path) {
                Some(response) => response,
                None => next.run(request).await,
            }
        }
    }
}
