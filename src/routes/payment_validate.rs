//! Validation endpoint the payment gate delegates to.
//!
//! The gate re-issues the caller's request here with `original_path` appended
//! to the query. A 2xx lets the caller through; any other response is relayed
//! to the caller as-is.

use axum::{
    extract::{RawQuery, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::middleware::delegate::ORIGINAL_PATH_PARAM;
use crate::models::AppState;
use crate::payment::{PaywallOutcome, PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER};
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    let path = state.config.payment.validation_path.clone();
    Router::new()
        .route(&path, get(validate_payment).post(validate_payment))
        .with_state(state)
}

fn original_path(query: Option<&str>) -> Option<String> {
    query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .filter(|(key, _)| key == ORIGINAL_PATH_PARAM)
            .last()
            .map(|(_, value)| value.into_owned())
    })
}

fn validated(path: Option<&str>) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "status": "payment validated", "path": path })),
    )
        .into_response()
}

async fn validate_payment(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> AppResult<Response> {
    let path = original_path(query.as_deref());
    debug!(path = ?path, "Payment validation requested");

    if !state.config.payment.x402_enabled {
        return Ok(validated(path.as_deref()));
    }

    let Some(path) = path else {
        return Err(AppError::InvalidInput(json!([{
            "field": ORIGINAL_PATH_PARAM,
            "message": "original_path query parameter is required",
        }])));
    };

    let Some(price) = state.paywall.price_for(&path) else {
        debug!(%path, "No price configured, nothing to charge");
        return Ok(validated(Some(&path)));
    };

    let seller = state.identity.get().await?;
    let payment = headers.get(PAYMENT_HEADER).and_then(|v| v.to_str().ok());

    match state.paywall.check(price, &path, payment, &seller.address).await? {
        PaywallOutcome::Free => Ok(validated(Some(&path))),
        PaywallOutcome::PaymentRequired(required) => {
            info!(%path, reason = %required.error, "Payment required");
            Ok((StatusCode::PAYMENT_REQUIRED, Json(required)).into_response())
        }
        PaywallOutcome::Paid(settlement) => {
            let mut response = validated(Some(&path));
            match settlement
                .to_base64()
                .ok()
                .and_then(|encoded| HeaderValue::from_str(&encoded).ok())
            {
                Some(value) => {
                    response.headers_mut().insert(PAYMENT_RESPONSE_HEADER, value);
                }
                None => warn!(%path, "Could not encode settlement response header"),
            }
            Ok(response)
        }
    }
}
