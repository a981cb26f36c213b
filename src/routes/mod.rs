//! HTTP routes
//!
//! - `/blog` - paid page (HTML)
//! - `/api/add` - paid API
//! - `/api/bot` - demo buyer streaming its calls as server-sent events
//! - `/api/payment-validate` - x402 validation endpoint the gate delegates to
//! - `/api/wallet/*` - wallet management
//! - `/api/health` - health check

pub mod add;
pub mod blog;
pub mod bot;
pub mod health;
pub mod payment_validate;
pub mod wallet;

use crate::middleware::{cors_layer, payment_gate, PaymentGate};
use crate::models::AppState;
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Create the application router with the payment gate in front of every route.
pub fn create_router(state: AppState, gate: PaymentGate) -> Router {
    info!("Creating application router");

    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        .merge(blog::router())
        .merge(add::router())
        .merge(bot::router(state.clone()))
        .merge(payment_validate::router(state.clone()))
        .merge(wallet::router(state.clone()))
        .merge(health::router(state))
        .layer(middleware::from_fn_with_state(gate, payment_gate))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::Config;
    use crate::models::AppState;
    use crate::payment::{IdentityCache, Paywall};
    use crate::wallet::mock::MockWallet;
    use axum::body::{to_bytes, Body};
    use axum::response::Response;
    use std::sync::Arc;

    pub fn state_with(config: Config, wallet: Arc<MockWallet>) -> AppState {
        let paywall = Paywall::from_config(&config).unwrap();
        let identity = IdentityCache::new(wallet.clone(), &config.payment.seller_account_name);
        AppState { config, wallet, identity, paywall }
    }

    pub fn state(wallet: MockWallet) -> AppState {
        state_with(Config::for_tests(), Arc::new(wallet))
    }

    pub async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::state;
    use super::*;
    use crate::middleware::{BotClassifier, RoutePolicy, ValidationDelegate, ValidationRequest, ValidationResponse, GateError};
    use crate::config::FailMode;
    use crate::wallet::mock::MockWallet;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderMap, Request, StatusCode};
    use bytes::Bytes;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Deny;

    #[async_trait]
    impl ValidationDelegate for Deny {
        async fn validate(&self, _: ValidationRequest) -> Result<ValidationResponse, GateError> {
            Ok(ValidationResponse {
                status: StatusCode::PAYMENT_REQUIRED,
                headers: HeaderMap::new(),
                body: Bytes::from_static(b"{}"),
            })
        }
    }

    fn app() -> Router {
        let state = state(MockWallet::default());
        let gate = PaymentGate::new(
            RoutePolicy::from_config(&state.config.payment),
            BotClassifier::builtin(),
            Arc::new(Deny),
            FailMode::Open,
            state.config.payment.max_forward_body_bytes,
        );
        create_router(state, gate)
    }

    #[tokio::test]
    async fn test_gate_wraps_the_router() {
        let app = app();

        let human = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/blog")
                    .header("user-agent", "Mozilla/5.0 Firefox/128.0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(human.status(), StatusCode::OK);

        let bot = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/blog")
                    .header("user-agent", "GPTBot/1.0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(bot.status(), StatusCode::PAYMENT_REQUIRED);

        let health = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }
}
