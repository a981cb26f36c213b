// CORS layer built from ALLOWED_ORIGINS

use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    // x402 clients need to send X-PAYMENT and read X-PAYMENT-RESPONSE.
    let payment = HeaderName::from_static("x-payment");
    let payment_response = HeaderName::from_static("x-payment-response");

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, payment])
        .expose_headers([payment_response]);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app(origins: &[&str]) -> Router {
        let origins: Vec<String> = origins.iter().map(|o| o.to_string()).collect();
        Router::new()
            .route("/api/health", get(|| async { "ok" }))
            .layer(cors_layer(&origins))
    }

    #[tokio::test]
    async fn test_wildcard_allows_any_origin() {
        let response = app(&["*"])
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header("origin", "https://agent.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("access-control-allow-origin").unwrap(), "*");
    }

    #[tokio::test]
    async fn test_listed_origin_is_echoed_and_others_are_not() {
        let app = app(&["https://shop.example"]);

        let allowed = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header("origin", "https://shop.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            allowed.headers().get("access-control-allow-origin").unwrap(),
            "https://shop.example"
        );

        let other = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header("origin", "https://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(other.headers().get("access-control-allow-origin").is_none());
    }
}
