//! Demo buyer
//!
//! `GET /api/bot?job=scrape|math` calls this service's own paid routes the way
//! an automated client would and streams what happened as server-sent events:
//! one `{timestamp, message}` event per log line, then a final
//! `{timestamp, type: "result", result}` or `{timestamp, type: "error", error}`.

use std::convert::Infallible;
use std::sync::LazyLock;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::{self, Stream, StreamExt};
use regex::Regex;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::{AppState, BotQuery};
use crate::types::{AppError, AppResult};

/// User agent sent when the bot announces itself.
pub const BOT_USER_AGENT: &str = "Bot";

static H2_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h2[^>]*>(.*?)</h2>").expect("h2 pattern is valid"));
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"));

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/bot", get(run_bot))
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
enum BotError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("An error occurred: {0}")]
    Status(String),

    #[error("Response was not JSON: {0}")]
    Body(#[from] serde_json::Error),
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Sends events to the SSE stream; the stream ends when this is dropped.
struct BotLog {
    events: mpsc::UnboundedSender<Value>,
}

impl BotLog {
    fn log(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(%message, "bot");
        // The caller may have gone away; the job still runs to completion.
        let _ = self.events.send(json!({ "timestamp": timestamp(), "message": message }));
    }

    fn finish(&self, outcome: Result<Value, BotError>) {
        let event = match outcome {
            Ok(result) => json!({ "timestamp": timestamp(), "type": "result", "result": result }),
            Err(e) => json!({ "timestamp": timestamp(), "type": "error", "error": e.to_string() }),
        };
        let _ = self.events.send(event);
    }
}

fn headers_json(headers: &HeaderMap) -> Value {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                Value::String(value.to_str().unwrap_or("<binary>").to_string()),
            )
        })
        .collect::<serde_json::Map<_, _>>()
        .into()
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Send `request`, logging both sides of the exchange. Returns status and body text.
async fn logged_send(
    client: &Client,
    log: &BotLog,
    request: RequestBuilder,
) -> Result<(reqwest::StatusCode, String), BotError> {
    let request = request.build()?;
    let method = request.method().clone();
    let path = request.url().path().to_string();
    log.log(format!("Request:  {} {}", method, path));
    log.log(format!("Request Headers:  {}", pretty(&headers_json(request.headers()))));

    let response = client.execute(request).await?;
    let status = response.status();
    log.log(format!(
        "Response:  {} {} {} {}",
        method,
        path,
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    ));
    log.log(format!("Response Headers:  {}", pretty(&headers_json(response.headers()))));

    let body = response.text().await?;
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => log.log(format!("Response Body:  {}", pretty(&json))),
        Err(_) => log.log(format!("Response Body:  {}", body)),
    }
    Ok((status, body))
}

fn ensure_success(status: reqwest::StatusCode) -> Result<(), BotError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(BotError::Status(status.canonical_reason().unwrap_or("").to_string()))
    }
}

/// Text of every `<h2>` in `html`, inner markup stripped.
fn blog_titles(html: &str) -> Vec<String> {
    H2_RE
        .captures_iter(html)
        .map(|c| TAG_RE.replace_all(&c[1], "").trim().to_string())
        .collect()
}

async fn scrape_job(
    client: &Client,
    log: &BotLog,
    app_url: &str,
    as_bot: bool,
) -> Result<Value, BotError> {
    let mut request = client.get(format!("{}/blog", app_url));
    if as_bot {
        request = request.header(header::USER_AGENT, BOT_USER_AGENT);
    }

    let (status, body) = logged_send(client, log, request).await?;
    ensure_success(status)?;
    Ok(json!({ "blogTitles": blog_titles(&body) }))
}

async fn math_job(client: &Client, log: &BotLog, app_url: &str) -> Result<Value, BotError> {
    let request = client
        .post(format!("{}/api/add", app_url))
        .json(&json!({ "a": 1, "b": 2 }));

    let (status, body) = logged_send(client, log, request).await?;
    ensure_success(status)?;
    Ok(serde_json::from_str(&body)?)
}

async fn run_bot(
    State(state): State<AppState>,
    Query(query): Query<BotQuery>,
    headers: HeaderMap,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let client = Client::builder()
        .timeout(state.config.payment.validation_timeout())
        .build()
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let caller_is_bot = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ua| ua.contains("bot"));
    let as_bot = caller_is_bot || query.acts_as_scraper();
    let app_url = state.config.server.app_url.clone();
    let job = query.job.clone();
    info!(job = ?job, as_bot, "Bot job requested");

    let (events, mut rx) = mpsc::unbounded_channel();
    let log = BotLog { events };

    tokio::spawn(async move {
        log.log(format!("initiating job {}", job.as_deref().unwrap_or("none")));
        if query.payment_requested() {
            warn!("Bot payment requested but no payment signer is configured");
            log.log("Payment signing is not available, sending requests without payment");
        }

        let outcome = match job.as_deref() {
            Some("scrape") => scrape_job(&client, &log, &app_url, as_bot).await,
            Some("math") => math_job(&client, &log, &app_url).await,
            _ => {
                log.log("Invalid job specified");
                Ok(json!({ "error": "Invalid job" }))
            }
        };
        log.finish(outcome);
    });

    let stream = stream::poll_fn(move |cx| rx.poll_recv(cx))
        .map(|event| Ok::<_, Infallible>(Event::default().data(event.to_string())));

    Ok(Sse::new(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::routes::test_support::state_with;
    use crate::wallet::mock::MockWallet;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use mockito::Matcher;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(app_url: &str) -> Router {
        let mut config = Config::for_tests();
        config.server.app_url = app_url.to_string();
        router(state_with(config, Arc::new(MockWallet::default())))
    }

    async fn events(app: Router, uri: &str, user_agent: Option<&str>) -> Vec<Value> {
        let mut request = Request::builder().uri(uri);
        if let Some(ua) = user_agent {
            request = request.header("user-agent", ua);
        }
        let response = app.oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(body.to_vec())
            .unwrap()
            .split("\n\n")
            .filter_map(|chunk| chunk.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    fn messages(events: &[Value]) -> Vec<&str> {
        events.iter().filter_map(|e| e["message"].as_str()).collect()
    }

    #[test]
    fn test_blog_titles_strip_markup() {
        let html = r#"<h1>Blog</h1><h2>First</h2><H2 class="x">
            Second <em>post</em> </H2><p>body</p>"#;
        assert_eq!(blog_titles(html), vec!["First", "Second post"]);
        assert!(blog_titles("<p>nothing</p>").is_empty());
    }

    #[tokio::test]
    async fn test_scrape_job_announces_bot_and_returns_titles() {
        let mut server = mockito::Server::new_async().await;
        let blog = server
            .mock("GET", "/blog")
            .match_header("user-agent", BOT_USER_AGENT)
            .with_header("content-type", "text/html")
            .with_body("<h2>Charging crawlers with HTTP 402</h2><h2>Second</h2>")
            .create_async()
            .await;

        let events = events(
            app(&server.url()),
            "/api/bot?job=scrape&act-as-scraper=true",
            Some("Mozilla/5.0 Firefox/128.0"),
        )
        .await;

        blog.assert_async().await;
        let last = events.last().unwrap();
        assert_eq!(last["type"], "result");
        assert_eq!(
            last["result"],
            json!({ "blogTitles": ["Charging crawlers with HTTP 402", "Second"] })
        );
        assert!(last["timestamp"].is_string());

        let messages = messages(&events);
        assert_eq!(messages[0], "initiating job scrape");
        assert!(messages.iter().any(|m| *m == "Request:  GET /blog"));
        assert!(messages.iter().any(|m| *m == "Response:  GET /blog 200 OK"));
    }

    #[tokio::test]
    async fn test_scrape_job_reports_payment_required() {
        let mut server = mockito::Server::new_async().await;
        let _blog = server
            .mock("GET", "/blog")
            .match_header("user-agent", BOT_USER_AGENT)
            .with_status(402)
            .with_header("content-type", "application/json")
            .with_body(r#"{"x402Version":1,"error":"X-PAYMENT header is required","accepts":[]}"#)
            .create_async()
            .await;

        let events = events(app(&server.url()), "/api/bot?job=scrape", Some("curl-bot/1.0")).await;

        let last = events.last().unwrap();
        assert_eq!(last["type"], "error");
        assert_eq!(last["error"], "An error occurred: Payment Required");
        assert!(messages(&events)
            .iter()
            .any(|m| m.contains("X-PAYMENT header is required")));
    }

    #[tokio::test]
    async fn test_math_job_posts_operands() {
        let mut server = mockito::Server::new_async().await;
        let add = server
            .mock("POST", "/api/add")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({ "a": 1, "b": 2 })))
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":3}"#)
            .create_async()
            .await;

        let events = events(app(&server.url()), "/api/bot?job=math&enable-payment=true", None).await;

        add.assert_async().await;
        let last = events.last().unwrap();
        assert_eq!(last["type"], "result");
        assert_eq!(last["result"], json!({ "result": 3 }));
        assert!(messages(&events).iter().any(|m| m.contains("sending requests without payment")));
    }

    #[tokio::test]
    async fn test_invalid_job() {
        let events = events(app("http://localhost:9"), "/api/bot?job=dance", None).await;

        assert_eq!(
            messages(&events),
            vec!["initiating job dance", "Invalid job specified"]
        );
        let last = events.last().unwrap();
        assert_eq!(last["type"], "result");
        assert_eq!(last["result"], json!({ "error": "Invalid job" }));
    }
}
