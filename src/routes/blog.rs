use axum::{response::Html, routing::get, Router};

pub fn router() -> Router {
    Router::new().route("/blog", get(blog))
}

async fn blog() -> Html<&'static str> {
    Html(r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Paygate Blog</title>
  <style>
    body { font-family: Arial, sans-serif; margin: 2rem auto; max-width: 42rem; color: #1d1d1f; }
    article { border-bottom: 1px solid #ddd; padding: 1rem 0; }
    .meta { color: #666; font-size: 0.9rem; }
  </style>
</head>
<body>
  <h1>Paygate Blog</h1>
  <p>Free for people. Crawlers pay per request.</p>

  <article>
    <h2>Charging crawlers with HTTP 402</h2>
    <p class="meta">Payments</p>
    <p>Status code 402 sat unused for decades. x402 gives it a body: what to pay, to whom, and on which network.</p>
  </article>

  <article>
    <h2>Stablecoin micropayments on Base</h2>
    <p class="meta">Settlement</p>
    <p>A tenth of a cent per page only works when settlement is cheap and final within seconds.</p>
  </article>

  <article>
    <h2>Telling people and bots apart</h2>
    <p class="meta">Detection</p>
    <p>Well-behaved crawlers announce themselves in their user agent. That is all the gate needs.</p>
  </article>
</body>
</html>"#)
}
