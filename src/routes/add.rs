use axum::{routing::post, Json, Router};
use crate::models::{AddRequest, AddResponse};
use tracing::debug;

pub fn router() -> Router {
    Router::new().route("/api/add", post(add))
}

async fn add(Json(request): Json<AddRequest>) -> Json<AddResponse> {
    debug!(a = request.a, b = request.b, "Adding");
    Json(AddResponse { result: request.a + request.b })
}
