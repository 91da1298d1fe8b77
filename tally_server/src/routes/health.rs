use axum::Json;

#[tracing::instrument(level = "debug")]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
