use axum::{extract::State, Json};

use crate::state::AppState;

/// GET /api/health
pub async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "addresses": app.relay.addresses().len(),
        "pending": app.pending.len(),
    }))
}
