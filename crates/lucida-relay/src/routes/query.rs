use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::error::AppError;
use crate::state::{AppState, PendingReply};

const DEFAULT_INTERFACE: &str = "web";

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

#[derive(serde::Deserialize)]
pub struct QueryBody {
    /// Client-generated token used to poll for the reply. Generated when absent.
    #[serde(default)]
    pub request_id: Option<String>,
    pub user: String,
    pub text: String,
    #[serde(default)]
    pub interface: Option<String>,
}

/// POST /api/query: relay a question; the reply is parked in the pending
/// table under `request_id` until polled.
pub async fn submit_query(
    State(app): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    if body.text.trim().is_empty() {
        return Err(AppError::bad_request("text must not be empty"));
    }
    let request_id = body
        .request_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let interface = body
        .interface
        .unwrap_or_else(|| DEFAULT_INTERFACE.to_string());

    let relay = app.relay.clone();
    let pending = app.pending.clone();
    let id = request_id.clone();
    tokio::spawn(async move {
        let reply = relay.respond(&interface, &body.user, &body.text).await;
        let replaced = pending.put(
            &id,
            PendingReply {
                reply,
                created_at: Utc::now(),
            },
        );
        if replaced.is_some() {
            tracing::debug!(request_id = %id, "overwrote unread pending reply");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "request_id": request_id })),
    ))
}

// ---------------------------------------------------------------------------
// Poll
// ---------------------------------------------------------------------------

/// GET /api/query/{request_id}: collect and clear a pending reply.
pub async fn poll_query(
    State(app): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let pending = app
        .pending
        .take(&request_id)
        .ok_or_else(|| AppError::not_found(format!("no pending reply for '{request_id}'")))?;
    Ok(Json(serde_json::json!({
        "request_id": request_id,
        "reply": pending.reply,
        "created_at": pending.created_at,
    })))
}
