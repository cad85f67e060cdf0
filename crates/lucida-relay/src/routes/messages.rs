use axum::{extract::State, http::StatusCode, Json};

use crate::activity::{Activity, Address};
use crate::error::AppError;
use crate::state::AppState;

/// POST /api/messages: chat platform webhook.
///
/// Message activities are relayed in the background so the platform gets its
/// acknowledgement immediately; the reply goes out through the connector.
/// Other activity types (typing, conversationUpdate, …) are acknowledged and
/// dropped.
pub async fn receive_activity(
    State(app): State<AppState>,
    Json(activity): Json<Activity>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    if !activity.is_message() {
        tracing::debug!(kind = %activity.kind, "ignoring non-message activity");
        return Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ignored" })),
        ));
    }
    if Address::from_activity(&activity).is_none() {
        return Err(AppError::bad_request(
            "activity needs serviceUrl, channelId and conversation.id",
        ));
    }

    tracing::info!(
        channel = activity.channel_id.as_deref().unwrap_or(""),
        id = activity.id.as_deref().unwrap_or(""),
        "relaying message"
    );
    let relay = app.relay.clone();
    tokio::spawn(async move {
        if let Err(e) = relay.handle(&activity).await {
            tracing::error!("relay failed: {e}");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted" })),
    ))
}
