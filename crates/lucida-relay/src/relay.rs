//! Forwarding of chat messages to the command center and translation of its
//! HTTP status into the reply text.
//!
//! Status mapping for `/infer`:
//!
//! | status | reply |
//! |--------|-------|
//! | 200    | `result` field of the JSON body |
//! | 403    | `Verify <token>` → `/add_interface` sub-flow, otherwise [`UNAUTHORIZED`] |
//! | 500    | [`INTERNAL_ERROR`] |
//! | other  | status code and reason phrase |
//!
//! Status mapping for `/add_interface`: 200 → raw body, 401 →
//! [`TOKEN_EXPIRED`], 403 → [`TOKEN_REJECTED`], other → unexpected status.

use std::sync::{Arc, OnceLock};

use lucida_core::SessionStore;
use regex::Regex;

use crate::activity::{Activity, Address};
use crate::backend::{Backend, BackendError, BackendResponse, InferRequest, VerifyRequest};
use crate::connector::{ConnectorError, ReplySender};

pub const UNAUTHORIZED: &str =
    "You are not authorized to use this service. Please contact the administrator.";
pub const TOKEN_EXPIRED: &str = "Your verification token has expired. Please request a new one.";
pub const TOKEN_REJECTED: &str = "That verification token was rejected.";
pub const INTERNAL_ERROR: &str =
    "The command center ran into an internal error. Please try again later.";

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("activity has no deliverable address (serviceUrl, channelId and conversation are required)")]
    MissingAddress,

    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

// ---------------------------------------------------------------------------
// Pure mapping
// ---------------------------------------------------------------------------

static VERIFY_RE: OnceLock<Regex> = OnceLock::new();

/// Extract the token from a `Verify <token>` message.
pub fn parse_verify_command(text: &str) -> Option<&str> {
    let re = VERIFY_RE.get_or_init(|| Regex::new(r"^\s*Verify\s+(\S+)\s*$").unwrap());
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// How an `/infer` response should be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferReply {
    Text(String),
    /// 403: the user is not linked yet; try the verify sub-flow.
    NeedsVerification,
}

pub fn infer_reply(resp: &BackendResponse) -> InferReply {
    match resp.status {
        200 => InferReply::Text(result_text(&resp.body)),
        403 => InferReply::NeedsVerification,
        500 => InferReply::Text(INTERNAL_ERROR.to_string()),
        status => InferReply::Text(format!(
            "The command center answered with {status} {}.",
            resp.reason
        )),
    }
}

pub fn verify_reply(resp: &BackendResponse) -> String {
    match resp.status {
        200 => resp.body.clone(),
        401 => TOKEN_EXPIRED.to_string(),
        403 => TOKEN_REJECTED.to_string(),
        status => format!("Unexpected status code {status} while verifying your token."),
    }
}

pub fn network_error_reply(err: &BackendError) -> String {
    format!(
        "Could not reach the command center (error code {}).",
        err.code
    )
}

fn result_text(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    match parsed.as_ref().and_then(|v| v.get("result")) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => {
            tracing::warn!("command center returned 200 without a result field");
            INTERNAL_ERROR.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

pub struct Relay {
    backend: Arc<dyn Backend>,
    sender: Arc<dyn ReplySender>,
    addresses: Arc<dyn SessionStore<Address>>,
}

impl Relay {
    pub fn new(
        backend: Arc<dyn Backend>,
        sender: Arc<dyn ReplySender>,
        addresses: Arc<dyn SessionStore<Address>>,
    ) -> Self {
        Self {
            backend,
            sender,
            addresses,
        }
    }

    pub fn addresses(&self) -> &Arc<dyn SessionStore<Address>> {
        &self.addresses
    }

    /// Ask the command center about `text` and produce the reply text.
    /// Never fails: every backend outcome maps to a user-facing message.
    pub async fn respond(&self, interface: &str, username: &str, text: &str) -> String {
        let req = InferRequest {
            interface: interface.to_string(),
            username: username.to_string(),
            speech_input: text.to_string(),
        };
        let resp = match self.backend.infer(&req).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(interface, code = %e.code, "infer request failed: {}", e.message);
                return network_error_reply(&e);
            }
        };
        tracing::debug!(interface, status = resp.status, "infer responded");

        match infer_reply(&resp) {
            InferReply::Text(reply) => reply,
            InferReply::NeedsVerification => match parse_verify_command(text) {
                Some(token) => self.verify(interface, username, token).await,
                None => UNAUTHORIZED.to_string(),
            },
        }
    }

    async fn verify(&self, interface: &str, username: &str, token: &str) -> String {
        let req = VerifyRequest {
            interface: interface.to_string(),
            username: username.to_string(),
            token: token.to_string(),
        };
        match self.backend.add_interface(&req).await {
            Ok(resp) => {
                tracing::info!(interface, username, status = resp.status, "verify attempt");
                verify_reply(&resp)
            }
            Err(e) => {
                tracing::warn!(interface, code = %e.code, "add_interface request failed: {}", e.message);
                network_error_reply(&e)
            }
        }
    }

    /// Relay one inbound message activity and deliver exactly one reply to
    /// its address. Returns the reply text that was sent.
    pub async fn handle(&self, activity: &Activity) -> Result<String, RelayError> {
        let address = Address::from_activity(activity).ok_or(RelayError::MissingAddress)?;
        self.addresses.put(&address.channel_id, address.clone());

        let reply_text = self
            .respond(&address.channel_id, &address.user.id, activity.text())
            .await;

        self.sender
            .send(&address, &activity.reply(reply_text.clone()))
            .await?;
        Ok(reply_text)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
