//! Chat-platform activity payloads and the delivery address derived from them.
//!
//! The webhook body follows the bot-framework activity schema (camelCase JSON).
//! Only the fields the relay reads or echoes back are modelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MESSAGE: &str = "message";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

impl Activity {
    pub fn is_message(&self) -> bool {
        self.kind == MESSAGE
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Build the outbound reply: sender and recipient swapped, same
    /// conversation, threaded onto this activity.
    pub fn reply(&self, text: impl Into<String>) -> Activity {
        Activity {
            kind: MESSAGE.to_string(),
            id: None,
            timestamp: Some(Utc::now()),
            service_url: self.service_url.clone(),
            channel_id: self.channel_id.clone(),
            from: self.recipient.clone(),
            recipient: self.from.clone(),
            conversation: self.conversation.clone(),
            text: Some(text.into()),
            reply_to_id: self.id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Everything needed to deliver a message back to a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub service_url: String,
    pub channel_id: String,
    pub conversation_id: String,
    pub bot: ChannelAccount,
    pub user: ChannelAccount,
    /// Replies to this address need a connector bearer token.
    pub use_auth: bool,
}

impl Address {
    /// Derive the delivery address of an inbound activity. Returns `None`
    /// when the activity lacks a service URL, channel or conversation.
    pub fn from_activity(activity: &Activity) -> Option<Address> {
        let service_url = activity.service_url.as_deref()?.trim_end_matches('/');
        let channel_id = activity.channel_id.clone()?;
        let conversation_id = activity.conversation.as_ref()?.id.clone();
        if service_url.is_empty() || channel_id.is_empty() || conversation_id.is_empty() {
            return None;
        }
        // The local emulator and plain-http endpoints never validate tokens.
        let use_auth = channel_id != "emulator" && !service_url.starts_with("http://");
        Some(Address {
            service_url: service_url.to_string(),
            channel_id,
            conversation_id,
            bot: activity.recipient.clone().unwrap_or_default(),
            user: activity.from.clone().unwrap_or_default(),
            use_auth,
        })
    }
}
