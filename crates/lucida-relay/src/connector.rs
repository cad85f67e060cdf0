//! Reply delivery back to the originating channel.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::activity::{Activity, Address};

const TOKEN_SCOPE: &str = "https://api.botframework.com/.default";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("reply request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("channel rejected reply with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("connector token request failed with status {0}")]
    Token(u16),
}

/// Sends a reply activity to a channel address.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send(&self, address: &Address, reply: &Activity) -> Result<(), ConnectorError>;
}

// ---------------------------------------------------------------------------
// ConnectorClient
// ---------------------------------------------------------------------------

/// App registration used to obtain connector bearer tokens.
#[derive(Debug, Clone)]
pub struct ConnectorCredentials {
    pub token_url: String,
    pub app_id: String,
    pub app_password: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Posts replies to `<serviceUrl>/v3/conversations/<id>/activities[/<replyTo>]`.
pub struct ConnectorClient {
    client: reqwest::Client,
    credentials: Option<ConnectorCredentials>,
    token: Mutex<Option<CachedToken>>,
}

impl ConnectorClient {
    pub fn new(credentials: Option<ConnectorCredentials>) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            credentials,
            token: Mutex::new(None),
        })
    }

    fn activities_url(address: &Address, reply: &Activity) -> String {
        let base = format!(
            "{}/v3/conversations/{}/activities",
            address.service_url, address.conversation_id
        );
        match &reply.reply_to_id {
            Some(id) => format!("{base}/{id}"),
            None => base,
        }
    }

    async fn bearer_token(&self) -> Result<Option<String>, ConnectorError> {
        let Some(creds) = &self.credentials else {
            return Ok(None);
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(Some(token.value.clone()));
            }
        }

        let resp = self
            .client
            .post(&creds.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", creds.app_id.as_str()),
                ("client_secret", creds.app_password.as_str()),
                ("scope", TOKEN_SCOPE),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ConnectorError::Token(resp.status().as_u16()));
        }
        let body: TokenResponse = resp.json().await?;
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        tracing::debug!(expires_in = body.expires_in, "refreshed connector token");
        *cached = Some(CachedToken {
            value: body.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(Some(body.access_token))
    }
}

#[async_trait]
impl ReplySender for ConnectorClient {
    async fn send(&self, address: &Address, reply: &Activity) -> Result<(), ConnectorError> {
        let url = Self::activities_url(address, reply);
        let mut req = self.client.post(&url).json(reply);
        if address.use_auth {
            match self.bearer_token().await? {
                Some(token) => req = req.bearer_auth(token),
                None => tracing::debug!(channel = %address.channel_id, "no app credentials; sending unauthenticated reply"),
            }
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            tracing::debug!(channel = %address.channel_id, %status, "reply delivered");
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ConnectorError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ChannelAccount, ConversationAccount};
    use mockito::Matcher;

    fn address(service_url: &str, use_auth: bool) -> Address {
        Address {
            service_url: service_url.to_string(),
            channel_id: "skype".into(),
            conversation_id: "conv-1".into(),
            bot: ChannelAccount {
                id: "bot-1".into(),
                name: None,
            },
            user: ChannelAccount {
                id: "user-1".into(),
                name: None,
            },
            use_auth,
        }
    }

    fn inbound() -> Activity {
        Activity {
            kind: "message".into(),
            id: Some("act-9".into()),
            conversation: Some(ConversationAccount {
                id: "conv-1".into(),
                name: None,
            }),
            text: Some("hi".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn send_posts_reply_to_conversation() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v3/conversations/conv-1/activities/act-9")
            .match_body(Matcher::PartialJson(
                serde_json::json!({ "type": "message", "text": "pong" }),
            ))
            .with_status(200)
            .create_async()
            .await;

        let client = ConnectorClient::new(None).unwrap();
        client
            .send(&address(&server.url(), false), &inbound().reply("pong"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn send_fetches_and_caches_token_when_auth_required() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded(
                "grant_type".into(),
                "client_credentials".into(),
            ))
            .with_status(200)
            .with_body(r#"{"access_token":"tok-1","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;
        let reply_mock = server
            .mock("POST", "/v3/conversations/conv-1/activities/act-9")
            .match_header("authorization", "Bearer tok-1")
            .with_status(201)
            .expect(2)
            .create_async()
            .await;

        let client = ConnectorClient::new(Some(ConnectorCredentials {
            token_url: format!("{}/token", server.url()),
            app_id: "app".into(),
            app_password: "secret".into(),
        }))
        .unwrap();
        let addr = address(&server.url(), true);
        client.send(&addr, &inbound().reply("one")).await.unwrap();
        client.send(&addr, &inbound().reply("two")).await.unwrap();

        token_mock.assert_async().await;
        reply_mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_reply_surfaces_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", Matcher::Any)
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = ConnectorClient::new(None).unwrap();
        let err = client
            .send(&address(&server.url(), false), &inbound().reply("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Rejected { status: 502, .. }));
    }
}
