use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Requests / responses
// ---------------------------------------------------------------------------

/// Form body of `POST /infer`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferRequest {
    pub interface: String,
    pub username: String,
    pub speech_input: String,
}

/// Form body of `POST /add_interface`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyRequest {
    pub interface: String,
    pub username: String,
    pub token: String,
}

/// Raw HTTP result from the command center. Status interpretation is left
/// to the relay.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

/// The request never produced an HTTP response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct BackendError {
    pub code: String,
    pub message: String,
}

impl BackendError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        let code = if e.is_timeout() {
            "ETIMEDOUT"
        } else if e.is_connect() {
            "ECONNREFUSED"
        } else if e.is_body() || e.is_decode() {
            "EBODY"
        } else if e.is_request() || e.is_builder() {
            "EREQUEST"
        } else {
            "EUNKNOWN"
        };
        BackendError::new(code, e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// The command-center API as seen by the relay.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn infer(&self, req: &InferRequest) -> Result<BackendResponse, BackendError>;

    async fn add_interface(&self, req: &VerifyRequest) -> Result<BackendResponse, BackendError>;
}

// ---------------------------------------------------------------------------
// HttpBackend
// ---------------------------------------------------------------------------

pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_form<T: Serialize + Sync>(
        &self,
        path: &str,
        form: &T,
    ) -> Result<BackendResponse, BackendError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "posting to command center");
        let resp = self.client.post(&url).form(form).send().await?;
        let status = resp.status();
        let reason = status.canonical_reason().unwrap_or("").to_string();
        let body = resp.text().await?;
        Ok(BackendResponse {
            status: status.as_u16(),
            reason,
            body,
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn infer(&self, req: &InferRequest) -> Result<BackendResponse, BackendError> {
        self.post_form("/infer", req).await
    }

    async fn add_interface(&self, req: &VerifyRequest) -> Result<BackendResponse, BackendError> {
        self.post_form("/add_interface", req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn infer_req() -> InferRequest {
        InferRequest {
            interface: "skype".into(),
            username: "user-1".into(),
            speech_input: "hello there".into(),
        }
    }

    #[tokio::test]
    async fn infer_posts_form_and_returns_raw_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/infer")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("interface".into(), "skype".into()),
                Matcher::UrlEncoded("username".into(), "user-1".into()),
                Matcher::UrlEncoded("speech_input".into(), "hello there".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"result":"hi"}"#)
            .create_async()
            .await;

        let backend = HttpBackend::new(format!("{}/", server.url())).unwrap();
        let resp = backend.infer(&infer_req()).await.unwrap();
        mock.assert_async().await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.reason, "OK");
        assert_eq!(resp.body, r#"{"result":"hi"}"#);
    }

    #[tokio::test]
    async fn add_interface_passes_non_success_status_through() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/add_interface")
            .match_body(Matcher::UrlEncoded("token".into(), "abc123".into()))
            .with_status(401)
            .create_async()
            .await;

        let backend = HttpBackend::new(server.url()).unwrap();
        let resp = backend
            .add_interface(&VerifyRequest {
                interface: "skype".into(),
                username: "user-1".into(),
                token: "abc123".into(),
            })
            .await
            .unwrap();
        assert_eq!(resp.status, 401);
        assert_eq!(resp.reason, "Unauthorized");
    }

    #[tokio::test]
    async fn unreachable_backend_yields_connect_code() {
        // Port 9 (discard) on loopback is not listening in test environments.
        let backend = HttpBackend::new("http://127.0.0.1:9").unwrap();
        let err = backend.infer(&infer_req()).await.unwrap_err();
        assert_eq!(err.code, "ECONNREFUSED");
    }
}
