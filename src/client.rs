use crate::config::ServerConfig;
use crate::conversation::Message;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::registry::ModelId;
use crate::request::RequestPayload;
use crate::stream;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Text fragments of a streamed reply, in arrival order.
pub type FragmentStream = BoxStream<'static, Result<String>>;

const LOGIN_PATH: &str = "/auth/login";
const SESSION_PATH: &str = "/session/";

/// Typed operations against the chat service.
pub struct ChatClient {
    base_url: String,
    http: HttpClient,
}

// -- Chat --

#[derive(Deserialize)]
struct ChatReply {
    reply: String,
}

// -- Auth --

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

// -- Session archive --

#[derive(Serialize)]
struct SessionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(rename = "sessionId")]
    session_id: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = HttpClient::new(user_agent, timeout)?;
        Ok(Self { base_url, http })
    }

    pub fn from_config(server: &ServerConfig) -> Result<Self> {
        Self::new(
            server.base_url.clone(),
            &server.user_agent,
            Duration::from_secs(server.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Single-shot exchange: one JSON body in, `{reply}` out.
    pub async fn send(
        &self,
        endpoint: &str,
        payload: &RequestPayload,
        token: Option<&str>,
    ) -> Result<String> {
        debug!(endpoint, model = payload.model, "sending single-shot chat");
        let body = self
            .http
            .post_json(&self.url(endpoint), payload, token)
            .await?;

        let reply: ChatReply = serde_json::from_str(&body)
            .map_err(|e| Error::request(endpoint, format!("malformed reply: {e}")))?;
        Ok(reply.reply)
    }

    /// Streaming exchange. The returned stream ends when the server closes
    /// the response body.
    pub async fn stream(
        &self,
        endpoint: &str,
        payload: &RequestPayload,
        token: Option<&str>,
    ) -> Result<FragmentStream> {
        debug!(endpoint, model = payload.model, "opening chat stream");
        let resp = self
            .http
            .post_stream(&self.url(endpoint), payload, token)
            .await?;
        let body = Box::pin(resp.bytes_stream());
        Ok(stream::fragments(endpoint.to_string(), body).boxed())
    }

    /// Exchange credentials for an access token.
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let request = LoginRequest { email, password };
        let body = self
            .http
            .post_json(&self.url(LOGIN_PATH), &request, None)
            .await
            .map_err(|e| {
                warn!("login rejected: {e}");
                Error::auth(match e {
                    Error::Request {
                        status_code: Some(401),
                        ..
                    } => "invalid credentials".to_string(),
                    other => other.to_string(),
                })
            })?;

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::auth(format!("malformed token response: {e}")))?;
        info!("logged in as {email}");
        Ok(token.access_token)
    }

    /// Archive a conversation on the server. Returns the new session id.
    pub async fn save_session(
        &self,
        model: ModelId,
        messages: &[Message],
        token: Option<&str>,
    ) -> Result<String> {
        let request = SessionRequest {
            model: model.as_str(),
            messages,
        };
        let body = self
            .http
            .post_json(&self.url(SESSION_PATH), &request, token)
            .await?;

        let resp: SessionResponse = serde_json::from_str(&body)
            .map_err(|e| Error::request(SESSION_PATH, format!("malformed reply: {e}")))?;
        debug!(session_id = %resp.session_id, messages = messages.len(), "session saved");
        Ok(resp.session_id)
    }
}
