use crate::error::{Error, Result};
use reqwest::{Client, RequestBuilder, Response, header};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// JSON-over-HTTP transport. One attempt per call; failures surface as
/// [`Error::Request`] without retry.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::request("client", e.to_string()))?;

        Ok(Self { client })
    }

    /// POST a JSON body and return the response text.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        bearer: Option<&str>,
    ) -> Result<String> {
        let resp = self.send(url, self.post(url, body, bearer)?).await?;
        resp.text()
            .await
            .map_err(|e| Error::request(endpoint_of(url), e.to_string()))
    }

    /// POST a JSON body and hand back the successful response unread, for
    /// callers that consume the body as a stream.
    pub async fn post_stream<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        bearer: Option<&str>,
    ) -> Result<Response> {
        self.send(url, self.post(url, body, bearer)?).await
    }

    fn post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        bearer: Option<&str>,
    ) -> Result<RequestBuilder> {
        let body = serde_json::to_string(body)
            .map_err(|e| Error::parse(format!("serialize request: {e}")))?;

        let mut req = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        Ok(req)
    }

    async fn send(&self, url: &str, req: RequestBuilder) -> Result<Response> {
        debug!(endpoint = %endpoint_of(url), "sending request");
        let resp = req.send().await.map_err(|e| {
            warn!(endpoint = %endpoint_of(url), "transport failure: {e}");
            Error::request(endpoint_of(url), e.to_string())
        })?;
        self.check_status(resp).await
    }

    async fn check_status(&self, resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let endpoint = endpoint_of(resp.url().as_str());
        let body = resp.text().await.unwrap_or_default();
        warn!(%endpoint, status = status.as_u16(), "request rejected");
        let message = if body.is_empty() {
            status.to_string()
        } else {
            body
        };
        Err(Error::request_with_status(endpoint, message, status.as_u16()))
    }
}

/// Path component of a URL, used to label failures.
fn endpoint_of(url: &str) -> String {
    url.split("//")
        .nth(1)
        .and_then(|s| s.find('/').map(|i| &s[i..]))
        .unwrap_or("/")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_strips_scheme_and_host() {
        assert_eq!(endpoint_of("http://localhost:8000/chat/stream"), "/chat/stream");
        assert_eq!(endpoint_of("https://api.example.com/auth/login"), "/auth/login");
        assert_eq!(endpoint_of("https://api.example.com"), "/");
        assert_eq!(endpoint_of("garbage"), "/");
    }
}
