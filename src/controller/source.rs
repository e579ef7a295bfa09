use async_trait::async_trait;
use derive_more::Display;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::api::qr::{RevokeResponse, SessionResponse};
use crate::model::qr_session::{SessionType, SessionView};

#[derive(Debug, Display)]
pub enum SourceError {
    #[display(fmt = "request failed: {}", _0)]
    Request(reqwest::Error),
    #[display(fmt = "{} ({}): {}", code, status, message)]
    Api {
        status: u16,
        code: String,
        message: String,
    },
}

impl std::error::Error for SourceError {}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        SourceError::Request(e)
    }
}

/// Where a display gets its codes from.
#[async_trait]
pub trait QrSessionSource: Send + Sync {
    async fn generate(
        &self,
        session_type: SessionType,
        duration: u32,
    ) -> Result<SessionView, SourceError>;

    /// `None` when the server has no active code.
    async fn current(&self) -> Result<Option<SessionView>, SourceError>;

    async fn revoke(&self) -> Result<u64, SourceError>;
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

/// Talks to the attendance server's QR endpoints with an HR bearer token.
pub struct HttpQrSource {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpQrSource {
    /// `base_url` includes the API prefix, e.g. `http://host:8080/api`.
    pub fn new(base_url: &str, token: &str) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/json")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn api_error(response: reqwest::Response) -> SourceError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => SourceError::Api {
            status: status.as_u16(),
            code: parsed.error,
            message: parsed.message,
        },
        Err(_) => SourceError::Api {
            status: status.as_u16(),
            code: "unexpected_response".into(),
            message: body,
        },
    }
}

#[async_trait]
impl QrSessionSource for HttpQrSource {
    async fn generate(
        &self,
        session_type: SessionType,
        duration: u32,
    ) -> Result<SessionView, SourceError> {
        let body = match session_type {
            SessionType::Rotating => json!({"type": session_type, "duration_minutes": duration}),
            SessionType::Static => json!({"type": session_type, "duration_hours": duration}),
        };
        let response = self
            .request(self.client.post(self.url("/qr/generate")))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let session = response.json::<SessionResponse>().await?.session;
        debug!(session_id = %session.session_id, "Generated QR session");
        Ok(session)
    }

    async fn current(&self) -> Result<Option<SessionView>, SourceError> {
        let response = self
            .request(self.client.get(self.url("/qr/current")))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                Ok(Some(response.json::<SessionResponse>().await?.session))
            }
            _ => Err(api_error(response).await),
        }
    }

    async fn revoke(&self) -> Result<u64, SourceError> {
        let response = self
            .request(self.client.post(self.url("/qr/revoke")))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response.json::<RevokeResponse>().await?.revoked_count)
    }
}
