//! HTTP ephemeral-token client.
//!
//! Exchanges a long-lived API key for a short-lived session token. The
//! long-lived key never travels on the realtime connection; the session only
//! ever holds the ephemeral secret, and drops it on every disconnect.

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::TokenError;
use crate::ports::{EphemeralToken, TokenPort};

/// Default session-mint endpoint.
pub const DEFAULT_SESSIONS_URL: &str = "https://api.openai.com/v1/realtime/sessions";

/// Response envelope from the sessions endpoint. Only the secret is read.
#[derive(Debug, Deserialize)]
struct SessionResponse {
    client_secret: ClientSecret,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
    #[serde(default)]
    expires_at: Option<u64>,
}

/// [`TokenPort`] adapter over the HTTP sessions endpoint.
pub struct HttpTokenClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    voice: Option<String>,
}

impl HttpTokenClient {
    /// A client for the default endpoint.
    pub fn new(api_key: String, model: String, voice: Option<String>) -> Self {
        Self::with_endpoint(DEFAULT_SESSIONS_URL.to_string(), api_key, model, voice)
    }

    /// A client for an explicit endpoint URL.
    pub fn with_endpoint(
        endpoint: String,
        api_key: String,
        model: String,
        voice: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
            voice,
        }
    }
}

#[async_trait]
impl TokenPort for HttpTokenClient {
    async fn acquire(&self) -> Result<EphemeralToken, TokenError> {
        let mut body = serde_json::json!({ "model": self.model });
        if let Some(voice) = &self.voice {
            body["voice"] = serde_json::Value::String(voice.clone());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TokenError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TokenError::Status(status.as_u16()));
        }

        let parsed: SessionResponse = response
            .json()
            .await
            .map_err(|e| TokenError::Malformed(e.to_string()))?;

        tracing::debug!(expires_at = ?parsed.client_secret.expires_at, "ephemeral token minted");
        Ok(EphemeralToken {
            secret: parsed.client_secret.value,
            expires_at: parsed.client_secret.expires_at,
        })
    }
}
