//! Temporary network relay (TURN) credentials
//!
//! Issuing credentials is delegated to a third-party service; the server only
//! forwards what the issuer returns.

use crate::error::CredentialError;
use async_trait::async_trait;

/// Issues short-lived relay credentials
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(&self) -> Result<serde_json::Value, CredentialError>;
}

/// Default Twilio REST API endpoint
pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Network traversal tokens from Twilio's `Tokens` resource
pub struct TwilioIssuer {
    client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
}

impl TwilioIssuer {
    pub fn new(account_sid: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: TWILIO_API_BASE.to_string(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
        }
    }

    /// Point the issuer at a different API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn tokens_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Tokens.json",
            self.api_base, self.account_sid
        )
    }
}

#[async_trait]
impl CredentialIssuer for TwilioIssuer {
    async fn issue(&self) -> Result<serde_json::Value, CredentialError> {
        let response = self
            .client
            .post(self.tokens_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Credential issuer refused request");
            return Err(CredentialError::Status(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}
