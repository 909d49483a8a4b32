//! Approval email delivery via the transactional mail API.
//!
//! Email delivery is best-effort: the approval decision never rolls back
//! because a message could not be sent. Callers record the attempt in
//! `email_logs` either way.

use async_trait::async_trait;
use serde::Serialize;

/// Error type for mail API operations.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("HTTP request to mail API failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mail API rejected the message: {0}")]
    Rejected(String),
}

/// Seam used by the approval job so delivery can be mocked in tests.
#[async_trait]
pub trait ApprovalMailer: Send + Sync {
    /// Send the approval email carrying the verification link.
    /// Returns false when the mail API accepted the request but reported
    /// the message as undelivered.
    async fn send_approval_email(
        &self,
        full_name: &str,
        email: &str,
        verification_link: &str,
    ) -> Result<bool, EmailError>;
}

/// Client for the transactional mail HTTP API.
pub struct MailerClient {
    http: reqwest::Client,
    api_url: String,
    api_token: String,
    from_address: String,
}

#[derive(Serialize)]
struct SendMailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html_body: String,
}

#[derive(Debug, serde::Deserialize)]
struct SendMailResponse {
    delivered: bool,
    #[serde(default)]
    message: Option<String>,
}

impl MailerClient {
    pub fn new(api_url: &str, api_token: &str, from_address: &str) -> Result<Self, EmailError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            from_address: from_address.to_string(),
        })
    }

    fn approval_body(full_name: &str, verification_link: &str) -> String {
        format!(
            concat!(
                "<p>Dear {name},</p>",
                "<p>Your Kenya Airways alumni registration has been approved. ",
                "Please verify your email address to activate your account:</p>",
                "<p><a href=\"{link}\">Verify my email</a></p>",
                "<p>This link expires in 30 days.</p>",
                "<p>Kenya Airways Alumni Team</p>"
            ),
            name = full_name,
            link = verification_link,
        )
    }
}

#[async_trait]
impl ApprovalMailer for MailerClient {
    async fn send_approval_email(
        &self,
        full_name: &str,
        email: &str,
        verification_link: &str,
    ) -> Result<bool, EmailError> {
        let url = format!("{}/api/v1/messages", self.api_url);

        let request = SendMailRequest {
            from: &self.from_address,
            to: email,
            subject: "Your Kenya Airways alumni registration is approved",
            html_body: Self::approval_body(full_name, verification_link),
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EmailError::Rejected(format!(
                "mail API returned HTTP {}",
                response.status()
            )));
        }

        let body: SendMailResponse = response.json().await?;
        if !body.delivered {
            tracing::warn!(
                recipient = %email,
                reason = body.message.as_deref().unwrap_or("unspecified"),
                "Mail API accepted request but reported non-delivery"
            );
        }

        Ok(body.delivered)
    }
}
