//! ERP Staff Validation Client
//!
//! Queries the Kenya Airways HR system (ERP) to confirm that a staff number
//! belongs to a real, possibly departed, employee. "Not found" is an ordinary
//! invalid result, not an error; only transport and infrastructure failures
//! surface as `ErpError`.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Outcome of an ERP staff-number lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErpValidation {
    pub is_valid: bool,
    pub staff_name: Option<String>,
    pub department: Option<String>,
    pub exit_date: Option<NaiveDate>,
    pub error_message: Option<String>,
}

impl ErpValidation {
    /// Explicit rejection with a reason, e.g. staff number not on record.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            staff_name: None,
            department: None,
            exit_date: None,
            error_message: Some(message.into()),
        }
    }
}

/// Error type for ERP client operations.
#[derive(Debug, thiserror::Error)]
pub enum ErpError {
    #[error("HTTP request to ERP failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ERP service unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to parse ERP response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Seam used by the approval job so ERP lookups can be mocked in tests.
#[async_trait]
pub trait ErpValidator: Send + Sync {
    async fn validate(&self, staff_number: &str) -> Result<ErpValidation, ErpError>;
}

/// Client for the ERP staff validation endpoint.
pub struct ErpClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct ErpStaffResponse {
    is_valid: bool,
    staff_name: Option<String>,
    department: Option<String>,
    exit_date: Option<NaiveDate>,
    error_message: Option<String>,
}

impl ErpClient {
    pub fn new(base_url: &str, api_token: &str) -> Result<Self, ErpError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        })
    }
}

#[async_trait]
impl ErpValidator for ErpClient {
    async fn validate(&self, staff_number: &str) -> Result<ErpValidation, ErpError> {
        let url = format!("{}/api/v1/staff/{}/validate", self.base_url, staff_number);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        // A staff number the ERP does not know is a normal rejection,
        // handled by the retry/flag cycle rather than the error path.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(ErpValidation::invalid(format!(
                "Staff number {staff_number} not found in ERP"
            )));
        }

        if !response.status().is_success() {
            return Err(ErpError::Unavailable(format!(
                "ERP returned HTTP {}",
                response.status()
            )));
        }

        let text = response.text().await?;
        let body: ErpStaffResponse = serde_json::from_str(&text)?;

        Ok(ErpValidation {
            is_valid: body.is_valid,
            staff_name: body.staff_name,
            department: body.department,
            exit_date: body.exit_date,
            error_message: body.error_message,
        })
    }
}
