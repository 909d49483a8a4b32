use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery state of an outbound email attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailDeliveryStatus {
    Sent,
    Failed,
}

/// Row recorded for every approval-email send attempt, successful or not.
///
/// Approval state is authoritative; these rows exist so undelivered mail can
/// be found and re-sent without touching the registration itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEmailLogEntry {
    pub registration_id: Uuid,
    pub recipient: String,
    pub kind: String,
    pub status: EmailDeliveryStatus,
    pub error: Option<String>,
}

impl NewEmailLogEntry {
    pub fn approval_sent(registration_id: Uuid, recipient: impl Into<String>) -> Self {
        Self {
            registration_id,
            recipient: recipient.into(),
            kind: "approval".to_string(),
            status: EmailDeliveryStatus::Sent,
            error: None,
        }
    }

    pub fn approval_failed(
        registration_id: Uuid,
        recipient: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            registration_id,
            recipient: recipient.into(),
            kind: "approval".to_string(),
            status: EmailDeliveryStatus::Failed,
            error: Some(error.into()),
        }
    }
}
