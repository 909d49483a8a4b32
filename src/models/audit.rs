use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Audit actions the approval job can record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
pub enum AuditAction {
    #[strum(serialize = "AutomaticApproval")]
    AutomaticApproval,
    #[strum(serialize = "Flagged for Manual Review")]
    FlaggedForManualReview,
}

/// Append-only audit row describing a terminal transition made by the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub registration_id: Uuid,
    pub action: AuditAction,
    pub performed_by: String,
    pub notes: String,
    pub previous_status: String,
    pub new_status: String,
    pub is_automated: bool,
}

impl NewAuditEntry {
    /// Build an automated entry attributed to the system.
    pub fn automated(
        registration_id: Uuid,
        action: AuditAction,
        notes: impl Into<String>,
        previous_status: impl Into<String>,
        new_status: impl Into<String>,
    ) -> Self {
        Self {
            registration_id,
            action,
            performed_by: "System".to_string(),
            notes: notes.into(),
            previous_status: previous_status.into(),
            new_status: new_status.into(),
            is_automated: true,
        }
    }
}
