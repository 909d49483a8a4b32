use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle status of an alumni registration.
///
/// The approval job only ever moves `Pending` to `Approved`; every other
/// transition belongs to the admin workflow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Active,
    Rejected,
}

/// An alumni registration as stored in Postgres.
///
/// The ERP retry state (`erp_validation_attempts`, `last_erp_validation_attempt`,
/// `requires_manual_review`) is owned exclusively by the approval job; the
/// manual-review flags double as the signal that removes a record from the
/// job's eligible set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    pub staff_number: Option<String>,
    pub email: String,
    pub full_name: String,
    pub status: RegistrationStatus,

    pub erp_validation_attempts: i32,
    pub last_erp_validation_attempt: Option<DateTime<Utc>>,
    pub erp_validated: bool,
    pub erp_validated_at: Option<DateTime<Utc>>,
    pub erp_staff_name: Option<String>,
    pub erp_department: Option<String>,
    pub erp_exit_date: Option<NaiveDate>,

    pub requires_manual_review: bool,
    pub manual_review_reason: Option<String>,
    pub manually_reviewed: bool,

    pub email_verification_token: Option<String>,
    pub email_verification_token_expiry: Option<DateTime<Utc>>,
    pub approval_email_sent: bool,
    pub approval_email_sent_at: Option<DateTime<Utc>>,

    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}
