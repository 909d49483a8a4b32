//! Shared test doubles and builders for the approval job tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use alumni_approval::models::registration::{Registration, RegistrationStatus};
use alumni_approval::services::approval::{ApprovalJob, ApprovalJobConfig};
use alumni_approval::services::email::{ApprovalMailer, EmailError};
use alumni_approval::services::erp::{ErpError, ErpValidation, ErpValidator};

pub fn test_job_config() -> ApprovalJobConfig {
    ApprovalJobConfig {
        batch_size: 10,
        max_retry_attempts: 5,
        retry_delay_minutes: 10,
        portal_base_url: "https://alumni.kenya-airways.com".to_string(),
    }
}

/// A pending registration one minute old, safely past the creation cutoff.
pub fn pending_registration(staff_number: Option<&str>) -> Registration {
    let created = Utc::now() - Duration::minutes(1);
    Registration {
        id: Uuid::new_v4(),
        staff_number: staff_number.map(str::to_string),
        email: "jane.doe@example.com".to_string(),
        full_name: "Jane Doe".to_string(),
        status: RegistrationStatus::Pending,
        erp_validation_attempts: 0,
        last_erp_validation_attempt: None,
        erp_validated: false,
        erp_validated_at: None,
        erp_staff_name: None,
        erp_department: None,
        erp_exit_date: None,
        requires_manual_review: false,
        manual_review_reason: None,
        manually_reviewed: false,
        email_verification_token: None,
        email_verification_token_expiry: None,
        approval_email_sent: false,
        approval_email_sent_at: None,
        approved_at: None,
        created_at: created,
        updated_at: created,
        updated_by: None,
    }
}

/// ERP stub that replays a scripted sequence of responses and records the
/// staff numbers it was asked about.
pub struct ScriptedErp {
    responses: Mutex<Vec<Result<ErpValidation, ErpError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedErp {
    pub fn new(responses: Vec<Result<ErpValidation, ErpError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with the same valid staff record.
    pub fn always_valid(staff_name: &str, department: &str) -> Self {
        let validation = ErpValidation {
            is_valid: true,
            staff_name: Some(staff_name.to_string()),
            department: Some(department.to_string()),
            exit_date: None,
            error_message: None,
        };
        Self::new((0..32).map(|_| Ok(validation.clone())).collect())
    }

    /// Answers every call with an explicit rejection.
    pub fn always_invalid(message: &str) -> Self {
        Self::new((0..32).map(|_| Ok(ErpValidation::invalid(message))).collect())
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ErpValidator for ScriptedErp {
    async fn validate(&self, staff_number: &str) -> Result<ErpValidation, ErpError> {
        self.calls.lock().unwrap().push(staff_number.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            panic!("ScriptedErp ran out of responses");
        }
        responses.remove(0)
    }
}

/// What the stub mailer should do for every send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailBehaviour {
    Delivered,
    Undelivered,
    TransportError,
}

/// Mailer stub recording every send attempt.
pub struct StubMailer {
    behaviour: MailBehaviour,
    sent: Mutex<Vec<(String, String, String)>>,
}

impl StubMailer {
    pub fn new(behaviour: MailBehaviour) -> Self {
        Self {
            behaviour,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApprovalMailer for StubMailer {
    async fn send_approval_email(
        &self,
        full_name: &str,
        email: &str,
        verification_link: &str,
    ) -> Result<bool, EmailError> {
        self.sent.lock().unwrap().push((
            full_name.to_string(),
            email.to_string(),
            verification_link.to_string(),
        ));
        match self.behaviour {
            MailBehaviour::Delivered => Ok(true),
            MailBehaviour::Undelivered => Ok(false),
            MailBehaviour::TransportError => {
                Err(EmailError::Rejected("mail API returned HTTP 503".to_string()))
            }
        }
    }
}

pub fn make_job(erp: ScriptedErp, mailer: StubMailer) -> ApprovalJob<ScriptedErp, StubMailer> {
    ApprovalJob::new(erp, mailer, test_job_config())
}
