//! Automatic approval processing for pending alumni registrations.
//!
//! Each invocation selects a bounded batch of eligible pending registrations,
//! validates them against the ERP with exponential backoff, and either
//! approves them (issuing a verification token and sending the approval
//! email) or flags them for human review. The job never rejects a
//! registration: exhausted retries escalate to an administrator instead,
//! since a transient ERP outage must not look like a bad staff number.
//!
//! All retry state lives on the registration row; the job itself is
//! stateless between invocations. Mutations accumulate in memory and are
//! written in a single transaction at the end of the batch.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use crate::db::queries;
use crate::models::audit::{AuditAction, NewAuditEntry};
use crate::models::email_log::NewEmailLogEntry;
use crate::models::registration::{Registration, RegistrationStatus};
use crate::services::email::ApprovalMailer;
use crate::services::erp::{ErpValidation, ErpValidator};
use crate::services::token;

/// Actor recorded on registrations and audit rows mutated by this job.
pub const SYSTEM_ACTOR: &str = "System (Automatic ERP Validation)";

/// Status string recorded on audit rows when a registration is flagged.
/// The row itself stays `pending`; the flag removes it from the eligible set.
const FLAGGED_STATUS_LABEL: &str = "Pending (Requires Manual Review)";

/// Tunables for the approval job, passed in explicitly at construction.
#[derive(Debug, Clone)]
pub struct ApprovalJobConfig {
    /// Registrations processed per invocation.
    pub batch_size: i64,
    /// ERP attempts before escalating to manual review.
    pub max_retry_attempts: i32,
    /// Base backoff delay; attempt N waits `base * 2^(N-1)` minutes.
    pub retry_delay_minutes: i64,
    /// Portal base URL for verification links in approval emails.
    pub portal_base_url: String,
}

/// Outcome of processing one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Approved,
    FlaggedForManualReview,
    Retry,
    Skipped,
    Error,
}

/// Tally of item outcomes for one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub approved: usize,
    pub flagged_for_manual_review: usize,
    pub retried: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl BatchSummary {
    fn tally(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Approved => self.approved += 1,
            ItemOutcome::FlaggedForManualReview => self.flagged_for_manual_review += 1,
            ItemOutcome::Retry => self.retried += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Error => self.errors += 1,
        }
    }
}

/// Decide whether a registration is due for another ERP attempt.
///
/// First attempts run immediately. A record at or past the attempt cap is
/// never due here; exhaustion is escalated by `handle_invalid` at the moment
/// the cap is reached. Otherwise classic exponential backoff: base 10 min
/// gives gaps of 10, 20, 40, 80 minutes.
pub fn should_retry_now(
    attempts: i32,
    last_attempt: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &ApprovalJobConfig,
) -> bool {
    if attempts == 0 {
        return true;
    }
    if attempts >= config.max_retry_attempts {
        return false;
    }
    let Some(last) = last_attempt else {
        return true;
    };

    // A misconfigured cap can push the exponent past what i64 holds; a
    // delay outside the representable range is never due, same as the cap.
    let delay = 1i64
        .checked_shl((attempts - 1) as u32)
        .and_then(|multiplier| config.retry_delay_minutes.checked_mul(multiplier))
        .and_then(Duration::try_minutes);
    match delay {
        Some(delay) => now.signed_duration_since(last) >= delay,
        None => false,
    }
}

/// The approval processing job. Generic over its ERP and mail seams so the
/// state machine is testable without the real collaborators.
pub struct ApprovalJob<E, M> {
    erp: E,
    mailer: M,
    config: ApprovalJobConfig,
}

impl<E: ErpValidator, M: ApprovalMailer> ApprovalJob<E, M> {
    pub fn new(erp: E, mailer: M, config: ApprovalJobConfig) -> Self {
        Self { erp, mailer, config }
    }

    pub fn config(&self) -> &ApprovalJobConfig {
        &self.config
    }

    pub fn erp(&self) -> &E {
        &self.erp
    }

    pub fn mailer(&self) -> &M {
        &self.mailer
    }

    /// Process one batch of pending registrations.
    ///
    /// Store-level failures (query, commit, lock handling) propagate to the
    /// caller; the scheduler loop owns what happens next. Per-item failures
    /// are contained to the item's `Error` outcome.
    pub async fn process_pending(&self, pool: &PgPool) -> Result<BatchSummary, sqlx::Error> {
        let started = Instant::now();

        // Single-flight guard: overlapping invocations would double-process
        // the same batch. The advisory lock is session-scoped, so the
        // connection must stay checked out until the batch is done.
        let mut lock_conn = pool.acquire().await?;
        if !queries::try_acquire_job_lock(&mut *lock_conn).await? {
            info!("Another approval invocation holds the job lock, skipping this run");
            return Ok(BatchSummary::default());
        }

        let result = self.process_batch(pool).await;

        if let Err(e) = queries::release_job_lock(&mut *lock_conn).await {
            warn!(error = %e, "Failed to release approval job lock");
        }
        drop(lock_conn);

        let summary = result?;
        let elapsed = started.elapsed();

        metrics::counter!("approval_registrations_approved_total")
            .increment(summary.approved as u64);
        metrics::counter!("approval_registrations_flagged_total")
            .increment(summary.flagged_for_manual_review as u64);
        metrics::counter!("approval_registrations_retried_total")
            .increment(summary.retried as u64);
        metrics::counter!("approval_registrations_skipped_total")
            .increment(summary.skipped as u64);
        metrics::counter!("approval_registrations_errors_total")
            .increment(summary.errors as u64);
        metrics::histogram!("approval_batch_seconds").record(elapsed.as_secs_f64());

        info!(
            approved = summary.approved,
            flagged = summary.flagged_for_manual_review,
            retried = summary.retried,
            skipped = summary.skipped,
            errors = summary.errors,
            elapsed_ms = elapsed.as_millis() as u64,
            "Approval batch complete"
        );

        Ok(summary)
    }

    async fn process_batch(&self, pool: &PgPool) -> Result<BatchSummary, sqlx::Error> {
        let mut summary = BatchSummary::default();

        let mut registrations =
            queries::fetch_eligible_pending(pool, self.config.batch_size).await?;
        if registrations.is_empty() {
            debug!("No eligible pending registrations");
            return Ok(summary);
        }

        info!(count = registrations.len(), "Processing pending registrations");

        let mut audit_entries = Vec::new();
        let mut email_logs = Vec::new();
        let mut outcomes = Vec::with_capacity(registrations.len());

        // Strictly sequential: one ERP call in flight at a time, batch size
        // is the throttle on that dependency.
        for reg in registrations.iter_mut() {
            let outcome = self
                .process_single(reg, &mut audit_entries, &mut email_logs, Utc::now())
                .await;
            summary.tally(outcome);
            outcomes.push(outcome);
        }

        // Skipped records were not mutated and are left out of the commit.
        let dirty: Vec<&Registration> = registrations
            .iter()
            .zip(&outcomes)
            .filter(|(_, outcome)| **outcome != ItemOutcome::Skipped)
            .map(|(reg, _)| reg)
            .collect();

        queries::commit_batch(pool, &dirty, &audit_entries, &email_logs).await?;

        Ok(summary)
    }

    /// Run the per-registration state machine.
    ///
    /// The attempt counter and timestamp are bumped before the ERP call, so
    /// a call that fails mid-flight still respects backoff on the next tick.
    pub async fn process_single(
        &self,
        reg: &mut Registration,
        audit: &mut Vec<NewAuditEntry>,
        email_logs: &mut Vec<NewEmailLogEntry>,
        now: DateTime<Utc>,
    ) -> ItemOutcome {
        if !should_retry_now(
            reg.erp_validation_attempts,
            reg.last_erp_validation_attempt,
            now,
            &self.config,
        ) {
            debug!(
                registration_id = %reg.id,
                attempts = reg.erp_validation_attempts,
                "Backoff window not elapsed, skipping"
            );
            return ItemOutcome::Skipped;
        }

        // ERP validation cannot run without a staff number and there is
        // nothing to retry; hand the record to a human immediately.
        let staff_number = match reg.staff_number.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => {
                self.flag_for_manual_review(reg, "Staff number not available".to_string(), now, audit);
                return ItemOutcome::FlaggedForManualReview;
            }
        };

        reg.erp_validation_attempts += 1;
        reg.last_erp_validation_attempt = Some(now);
        reg.updated_at = now;

        let validation = match self.erp.validate(&staff_number).await {
            Ok(v) => v,
            Err(e) => {
                error!(
                    registration_id = %reg.id,
                    staff_number = %staff_number,
                    attempt = reg.erp_validation_attempts,
                    error = %e,
                    "ERP validation call failed"
                );
                return ItemOutcome::Error;
            }
        };

        if validation.is_valid {
            self.handle_valid(reg, validation, now, audit, email_logs).await;
            ItemOutcome::Approved
        } else {
            self.handle_invalid(reg, &validation, now, audit)
        }
    }

    /// ERP confirmed the staff number: approve, issue the verification
    /// token, record the audit row, and attempt the approval email.
    async fn handle_valid(
        &self,
        reg: &mut Registration,
        validation: ErpValidation,
        now: DateTime<Utc>,
        audit: &mut Vec<NewAuditEntry>,
        email_logs: &mut Vec<NewEmailLogEntry>,
    ) {
        reg.erp_validated = true;
        reg.erp_validated_at = Some(now);
        reg.erp_staff_name = validation.staff_name;
        reg.erp_department = validation.department;
        reg.erp_exit_date = validation.exit_date;

        let verification = token::issue(reg.id, &reg.email, now);
        reg.email_verification_token = Some(verification.token.clone());
        reg.email_verification_token_expiry = Some(verification.expires_at);

        let previous_status = reg.status;
        reg.status = RegistrationStatus::Approved;
        reg.approved_at = Some(now);
        reg.updated_at = now;
        reg.updated_by = Some(SYSTEM_ACTOR.to_string());

        let staff_name = reg.erp_staff_name.as_deref().unwrap_or("unknown");
        let department = reg.erp_department.as_deref().unwrap_or("unknown");
        audit.push(NewAuditEntry::automated(
            reg.id,
            AuditAction::AutomaticApproval,
            format!(
                "Automatically approved after ERP validation. Staff name: {staff_name}, department: {department}"
            ),
            previous_status.to_string(),
            reg.status.to_string(),
        ));

        info!(
            registration_id = %reg.id,
            staff_name = %staff_name,
            department = %department,
            "Registration automatically approved"
        );

        // Approval state is authoritative; email delivery is best-effort and
        // recoverable later through the email log.
        let link = format!(
            "{}/verify-email?token={}",
            self.config.portal_base_url.trim_end_matches('/'),
            verification.token
        );
        match self
            .mailer
            .send_approval_email(&reg.full_name, &reg.email, &link)
            .await
        {
            Ok(true) => {
                reg.approval_email_sent = true;
                reg.approval_email_sent_at = Some(now);
                email_logs.push(NewEmailLogEntry::approval_sent(reg.id, reg.email.as_str()));
            }
            Ok(false) => {
                warn!(
                    registration_id = %reg.id,
                    "Approval email undelivered, registration stays approved"
                );
                email_logs.push(NewEmailLogEntry::approval_failed(
                    reg.id,
                    reg.email.as_str(),
                    "mail API reported non-delivery",
                ));
            }
            Err(e) => {
                warn!(
                    registration_id = %reg.id,
                    error = %e,
                    "Approval email send failed, registration stays approved"
                );
                email_logs.push(NewEmailLogEntry::approval_failed(
                    reg.id,
                    reg.email.as_str(),
                    e.to_string(),
                ));
            }
        }
    }

    /// ERP rejected the staff number: retry later, or escalate to a human
    /// once the attempt cap is reached. Never auto-reject.
    fn handle_invalid(
        &self,
        reg: &mut Registration,
        validation: &ErpValidation,
        now: DateTime<Utc>,
        audit: &mut Vec<NewAuditEntry>,
    ) -> ItemOutcome {
        if reg.erp_validation_attempts >= self.config.max_retry_attempts {
            let last_error = validation
                .error_message
                .as_deref()
                .unwrap_or("ERP reported the staff number as invalid");
            let reason = format!(
                "ERP validation failed after {} attempts. Last error: {last_error}",
                reg.erp_validation_attempts
            );
            self.flag_for_manual_review(reg, reason, now, audit);
            ItemOutcome::FlaggedForManualReview
        } else {
            reg.updated_at = now;
            debug!(
                registration_id = %reg.id,
                attempt = reg.erp_validation_attempts,
                max_attempts = self.config.max_retry_attempts,
                "ERP validation failed, retry scheduled"
            );
            ItemOutcome::Retry
        }
    }

    /// Terminal for this job: once flagged, ownership moves to the admin
    /// review workflow and the record never re-enters the eligible set.
    fn flag_for_manual_review(
        &self,
        reg: &mut Registration,
        reason: String,
        now: DateTime<Utc>,
        audit: &mut Vec<NewAuditEntry>,
    ) {
        reg.requires_manual_review = true;
        reg.manual_review_reason = Some(reason.clone());
        reg.updated_at = now;
        reg.updated_by = Some(SYSTEM_ACTOR.to_string());

        audit.push(NewAuditEntry::automated(
            reg.id,
            AuditAction::FlaggedForManualReview,
            reason,
            reg.status.to_string(),
            FLAGGED_STATUS_LABEL.to_string(),
        ));

        warn!(registration_id = %reg.id, "Registration flagged for manual review");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ApprovalJobConfig {
        ApprovalJobConfig {
            batch_size: 10,
            max_retry_attempts: 5,
            retry_delay_minutes: 10,
            portal_base_url: "https://alumni.kenya-airways.com".to_string(),
        }
    }

    #[test]
    fn test_first_attempt_is_immediate() {
        let now = Utc::now();
        assert!(should_retry_now(0, None, now, &test_config()));
        // Even with a stale timestamp left over, attempt 0 is always due.
        assert!(should_retry_now(0, Some(now), now, &test_config()));
    }

    #[test]
    fn test_exhausted_attempts_never_due() {
        let now = Utc::now();
        let cfg = test_config();
        assert!(!should_retry_now(5, Some(now - Duration::days(365)), now, &cfg));
        assert!(!should_retry_now(7, None, now, &cfg));
    }

    #[test]
    fn test_backoff_boundary_at_two_attempts() {
        // Attempt count 2 with base 10 min waits 20 minutes.
        let cfg = test_config();
        let last = Utc::now();

        assert!(!should_retry_now(2, Some(last), last + Duration::minutes(19), &cfg));
        assert!(!should_retry_now(
            2,
            Some(last),
            last + Duration::minutes(20) - Duration::seconds(1),
            &cfg
        ));
        assert!(should_retry_now(2, Some(last), last + Duration::minutes(20), &cfg));
        assert!(should_retry_now(2, Some(last), last + Duration::minutes(45), &cfg));
    }

    #[test]
    fn test_backoff_schedule_doubles() {
        let cfg = test_config();
        let last = Utc::now();

        for (attempts, due_minutes) in [(1, 10), (2, 20), (3, 40), (4, 80)] {
            let just_before = last + Duration::minutes(due_minutes - 1);
            let exactly_due = last + Duration::minutes(due_minutes);
            assert!(
                !should_retry_now(attempts, Some(last), just_before, &cfg),
                "attempt {attempts} due too early"
            );
            assert!(
                should_retry_now(attempts, Some(last), exactly_due, &cfg),
                "attempt {attempts} not due at {due_minutes} minutes"
            );
        }
    }

    #[test]
    fn test_huge_attempt_count_never_due_and_never_panics() {
        // Shift amounts past 63 bits must not overflow the delay math.
        let cfg = ApprovalJobConfig {
            max_retry_attempts: 500,
            ..test_config()
        };
        let last = Utc::now() - Duration::days(3650);

        assert!(!should_retry_now(64, Some(last), Utc::now(), &cfg));
        assert!(!should_retry_now(100, Some(last), Utc::now(), &cfg));
        // Large but representable exponents behave like any other backoff.
        assert!(!should_retry_now(40, Some(last), Utc::now(), &cfg));
    }

    #[test]
    fn test_missing_last_attempt_is_due() {
        // Attempt count recorded but timestamp missing: treat as due rather
        // than wedging the record forever.
        assert!(should_retry_now(2, None, Utc::now(), &test_config()));
    }

    #[test]
    fn test_five_minutes_into_ten_minute_window_not_due() {
        let cfg = test_config();
        let now = Utc::now();
        assert!(!should_retry_now(1, Some(now - Duration::minutes(5)), now, &cfg));
        assert!(should_retry_now(1, Some(now - Duration::minutes(10)), now, &cfg));
    }

    #[test]
    fn test_summary_tally() {
        let mut summary = BatchSummary::default();
        summary.tally(ItemOutcome::Approved);
        summary.tally(ItemOutcome::Approved);
        summary.tally(ItemOutcome::Retry);
        summary.tally(ItemOutcome::Skipped);
        summary.tally(ItemOutcome::FlaggedForManualReview);
        summary.tally(ItemOutcome::Error);

        assert_eq!(summary.approved, 2);
        assert_eq!(summary.retried, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.flagged_for_manual_review, 1);
        assert_eq!(summary.errors, 1);
    }
}
