use std::str::FromStr;

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::db::audit_queries;
use crate::models::audit::NewAuditEntry;
use crate::models::email_log::NewEmailLogEntry;
use crate::models::registration::{Registration, RegistrationStatus};

/// Advisory lock key guarding against overlapping job invocations.
/// Arbitrary but stable; shared by every instance of this service.
pub const APPROVAL_JOB_LOCK_KEY: i64 = 7_246_114_522_001;

const REGISTRATION_COLUMNS: &str = r#"
    id, staff_number, email, full_name, status,
    erp_validation_attempts, last_erp_validation_attempt,
    erp_validated, erp_validated_at, erp_staff_name, erp_department, erp_exit_date,
    requires_manual_review, manual_review_reason, manually_reviewed,
    email_verification_token, email_verification_token_expiry,
    approval_email_sent, approval_email_sent_at,
    approved_at, created_at, updated_at, updated_by
"#;

fn map_registration(row: &PgRow) -> Result<Registration, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = RegistrationStatus::from_str(&status_str).map_err(|_| {
        sqlx::Error::Decode(format!("unknown registration status '{status_str}'").into())
    })?;

    Ok(Registration {
        id: row.try_get("id")?,
        staff_number: row.try_get("staff_number")?,
        email: row.try_get("email")?,
        full_name: row.try_get("full_name")?,
        status,
        erp_validation_attempts: row.try_get("erp_validation_attempts")?,
        last_erp_validation_attempt: row.try_get("last_erp_validation_attempt")?,
        erp_validated: row.try_get("erp_validated")?,
        erp_validated_at: row.try_get("erp_validated_at")?,
        erp_staff_name: row.try_get("erp_staff_name")?,
        erp_department: row.try_get("erp_department")?,
        erp_exit_date: row.try_get("erp_exit_date")?,
        requires_manual_review: row.try_get("requires_manual_review")?,
        manual_review_reason: row.try_get("manual_review_reason")?,
        manually_reviewed: row.try_get("manually_reviewed")?,
        email_verification_token: row.try_get("email_verification_token")?,
        email_verification_token_expiry: row.try_get("email_verification_token_expiry")?,
        approval_email_sent: row.try_get("approval_email_sent")?,
        approval_email_sent_at: row.try_get("approval_email_sent_at")?,
        approved_at: row.try_get("approved_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        updated_by: row.try_get("updated_by")?,
    })
}

/// Select the batch of registrations eligible for automatic processing.
///
/// The 1-second cutoff on `created_at` avoids racing a registration the
/// portal is still writing. Oldest-first ordering gives late arrivals no
/// way to starve older pending records.
pub async fn fetch_eligible_pending(
    pool: &PgPool,
    batch_size: i64,
) -> Result<Vec<Registration>, sqlx::Error> {
    let query = format!(
        r#"
        SELECT {REGISTRATION_COLUMNS}
        FROM registrations
        WHERE status = 'pending'
          AND created_at <= NOW() - INTERVAL '1 second'
          AND manually_reviewed = FALSE
          AND requires_manual_review = FALSE
        ORDER BY created_at ASC
        LIMIT $1
        "#
    );

    let rows = sqlx::query(&query).bind(batch_size).fetch_all(pool).await?;
    rows.iter().map(map_registration).collect()
}

/// Get a registration by ID
pub async fn get_registration(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<Registration>, sqlx::Error> {
    let query = format!(
        r#"
        SELECT {REGISTRATION_COLUMNS}
        FROM registrations
        WHERE id = $1
        "#
    );

    let row = sqlx::query(&query).bind(id).fetch_optional(pool).await?;
    row.as_ref().map(map_registration).transpose()
}

/// Write back every job-owned field of a registration.
async fn update_registration(
    conn: &mut PgConnection,
    reg: &Registration,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE registrations
        SET status = $1,
            erp_validation_attempts = $2,
            last_erp_validation_attempt = $3,
            erp_validated = $4,
            erp_validated_at = $5,
            erp_staff_name = $6,
            erp_department = $7,
            erp_exit_date = $8,
            requires_manual_review = $9,
            manual_review_reason = $10,
            email_verification_token = $11,
            email_verification_token_expiry = $12,
            approval_email_sent = $13,
            approval_email_sent_at = $14,
            approved_at = $15,
            updated_at = $16,
            updated_by = $17
        WHERE id = $18
        "#,
    )
    .bind(reg.status.to_string())
    .bind(reg.erp_validation_attempts)
    .bind(reg.last_erp_validation_attempt)
    .bind(reg.erp_validated)
    .bind(reg.erp_validated_at)
    .bind(reg.erp_staff_name.as_deref())
    .bind(reg.erp_department.as_deref())
    .bind(reg.erp_exit_date)
    .bind(reg.requires_manual_review)
    .bind(reg.manual_review_reason.as_deref())
    .bind(reg.email_verification_token.as_deref())
    .bind(reg.email_verification_token_expiry)
    .bind(reg.approval_email_sent)
    .bind(reg.approval_email_sent_at)
    .bind(reg.approved_at)
    .bind(reg.updated_at)
    .bind(reg.updated_by.as_deref())
    .bind(reg.id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Persist an entire batch atomically: mutated registrations, audit rows,
/// and email-log rows all commit together or not at all.
///
/// Per-item mutations accumulated in memory before a mid-batch failure are
/// included here rather than written row-by-row; there are no per-item
/// transactions.
pub async fn commit_batch(
    pool: &PgPool,
    registrations: &[&Registration],
    audit_entries: &[NewAuditEntry],
    email_logs: &[NewEmailLogEntry],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for reg in registrations {
        update_registration(&mut *tx, reg).await?;
    }

    for entry in audit_entries {
        audit_queries::insert_audit_entry(&mut *tx, entry).await?;
    }

    for log in email_logs {
        audit_queries::insert_email_log(&mut *tx, log).await?;
    }

    tx.commit().await
}

/// Try to take the cluster-wide job lock on this connection.
/// Returns false when another invocation already holds it.
pub async fn try_acquire_job_lock(conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT pg_try_advisory_lock($1) AS acquired")
        .bind(APPROVAL_JOB_LOCK_KEY)
        .fetch_one(conn)
        .await?;
    row.try_get("acquired")
}

/// Release the job lock taken by `try_acquire_job_lock` on the same connection.
pub async fn release_job_lock(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(APPROVAL_JOB_LOCK_KEY)
        .execute(conn)
        .await?;
    Ok(())
}
