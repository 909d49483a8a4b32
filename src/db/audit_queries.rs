use sqlx::PgConnection;

use crate::models::audit::NewAuditEntry;
use crate::models::email_log::{EmailDeliveryStatus, NewEmailLogEntry};

/// Append an audit row. Audit rows are never updated or deleted.
pub async fn insert_audit_entry(
    conn: &mut PgConnection,
    entry: &NewAuditEntry,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs
            (registration_id, action, performed_by, notes,
             previous_status, new_status, is_automated)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.registration_id)
    .bind(entry.action.to_string())
    .bind(&entry.performed_by)
    .bind(&entry.notes)
    .bind(&entry.previous_status)
    .bind(&entry.new_status)
    .bind(entry.is_automated)
    .execute(conn)
    .await?;

    Ok(())
}

/// Record an outbound email attempt, delivered or not.
pub async fn insert_email_log(
    conn: &mut PgConnection,
    log: &NewEmailLogEntry,
) -> Result<(), sqlx::Error> {
    let status = match log.status {
        EmailDeliveryStatus::Sent => "sent",
        EmailDeliveryStatus::Failed => "failed",
    };

    sqlx::query(
        r#"
        INSERT INTO email_logs (registration_id, recipient, kind, status, error)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(log.registration_id)
    .bind(&log.recipient)
    .bind(&log.kind)
    .bind(status)
    .bind(log.error.as_deref())
    .execute(conn)
    .await?;

    Ok(())
}
