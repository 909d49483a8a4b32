use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use alumni_approval::config::AppConfig;
use alumni_approval::db;
use alumni_approval::schedule;
use alumni_approval::services::approval::{ApprovalJob, ApprovalJobConfig};
use alumni_approval::services::email::MailerClient;
use alumni_approval::services::erp::ErpClient;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting alumni approval worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Expose Prometheus metrics on its own listener
    PrometheusBuilder::new()
        .install()
        .expect("Failed to install Prometheus metrics exporter");

    metrics::describe_counter!(
        "approval_registrations_approved_total",
        "Registrations automatically approved after ERP validation"
    );
    metrics::describe_counter!(
        "approval_registrations_flagged_total",
        "Registrations flagged for manual review"
    );
    metrics::describe_counter!(
        "approval_registrations_retried_total",
        "Registrations left pending with a retry scheduled"
    );
    metrics::describe_counter!(
        "approval_registrations_skipped_total",
        "Registrations skipped because their backoff window has not elapsed"
    );
    metrics::describe_counter!(
        "approval_registrations_errors_total",
        "Per-item processing errors (ERP transport failures)"
    );
    metrics::describe_histogram!(
        "approval_batch_seconds",
        "Wall-clock time to process one approval batch"
    );

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");

    // Initialize collaborators
    tracing::info!("Initializing ERP and mail clients");
    let erp = ErpClient::new(&config.erp_base_url, &config.erp_api_token)
        .expect("Failed to initialize ERP client");

    let mailer = MailerClient::new(&config.mail_api_url, &config.mail_api_token, &config.mail_from)
        .expect("Failed to initialize mail client");

    let job = ApprovalJob::new(
        erp,
        mailer,
        ApprovalJobConfig {
            batch_size: config.batch_size,
            max_retry_attempts: config.max_retry_attempts,
            retry_delay_minutes: config.retry_delay_minutes,
            portal_base_url: config.portal_base_url.clone(),
        },
    );

    tracing::info!(
        batch_size = config.batch_size,
        max_retry_attempts = config.max_retry_attempts,
        retry_delay_minutes = config.retry_delay_minutes,
        "Worker ready, starting approval polling loop"
    );

    // Scheduler loop: job failures are logged and the next tick retries.
    loop {
        if let Err(e) = job.process_pending(&db_pool).await {
            tracing::error!(error = %e, "Approval batch failed, will retry next tick");
        }

        let interval = schedule::next_poll_interval(&config, chrono::Utc::now());
        tracing::debug!(sleep_secs = interval.as_secs(), "Sleeping until next poll");
        sleep(interval).await;
    }
}
