use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// ERP (HR system) base URL, e.g. "https://erp.kenya-airways.com"
    pub erp_base_url: String,

    /// ERP API bearer token
    pub erp_api_token: String,

    /// Mail API base URL
    pub mail_api_url: String,

    /// Mail API bearer token
    pub mail_api_token: String,

    /// From address for outbound mail
    #[serde(default = "default_mail_from")]
    pub mail_from: String,

    /// Alumni portal base URL, used to build verification links
    pub portal_base_url: String,

    /// Maximum registrations processed per invocation
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// ERP validation attempts before a registration is flagged for manual review
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: i32,

    /// Base delay in minutes for the exponential backoff between attempts
    #[serde(default = "default_retry_delay_minutes")]
    pub retry_delay_minutes: i64,

    /// Poll more often during business hours, less off-hours/weekends
    #[serde(default = "default_smart_scheduling")]
    pub smart_scheduling_enabled: bool,

    /// Seconds between polls during business hours
    #[serde(default = "default_business_interval")]
    pub business_hours_interval_secs: u64,

    /// Seconds between polls outside business hours
    #[serde(default = "default_off_hours_interval")]
    pub off_hours_interval_secs: u64,

    /// Seconds between polls on Saturday and Sunday
    #[serde(default = "default_weekend_interval")]
    pub weekend_interval_secs: u64,

    /// Local business hours window (24h clock), inclusive start
    #[serde(default = "default_business_start")]
    pub business_hours_start: u32,

    /// Local business hours window, exclusive end
    #[serde(default = "default_business_end")]
    pub business_hours_end: u32,

    /// Fixed offset from UTC in hours (Nairobi is +3, no DST)
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
}

fn default_mail_from() -> String {
    "alumni@kenya-airways.com".to_string()
}

fn default_batch_size() -> i64 {
    10
}

fn default_max_retry_attempts() -> i32 {
    5
}

fn default_retry_delay_minutes() -> i64 {
    10
}

fn default_smart_scheduling() -> bool {
    true
}

fn default_business_interval() -> u64 {
    120
}

fn default_off_hours_interval() -> u64 {
    600
}

fn default_weekend_interval() -> u64 {
    1800
}

fn default_business_start() -> u32 {
    8
}

fn default_business_end() -> u32 {
    18
}

fn default_utc_offset() -> i32 {
    3
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
