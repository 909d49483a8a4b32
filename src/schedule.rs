//! Poll cadence selection.
//!
//! The job polls more aggressively during Nairobi business hours, when new
//! registrations arrive and admins are watching the queue, and backs off
//! overnight and on weekends. Kenya has no daylight saving, so local time is
//! a fixed offset from UTC.

use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};

use crate::config::AppConfig;

/// Pick how long to sleep before the next poll, given the current time.
pub fn next_poll_interval(config: &AppConfig, now: DateTime<Utc>) -> Duration {
    if !config.smart_scheduling_enabled {
        return Duration::from_secs(config.business_hours_interval_secs);
    }

    let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
    let local = now.with_timezone(&offset);

    let secs = if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        config.weekend_interval_secs
    } else if (config.business_hours_start..config.business_hours_end).contains(&local.hour()) {
        config.business_hours_interval_secs
    } else {
        config.off_hours_interval_secs
    };

    Duration::from_secs(secs)
}
