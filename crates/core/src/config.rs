//! Timing knobs for the scheduler and workers.

use chrono::Duration;

/// Per-call deadline applied by every RPC client.
pub const RPC_DEADLINE_SECS: u64 = 10;

/// Upper bound applied to exponential backoff.
pub const MAX_BACKOFF_SECS: i64 = 5 * 60 * 60;

/// Cadence of the background work loop when nothing wakes it earlier.
pub const WORK_LOOP_POLL_INTERVAL_SECS: u64 = 30;

/// Delays and backoff seeds used when arming durable work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Linear backoff seed for failed check-ins.
    pub check_in_backoff: Duration,
    /// Exponential backoff seed for fire-and-forget reports.
    pub report_backoff: Duration,
    pub next_failed_step_delay: Duration,
    pub resume_provision_delay: Duration,
    /// How long to wait on the out-of-box setup flow before provisioning anyway.
    pub setup_wizard_timeout: Duration,
    pub review_interval: Duration,
    /// Elapsed time after which an unfinished provisioning is considered failed.
    pub provisioning_deadline: Duration,
    /// Floor applied to the server's reset countdown.
    pub minimum_reset_countdown: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_in_backoff: Duration::days(1),
            report_backoff: Duration::seconds(30),
            next_failed_step_delay: Duration::days(1),
            resume_provision_delay: Duration::hours(1),
            setup_wizard_timeout: Duration::minutes(60),
            review_interval: Duration::days(1),
            provisioning_deadline: Duration::days(1),
            minimum_reset_countdown: Duration::hours(1),
        }
    }
}

impl SchedulerConfig {
    /// Countdown before a server-directed reset fires: the server's day count,
    /// never shorter than the configured minimum.
    pub fn reset_countdown(&self, days_left_until_reset: i32) -> Duration {
        let requested = Duration::days(i64::from(days_left_until_reset.max(0)));
        requested.max(self.minimum_reset_countdown)
    }
}
