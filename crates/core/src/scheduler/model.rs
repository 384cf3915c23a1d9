use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MAX_BACKOFF_SECS;
use crate::provision::{PauseReason, ProvisionFailureReason};

/// Stable name of a unit of work. At most one item per name is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkName {
    CheckIn,
    ReportProvisionState,
    ReviewProvisionState,
    ResetDevice,
    NextFailedStep,
    ResumeProvision,
    PauseProvision,
    UpdateFcmToken,
    ReportProgramComplete,
    SetupWizardTimeout,
}

impl WorkName {
    pub const ALL: [WorkName; 10] = [
        WorkName::CheckIn,
        WorkName::ReportProvisionState,
        WorkName::ReviewProvisionState,
        WorkName::ResetDevice,
        WorkName::NextFailedStep,
        WorkName::ResumeProvision,
        WorkName::PauseProvision,
        WorkName::UpdateFcmToken,
        WorkName::ReportProgramComplete,
        WorkName::SetupWizardTimeout,
    ];

    /// Alarms whose presence means provisioning recovery is still underway.
    pub const RECOVERY_ALARMS: [WorkName; 3] = [
        WorkName::ResetDevice,
        WorkName::NextFailedStep,
        WorkName::ResumeProvision,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkName::CheckIn => "check-in",
            WorkName::ReportProvisionState => "report-provision-state",
            WorkName::ReviewProvisionState => "review-provision-state",
            WorkName::ResetDevice => "reset-device",
            WorkName::NextFailedStep => "next-failed-step",
            WorkName::ResumeProvision => "resume-provision",
            WorkName::PauseProvision => "pause-provision",
            WorkName::UpdateFcmToken => "update-fcm-token",
            WorkName::ReportProgramComplete => "report-program-complete",
            WorkName::SetupWizardTimeout => "setup-wizard-timeout",
        }
    }

    pub fn parse(value: &str) -> Option<WorkName> {
        WorkName::ALL.into_iter().find(|name| name.as_str() == value)
    }
}

impl std::fmt::Display for WorkName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input data carried by a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkPayload {
    #[default]
    Empty,
    ProvisionReport {
        is_successful: bool,
        failure_reason: Option<ProvisionFailureReason>,
    },
    Pause {
        reason: PauseReason,
    },
    FcmToken {
        token: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    Linear { base_secs: i64 },
    /// Doubles per attempt, capped at five hours.
    Exponential { base_secs: i64 },
}

impl BackoffPolicy {
    pub fn linear(base: Duration) -> Self {
        BackoffPolicy::Linear {
            base_secs: base.num_seconds(),
        }
    }

    pub fn exponential(base: Duration) -> Self {
        BackoffPolicy::Exponential {
            base_secs: base.num_seconds(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BackoffPolicy::Linear { .. } => "linear",
            BackoffPolicy::Exponential { .. } => "exponential",
        }
    }

    pub fn base_secs(&self) -> i64 {
        match self {
            BackoffPolicy::Linear { base_secs } | BackoffPolicy::Exponential { base_secs } => {
                *base_secs
            }
        }
    }

    pub fn from_parts(kind: &str, base_secs: i64) -> Option<Self> {
        match kind {
            "linear" => Some(BackoffPolicy::Linear { base_secs }),
            "exponential" => Some(BackoffPolicy::Exponential { base_secs }),
            _ => None,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: i32) -> Duration {
        let attempt = i64::from(attempt.max(1));
        match self {
            BackoffPolicy::Linear { base_secs } => {
                Duration::seconds(base_secs.saturating_mul(attempt))
            }
            BackoffPolicy::Exponential { base_secs } => {
                let exponent = (attempt - 1).min(30) as u32;
                let secs = base_secs
                    .saturating_mul(2_i64.saturating_pow(exponent))
                    .min(MAX_BACKOFF_SECS);
                Duration::seconds(secs)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkRequest {
    pub name: WorkName,
    pub payload: WorkPayload,
    pub initial_delay: Duration,
    pub backoff: BackoffPolicy,
}

/// Pending durable work. `id` identifies the generation: replacing a named
/// item gives it a new id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: String,
    pub name: WorkName,
    pub payload: WorkPayload,
    pub run_at: DateTime<Utc>,
    pub backoff: BackoffPolicy,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn from_request(request: WorkRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name,
            payload: request.payload,
            run_at: now + request.initial_delay,
            backoff: request.backoff,
            attempts: 0,
            created_at: now,
        }
    }
}

/// What to do when an item with the same name is already pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingWorkPolicy {
    Replace,
    Keep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued(WorkItem),
    /// The pending item was kept; the request was dropped.
    Kept(WorkItem),
}

impl EnqueueOutcome {
    pub fn item(&self) -> &WorkItem {
        match self {
            EnqueueOutcome::Enqueued(item) | EnqueueOutcome::Kept(item) => item,
        }
    }
}
