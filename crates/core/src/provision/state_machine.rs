//! Pure transition function for the provisioning state machine.
//!
//! `next` has no I/O: it maps a (state, event) pair to the new state plus the
//! ordered side effects the controller must run after the new state has been
//! committed. Undefined pairs are contract violations and surface as
//! [`Error::InvalidTransition`].

use crate::errors::{Error, Result};

use super::model::{PauseReason, ProvisionEvent, ProvisionFailureReason, ProvisionState};

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideEffect {
    /// Remember when provisioning first started (watchdog input).
    RecordProvisioningStart,
    /// Verify eligibility and hand the configuration to the provisioning flow.
    StartProvisioningFlow,
    RecordFailureReason(ProvisionFailureReason),
    /// Durable fire-and-forget report to the backend.
    ReportProvisionState {
        successful: bool,
        failure_reason: Option<ProvisionFailureReason>,
    },
    ReportPause(PauseReason),
    ArmResumeAlarm,
    ArmNextFailedStepAlarm,
    CancelRecoveryWork,
    EnforcePolicies,
    ShowDeferredNotification,
    CancelNotification,
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: ProvisionState,
    pub event: ProvisionEvent,
    pub to: ProvisionState,
    pub effects: Vec<SideEffect>,
}

fn failure_effects(reason: ProvisionFailureReason) -> Vec<SideEffect> {
    vec![
        SideEffect::RecordFailureReason(reason),
        SideEffect::ReportProvisionState {
            successful: false,
            failure_reason: Some(reason),
        },
        SideEffect::ArmNextFailedStepAlarm,
    ]
}

fn success_effects() -> Vec<SideEffect> {
    vec![
        SideEffect::CancelRecoveryWork,
        SideEffect::ReportProvisionState {
            successful: true,
            failure_reason: None,
        },
        SideEffect::EnforcePolicies,
    ]
}

/// Compute the transition for `event` in `current`.
pub fn next(current: ProvisionState, event: ProvisionEvent) -> Result<Transition> {
    use ProvisionEvent as E;
    use ProvisionState as S;

    let (to, effects) = match (current, event) {
        (S::Unprovisioned, E::ProvisionReady) => (
            S::ProvisionInProgress,
            vec![
                SideEffect::RecordProvisioningStart,
                SideEffect::StartProvisioningFlow,
            ],
        ),
        (S::ProvisionInProgress, E::ProvisionPause) => (
            S::ProvisionPaused,
            vec![
                SideEffect::ReportPause(PauseReason::UserDeferredDeviceProvisioning),
                SideEffect::ArmResumeAlarm,
                SideEffect::ShowDeferredNotification,
            ],
        ),
        (S::ProvisionPaused, E::ProvisionResume) => (
            S::ProvisionInProgress,
            vec![
                SideEffect::CancelNotification,
                SideEffect::StartProvisioningFlow,
            ],
        ),
        (S::ProvisionInProgress | S::ProvisionPaused, E::ProvisionFailure(reason)) => {
            (S::ProvisionFailed, failure_effects(reason))
        }
        (S::ProvisionInProgress | S::ProvisionFailed, E::ProvisionSuccess) => {
            (S::ProvisionSucceeded, success_effects())
        }
        (S::ProvisionFailed, E::ProvisionRetry) => (
            S::ProvisionInProgress,
            vec![
                SideEffect::CancelNotification,
                SideEffect::StartProvisioningFlow,
            ],
        ),
        (S::ProvisionSucceeded, E::ProvisionKiosk) => (
            S::KioskProvisioned,
            vec![SideEffect::EnforcePolicies, SideEffect::CancelNotification],
        ),
        (state, event) => return Err(Error::InvalidTransition { state, event }),
    };

    Ok(Transition {
        from: current,
        event,
        to,
        effects,
    })
}
