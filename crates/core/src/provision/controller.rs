//! Serialized driver for the provisioning state machine.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use super::model::{ProvisionEvent, ProvisionFailureReason, ProvisionState};
use super::state_machine::{next, SideEffect};
use crate::checkin::{RpcResponse, TransportProvider};
use crate::device_state::DeviceStateController;
use crate::errors::{Error, Result};
use crate::parameters::{GlobalParameters, SetupParameters};
use crate::platform::{Clock, DeviceIdentity, NotificationSink, ProvisioningUi};
use crate::scheduler::{DeviceLockScheduler, ExistingWorkPolicy, WorkName};

/// Single update path for `ProvisionState`.
///
/// Every event is applied under one async lock: the new state is committed
/// before its side effects run, and follow-up events raised by side effects
/// are applied in order before the lock is released.
pub struct ProvisionStateController {
    params: GlobalParameters,
    setup: SetupParameters,
    scheduler: DeviceLockScheduler,
    device_state: DeviceStateController,
    transports: Arc<dyn TransportProvider>,
    identity: Arc<dyn DeviceIdentity>,
    ui: Arc<dyn ProvisioningUi>,
    notifications: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    transition_lock: Mutex<()>,
}

impl ProvisionStateController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: GlobalParameters,
        setup: SetupParameters,
        scheduler: DeviceLockScheduler,
        device_state: DeviceStateController,
        transports: Arc<dyn TransportProvider>,
        identity: Arc<dyn DeviceIdentity>,
        ui: Arc<dyn ProvisioningUi>,
        notifications: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            params,
            setup,
            scheduler,
            device_state,
            transports,
            identity,
            ui,
            notifications,
            clock,
            transition_lock: Mutex::new(()),
        }
    }

    pub async fn current_state(&self) -> Result<ProvisionState> {
        self.params.provision_state().await
    }

    /// Applies `event` and returns the resulting state.
    pub async fn post_event(&self, event: ProvisionEvent) -> Result<ProvisionState> {
        let _guard = self.transition_lock.lock().await;
        self.apply_locked(event).await
    }

    /// Applies `event` only if the state is still `expected` once the lock is
    /// held. Returns `None` when the event was skipped.
    pub async fn post_event_when(
        &self,
        event: ProvisionEvent,
        expected: ProvisionState,
    ) -> Result<Option<ProvisionState>> {
        let _guard = self.transition_lock.lock().await;
        let current = self.params.provision_state().await?;
        if current != expected {
            debug!(
                "[Provision] Skipping {}: state is {}, expected {}",
                event, current, expected
            );
            return Ok(None);
        }
        self.apply_locked(event).await.map(Some)
    }

    /// Fires `PROVISION_READY` once a payload is cached and either provisioning
    /// is mandatory or the setup flow is out of the way.
    pub async fn try_begin_provisioning(&self) -> Result<Option<ProvisionState>> {
        if self.params.provision_ready().await? != Some(true) {
            return Ok(None);
        }
        let forced = self.params.provision_forced().await?.unwrap_or(false);
        let setup_done = self.params.setup_wizard_completed().await?
            || self.params.setup_wizard_timed_out().await?;
        if !forced && !setup_done {
            debug!("[Provision] Waiting for setup wizard before provisioning");
            return Ok(None);
        }

        self.scheduler.cancel_setup_wizard_timeout().await?;
        self.post_event_when(ProvisionEvent::ProvisionReady, ProvisionState::Unprovisioned)
            .await
    }

    async fn apply_locked(&self, event: ProvisionEvent) -> Result<ProvisionState> {
        let mut state = self.params.provision_state().await?;
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let transition = next(state, event).inspect_err(|err| {
                error!("[Provision] {}", err);
            })?;

            self.params.set_provision_state(transition.to).await?;
            info!(
                "[Provision] {} + {} -> {}",
                transition.from, transition.event, transition.to
            );
            state = transition.to;

            for effect in transition.effects {
                match self.apply_effect(effect).await {
                    Ok(Some(follow_up)) => pending.push_back(follow_up),
                    Ok(None) => {}
                    Err(err) if err.is_unrecoverable() => return Err(err),
                    Err(err) => {
                        warn!("[Provision] Side effect {:?} failed: {}", effect, err);
                    }
                }
            }
        }

        Ok(state)
    }

    async fn apply_effect(&self, effect: SideEffect) -> Result<Option<ProvisionEvent>> {
        match effect {
            SideEffect::RecordProvisioningStart => {
                self.params
                    .set_provisioning_start_time(self.clock.now())
                    .await?;
            }
            SideEffect::StartProvisioningFlow => return self.start_provisioning_flow().await,
            SideEffect::RecordFailureReason(reason) => {
                self.params.set_last_failure_reason(reason).await?;
            }
            SideEffect::ReportProvisionState {
                successful,
                failure_reason,
            } => {
                self.scheduler
                    .schedule_report_provision_state(successful, failure_reason)
                    .await?;
            }
            SideEffect::ReportPause(reason) => {
                self.scheduler.schedule_pause_report(reason).await?;
            }
            SideEffect::ArmResumeAlarm => {
                self.scheduler.schedule_resume_provision().await?;
            }
            SideEffect::ArmNextFailedStepAlarm => {
                self.scheduler.schedule_next_failed_step().await?;
            }
            SideEffect::CancelRecoveryWork => {
                self.scheduler.cancel_recovery_work().await?;
            }
            SideEffect::EnforcePolicies => {
                self.device_state.on_provisioned().await?;
            }
            SideEffect::ShowDeferredNotification => {
                let resume_at = match self
                    .scheduler
                    .queue()
                    .get(WorkName::ResumeProvision)
                    .await?
                {
                    Some(item) => item.run_at,
                    None => self.clock.now() + self.scheduler.config().resume_provision_delay,
                };
                self.notifications
                    .show_deferred_provisioning(resume_at)
                    .await?;
            }
            SideEffect::CancelNotification => {
                self.notifications.cancel().await?;
            }
        }
        Ok(None)
    }

    /// Verifies eligibility and launches the kiosk flow. Problems surface as
    /// a follow-up failure event rather than an error.
    async fn start_provisioning_flow(&self) -> Result<Option<ProvisionEvent>> {
        let configuration = self.setup.configuration().await?.ok_or_else(|| {
            Error::invalid_state("Provisioning started without a setup configuration")
        })?;

        self.scheduler
            .schedule_review_provision_state(ExistingWorkPolicy::Keep)
            .await?;

        if self.params.device_in_approved_country().await? != Some(true) {
            let carrier = self.identity.carrier_mccmnc().await?;
            let transport = self.transports.check_in().await?;
            match transport
                .is_device_in_approved_country(carrier.as_deref())
                .await?
            {
                RpcResponse::Success(true) => {
                    self.params.set_device_in_approved_country(true).await?;
                }
                RpcResponse::Success(false) => {
                    info!("[Provision] Device is not in an approved country");
                    self.params.set_device_in_approved_country(false).await?;
                    return Ok(Some(ProvisionEvent::ProvisionFailure(
                        ProvisionFailureReason::NotInEligibleCountry,
                    )));
                }
                response => {
                    warn!(
                        "[Provision] Country check failed: {}",
                        response.error_message().unwrap_or_default()
                    );
                    return Ok(Some(ProvisionEvent::ProvisionFailure(
                        ProvisionFailureReason::CountryInfoUnavailable,
                    )));
                }
            }
        }

        if let Err(err) = self.ui.start_provisioning(&configuration).await {
            warn!("[Provision] Could not start provisioning flow: {}", err);
            return Ok(Some(ProvisionEvent::ProvisionFailure(
                ProvisionFailureReason::UnknownReason,
            )));
        }
        info!(
            "[Provision] Provisioning flow started for {}",
            configuration.kiosk_app_package
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::WorkQueue;
    use crate::scheduler::WorkPayload;
    use crate::test_support::{Harness, NotificationEvent};
    use chrono::Duration;

    async fn ready_harness() -> Harness {
        let harness = Harness::new();
        harness.cache_ready_payload(false).await;
        harness
    }

    #[tokio::test]
    async fn ready_records_start_and_launches_flow() {
        let harness = ready_harness().await;
        let provision = harness.provision();

        let state = provision
            .post_event(ProvisionEvent::ProvisionReady)
            .await
            .unwrap();

        assert_eq!(state, ProvisionState::ProvisionInProgress);
        assert_eq!(
            harness.global.provisioning_start_time().await.unwrap(),
            Some(harness.clock.now())
        );
        assert_eq!(harness.ui.started().len(), 1);
        assert!(harness
            .queue
            .get(WorkName::ReviewProvisionState)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn ineligible_country_fails_within_same_post() {
        let harness = ready_harness().await;
        harness.transport.set_approved_country(RpcResponse::Success(false));

        let state = harness
            .provision()
            .post_event(ProvisionEvent::ProvisionReady)
            .await
            .unwrap();

        assert_eq!(state, ProvisionState::ProvisionFailed);
        assert_eq!(
            harness.global.last_failure_reason().await.unwrap(),
            Some(ProvisionFailureReason::NotInEligibleCountry)
        );
        assert!(harness.ui.started().is_empty());
        let report = harness
            .queue
            .get(WorkName::ReportProvisionState)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            report.payload,
            WorkPayload::ProvisionReport {
                is_successful: false,
                failure_reason: Some(ProvisionFailureReason::NotInEligibleCountry),
            }
        );
        assert!(harness
            .queue
            .get(WorkName::NextFailedStep)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn unreachable_country_service_maps_to_country_info_unavailable() {
        let harness = ready_harness().await;
        harness
            .transport
            .set_approved_country(RpcResponse::RecoverableError("unavailable".into()));

        let state = harness
            .provision()
            .post_event(ProvisionEvent::ProvisionReady)
            .await
            .unwrap();

        assert_eq!(state, ProvisionState::ProvisionFailed);
        assert_eq!(
            harness.global.last_failure_reason().await.unwrap(),
            Some(ProvisionFailureReason::CountryInfoUnavailable)
        );
    }

    #[tokio::test]
    async fn ui_failure_becomes_unknown_reason_failure() {
        let harness = ready_harness().await;
        harness.ui.fail_next();

        let state = harness
            .provision()
            .post_event(ProvisionEvent::ProvisionReady)
            .await
            .unwrap();

        assert_eq!(state, ProvisionState::ProvisionFailed);
        assert_eq!(
            harness.global.last_failure_reason().await.unwrap(),
            Some(ProvisionFailureReason::UnknownReason)
        );
    }

    #[tokio::test]
    async fn pause_arms_resume_and_shows_deferred_notification() {
        let harness = ready_harness().await;
        let provision = harness.provision();
        provision
            .post_event(ProvisionEvent::ProvisionReady)
            .await
            .unwrap();

        let state = provision
            .post_event(ProvisionEvent::ProvisionPause)
            .await
            .unwrap();

        assert_eq!(state, ProvisionState::ProvisionPaused);
        let resume = harness
            .queue
            .get(WorkName::ResumeProvision)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resume.run_at, harness.clock.now() + Duration::hours(1));
        assert!(harness
            .notifications
            .events()
            .contains(&NotificationEvent::Deferred(resume.run_at)));
        assert!(harness
            .queue
            .get(WorkName::PauseProvision)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn success_cancels_recovery_and_unlocks() {
        let harness = ready_harness().await;
        let provision = harness.provision();
        provision
            .post_event(ProvisionEvent::ProvisionReady)
            .await
            .unwrap();
        provision
            .post_event(ProvisionEvent::ProvisionFailure(
                ProvisionFailureReason::PlayInstallationFailed,
            ))
            .await
            .unwrap();
        assert!(harness.scheduler().has_recovery_alarms().await.unwrap());

        let state = provision
            .post_event(ProvisionEvent::ProvisionSuccess)
            .await
            .unwrap();

        assert_eq!(state, ProvisionState::ProvisionSucceeded);
        assert!(!harness.scheduler().has_recovery_alarms().await.unwrap());
        assert!(harness
            .queue
            .get(WorkName::ReviewProvisionState)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            harness.policy.enforced().last().map(|p| p.device_state),
            Some(crate::device_state::DeviceState::Unlocked)
        );
    }

    #[tokio::test]
    async fn undefined_transition_leaves_state_untouched() {
        let harness = Harness::new();
        let err = harness
            .provision()
            .post_event(ProvisionEvent::ProvisionKiosk)
            .await
            .unwrap_err();
        assert!(err.is_unrecoverable());
        assert_eq!(
            harness.global.provision_state().await.unwrap(),
            ProvisionState::Unprovisioned
        );
    }

    #[tokio::test]
    async fn post_event_when_skips_stale_events() {
        let harness = Harness::new();
        let skipped = harness
            .provision()
            .post_event_when(ProvisionEvent::ProvisionResume, ProvisionState::ProvisionPaused)
            .await
            .unwrap();
        assert_eq!(skipped, None);
    }

    #[tokio::test]
    async fn begin_provisioning_waits_for_setup_wizard_unless_forced() {
        let harness = Harness::new();
        harness.cache_ready_payload(false).await;
        let provision = harness.provision();
        assert_eq!(provision.try_begin_provisioning().await.unwrap(), None);

        harness.global.set_setup_wizard_timed_out(true).await.unwrap();
        assert_eq!(
            provision.try_begin_provisioning().await.unwrap(),
            Some(ProvisionState::ProvisionInProgress)
        );

        let forced = Harness::new();
        forced.cache_ready_payload(true).await;
        assert_eq!(
            forced.provision().try_begin_provisioning().await.unwrap(),
            Some(ProvisionState::ProvisionInProgress)
        );
    }

    #[tokio::test]
    async fn concurrent_events_are_serialized() {
        let harness = ready_harness().await;
        let provision = harness.provision();
        provision
            .post_event(ProvisionEvent::ProvisionReady)
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            provision.post_event_when(
                ProvisionEvent::ProvisionFailure(ProvisionFailureReason::DeadlinePassed),
                ProvisionState::ProvisionInProgress,
            ),
            provision.post_event_when(
                ProvisionEvent::ProvisionFailure(ProvisionFailureReason::DeadlinePassed),
                ProvisionState::ProvisionInProgress,
            ),
        );
        let applied = [a.unwrap(), b.unwrap()]
            .into_iter()
            .filter(Option::is_some)
            .count();
        assert_eq!(applied, 1);
    }
}
