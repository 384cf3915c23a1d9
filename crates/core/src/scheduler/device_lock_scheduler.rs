use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use tokio::sync::Notify;

use super::model::{
    BackoffPolicy, EnqueueOutcome, ExistingWorkPolicy, WorkName, WorkPayload, WorkRequest,
};
use super::queue::WorkQueue;
use crate::config::SchedulerConfig;
use crate::device_state::FinalizationState;
use crate::errors::Result;
use crate::parameters::GlobalParameters;
use crate::platform::Clock;
use crate::provision::{DeviceProvisionState, PauseReason, ProvisionFailureReason, ProvisionState};

/// Turns provisioning decisions into durable named work.
#[derive(Clone)]
pub struct DeviceLockScheduler {
    queue: Arc<dyn WorkQueue>,
    params: GlobalParameters,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    wake: Arc<Notify>,
}

impl DeviceLockScheduler {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        params: GlobalParameters,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            queue,
            params,
            clock,
            config,
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn queue(&self) -> Arc<dyn WorkQueue> {
        self.queue.clone()
    }

    /// Signalled whenever new work is armed so the work loop can re-check.
    pub fn wake_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    async fn enqueue(
        &self,
        name: WorkName,
        payload: WorkPayload,
        initial_delay: Duration,
        backoff: BackoffPolicy,
        policy: ExistingWorkPolicy,
    ) -> Result<EnqueueOutcome> {
        let now = self.clock.now();
        let outcome = self
            .queue
            .enqueue(
                WorkRequest {
                    name,
                    payload,
                    initial_delay,
                    backoff,
                },
                now,
                policy,
            )
            .await?;
        match &outcome {
            EnqueueOutcome::Enqueued(item) => {
                debug!("[Scheduler] Armed {} for {}", name, item.run_at.to_rfc3339());
                self.wake.notify_one();
            }
            EnqueueOutcome::Kept(item) => {
                debug!(
                    "[Scheduler] Kept pending {} for {}",
                    name,
                    item.run_at.to_rfc3339()
                );
            }
        }
        Ok(outcome)
    }

    fn check_in_backoff(&self) -> BackoffPolicy {
        BackoffPolicy::linear(self.config.check_in_backoff)
    }

    fn report_backoff(&self) -> BackoffPolicy {
        BackoffPolicy::exponential(self.config.report_backoff)
    }

    /// First check-in after boot. Returns `false` when check-in is disabled.
    pub async fn schedule_initial_check_in(&self) -> Result<bool> {
        if self.params.check_in_disabled().await? {
            debug!("[Scheduler] Check-in disabled, not arming initial check-in");
            return Ok(false);
        }
        self.enqueue(
            WorkName::CheckIn,
            WorkPayload::Empty,
            Duration::zero(),
            self.check_in_backoff(),
            ExistingWorkPolicy::Keep,
        )
        .await?;
        Ok(true)
    }

    /// Supersedes any pending check-in.
    pub async fn schedule_retry_check_in(&self, delay: Duration) -> Result<bool> {
        if self.params.check_in_disabled().await? {
            debug!("[Scheduler] Check-in disabled, dropping retry");
            return Ok(false);
        }
        self.enqueue(
            WorkName::CheckIn,
            WorkPayload::Empty,
            delay.max(Duration::zero()),
            self.check_in_backoff(),
            ExistingWorkPolicy::Replace,
        )
        .await?;
        Ok(true)
    }

    pub async fn cancel_check_in(&self) -> Result<bool> {
        self.queue.cancel(WorkName::CheckIn).await
    }

    pub async fn schedule_report_provision_state(
        &self,
        is_successful: bool,
        failure_reason: Option<ProvisionFailureReason>,
    ) -> Result<()> {
        self.enqueue(
            WorkName::ReportProvisionState,
            WorkPayload::ProvisionReport {
                is_successful,
                failure_reason,
            },
            Duration::zero(),
            self.report_backoff(),
            ExistingWorkPolicy::Replace,
        )
        .await
        .map(|_| ())
    }

    pub async fn schedule_review_provision_state(&self, policy: ExistingWorkPolicy) -> Result<()> {
        self.enqueue(
            WorkName::ReviewProvisionState,
            WorkPayload::Empty,
            self.config.review_interval,
            self.report_backoff(),
            policy,
        )
        .await
        .map(|_| ())
    }

    pub async fn schedule_reset_device(&self, delay: Duration) -> Result<DateTime<Utc>> {
        let outcome = self
            .enqueue(
                WorkName::ResetDevice,
                WorkPayload::Empty,
                delay,
                self.report_backoff(),
                ExistingWorkPolicy::Replace,
            )
            .await?;
        info!(
            "[Scheduler] Device reset armed for {}",
            outcome.item().run_at.to_rfc3339()
        );
        Ok(outcome.item().run_at)
    }

    pub async fn schedule_next_failed_step(&self) -> Result<()> {
        self.enqueue(
            WorkName::NextFailedStep,
            WorkPayload::Empty,
            self.config.next_failed_step_delay,
            self.report_backoff(),
            ExistingWorkPolicy::Replace,
        )
        .await
        .map(|_| ())
    }

    /// Returns when provisioning will resume.
    pub async fn schedule_resume_provision(&self) -> Result<DateTime<Utc>> {
        let outcome = self
            .enqueue(
                WorkName::ResumeProvision,
                WorkPayload::Empty,
                self.config.resume_provision_delay,
                self.report_backoff(),
                ExistingWorkPolicy::Replace,
            )
            .await?;
        Ok(outcome.item().run_at)
    }

    pub async fn schedule_pause_report(&self, reason: PauseReason) -> Result<()> {
        self.enqueue(
            WorkName::PauseProvision,
            WorkPayload::Pause { reason },
            Duration::zero(),
            self.report_backoff(),
            ExistingWorkPolicy::Replace,
        )
        .await
        .map(|_| ())
    }

    pub async fn schedule_fcm_token_update(&self, token: &str) -> Result<()> {
        self.enqueue(
            WorkName::UpdateFcmToken,
            WorkPayload::FcmToken {
                token: token.to_string(),
            },
            Duration::zero(),
            self.report_backoff(),
            ExistingWorkPolicy::Replace,
        )
        .await
        .map(|_| ())
    }

    pub async fn schedule_program_complete_report(&self) -> Result<()> {
        self.enqueue(
            WorkName::ReportProgramComplete,
            WorkPayload::Empty,
            Duration::zero(),
            self.report_backoff(),
            ExistingWorkPolicy::Keep,
        )
        .await
        .map(|_| ())
    }

    pub async fn schedule_setup_wizard_timeout(&self) -> Result<()> {
        self.enqueue(
            WorkName::SetupWizardTimeout,
            WorkPayload::Empty,
            self.config.setup_wizard_timeout,
            self.report_backoff(),
            ExistingWorkPolicy::Keep,
        )
        .await
        .map(|_| ())
    }

    pub async fn cancel_setup_wizard_timeout(&self) -> Result<bool> {
        self.queue.cancel(WorkName::SetupWizardTimeout).await
    }

    pub async fn has_recovery_alarms(&self) -> Result<bool> {
        for name in WorkName::RECOVERY_ALARMS {
            if self.queue.get(name).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Drops every alarm that only matters while provisioning is unfinished.
    pub async fn cancel_recovery_work(&self) -> Result<()> {
        for name in WorkName::RECOVERY_ALARMS {
            self.queue.cancel(name).await?;
        }
        self.queue.cancel(WorkName::ReviewProvisionState).await?;
        self.queue.cancel(WorkName::SetupWizardTimeout).await?;
        Ok(())
    }

    /// Re-arms whatever the persisted state implies. Existing items are kept so
    /// a reboot never postpones an alarm.
    pub async fn on_boot_completed(&self) -> Result<()> {
        let state = self.params.provision_state().await?;
        info!("[Scheduler] Boot completed in state {}", state);

        if !state.is_succeeded() {
            self.schedule_review_provision_state(ExistingWorkPolicy::Keep)
                .await?;
        }

        let provision_ready = self.params.provision_ready().await?;
        if state == ProvisionState::Unprovisioned && provision_ready != Some(true) {
            self.schedule_initial_check_in().await?;
        }

        match state {
            ProvisionState::ProvisionPaused => {
                self.enqueue(
                    WorkName::ResumeProvision,
                    WorkPayload::Empty,
                    self.config.resume_provision_delay,
                    self.report_backoff(),
                    ExistingWorkPolicy::Keep,
                )
                .await?;
            }
            ProvisionState::ProvisionFailed => {
                let last = self.params.last_received_provision_state().await?;
                if last == Some(DeviceProvisionState::FactoryReset) {
                    let days = self.params.days_left_until_reset().await?.unwrap_or(0);
                    self.enqueue(
                        WorkName::ResetDevice,
                        WorkPayload::Empty,
                        self.config.reset_countdown(days),
                        self.report_backoff(),
                        ExistingWorkPolicy::Keep,
                    )
                    .await?;
                } else {
                    self.enqueue(
                        WorkName::NextFailedStep,
                        WorkPayload::Empty,
                        self.config.next_failed_step_delay,
                        self.report_backoff(),
                        ExistingWorkPolicy::Keep,
                    )
                    .await?;
                }
            }
            _ => {}
        }

        if state == ProvisionState::Unprovisioned
            && provision_ready == Some(true)
            && !self.params.setup_wizard_completed().await?
            && !self.params.setup_wizard_timed_out().await?
        {
            self.schedule_setup_wizard_timeout().await?;
        }

        if self.params.finalization_state().await? == FinalizationState::FinalizedUnreported {
            self.schedule_program_complete_report().await?;
        }

        self.wake.notify_one();
        Ok(())
    }

    /// Wall clock moved by `delta`; shift pending work and the provisioning
    /// start time so remaining durations and elapsed time are preserved.
    pub async fn on_time_changed(&self, delta: Duration) -> Result<usize> {
        let shifted = self.queue.shift_all(delta).await?;
        if let Some(started) = self.params.provisioning_start_time().await? {
            self.params.set_provisioning_start_time(started + delta).await?;
        }
        info!(
            "[Scheduler] Clock moved by {}s, shifted {} pending item(s)",
            delta.num_seconds(),
            shifted
        );
        self.wake.notify_one();
        Ok(shifted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;

    #[tokio::test]
    async fn retry_check_in_replaces_pending_item() {
        let harness = Harness::new();
        let scheduler = harness.scheduler();
        scheduler.schedule_initial_check_in().await.unwrap();
        let first = harness.queue.get(WorkName::CheckIn).await.unwrap().unwrap();

        scheduler
            .schedule_retry_check_in(Duration::days(30))
            .await
            .unwrap();

        let pending = harness.queue.list_pending().await.unwrap();
        let check_ins: Vec<_> = pending
            .iter()
            .filter(|item| item.name == WorkName::CheckIn)
            .collect();
        assert_eq!(check_ins.len(), 1);
        assert_ne!(check_ins[0].id, first.id);
        assert_eq!(check_ins[0].run_at, harness.clock.now() + Duration::days(30));
    }

    #[tokio::test]
    async fn check_in_is_never_armed_while_disabled() {
        let harness = Harness::new();
        harness.global.disable_check_in().await.unwrap();
        let scheduler = harness.scheduler();

        assert!(!scheduler.schedule_initial_check_in().await.unwrap());
        assert!(!scheduler
            .schedule_retry_check_in(Duration::hours(1))
            .await
            .unwrap());
        assert!(harness.queue.get(WorkName::CheckIn).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn boot_in_failed_state_with_reset_directive_rearms_reset() {
        let harness = Harness::new();
        harness
            .global
            .set_provision_state(ProvisionState::ProvisionFailed)
            .await
            .unwrap();
        harness
            .global
            .set_last_received_provision_state(DeviceProvisionState::FactoryReset)
            .await
            .unwrap();
        harness.global.set_days_left_until_reset(2).await.unwrap();

        harness.scheduler().on_boot_completed().await.unwrap();

        let reset = harness
            .queue
            .get(WorkName::ResetDevice)
            .await
            .unwrap()
            .expect("reset alarm");
        assert_eq!(reset.run_at, harness.clock.now() + Duration::days(2));
        assert!(harness
            .queue
            .get(WorkName::ReviewProvisionState)
            .await
            .unwrap()
            .is_some());
        assert!(harness.queue.get(WorkName::CheckIn).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn boot_keeps_existing_alarm_times() {
        let harness = Harness::new();
        harness
            .global
            .set_provision_state(ProvisionState::ProvisionPaused)
            .await
            .unwrap();
        let scheduler = harness.scheduler();
        let resume_at = scheduler.schedule_resume_provision().await.unwrap();

        harness.clock.advance(Duration::minutes(20));
        scheduler.on_boot_completed().await.unwrap();

        let resume = harness
            .queue
            .get(WorkName::ResumeProvision)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resume.run_at, resume_at);
    }

    #[tokio::test]
    async fn time_change_shifts_pending_work() {
        let harness = Harness::new();
        let scheduler = harness.scheduler();
        scheduler.schedule_next_failed_step().await.unwrap();
        let before = harness
            .queue
            .get(WorkName::NextFailedStep)
            .await
            .unwrap()
            .unwrap();

        let shifted = scheduler
            .on_time_changed(Duration::hours(-3))
            .await
            .unwrap();

        let after = harness
            .queue
            .get(WorkName::NextFailedStep)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shifted, 1);
        assert_eq!(after.run_at, before.run_at - Duration::hours(3));
    }

    #[tokio::test]
    async fn time_change_moves_provisioning_start_time() {
        let harness = Harness::new();
        let scheduler = harness.scheduler();
        let start = harness.clock.now();
        harness
            .global
            .set_provisioning_start_time(start)
            .await
            .unwrap();

        scheduler.on_time_changed(Duration::days(2)).await.unwrap();

        assert_eq!(
            harness.global.provisioning_start_time().await.unwrap(),
            Some(start + Duration::days(2))
        );
    }

    #[tokio::test]
    async fn time_change_without_provisioning_leaves_start_time_unset() {
        let harness = Harness::new();
        harness
            .scheduler()
            .on_time_changed(Duration::hours(5))
            .await
            .unwrap();
        assert_eq!(harness.global.provisioning_start_time().await.unwrap(), None);
    }

    #[tokio::test]
    async fn recovery_alarms_are_detected_and_cancelled() {
        let harness = Harness::new();
        let scheduler = harness.scheduler();
        assert!(!scheduler.has_recovery_alarms().await.unwrap());

        scheduler.schedule_next_failed_step().await.unwrap();
        assert!(scheduler.has_recovery_alarms().await.unwrap());

        scheduler.cancel_recovery_work().await.unwrap();
        assert!(!scheduler.has_recovery_alarms().await.unwrap());
    }
}
