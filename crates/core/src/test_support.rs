//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::checkin::{
    BuildInfo, CheckInRequest, CheckInResponse, CheckInTransport, DeviceId, FcmTokenResult,
    FinalizationReporter, ProvisionReportRequest, ProvisionReportResponse, ProvisioningConfiguration,
    ProvisioningReporter, ProvisioningType, RpcResponse, TransportProvider,
};
use crate::config::SchedulerConfig;
use crate::device_state::DeviceStateController;
use crate::errors::{Error, Result};
use crate::parameters::{GlobalParameters, ParameterScope, ParameterStore, SetupParameters};
use crate::platform::{
    Clock, DeviceIdentity, DevicePolicyController, NotificationSink, PolicySnapshot,
    ProcessControl, ProvisioningUi, WipeReason,
};
use crate::provision::{PauseReason, ProvisionStateController};
use crate::scheduler::{
    DeviceLockScheduler, EnqueueOutcome, ExistingWorkPolicy, WorkItem, WorkName, WorkQueue,
    WorkRequest,
};
use crate::supervisor::FailureSupervisor;
use crate::workers::WorkerContext;

#[derive(Default)]
pub struct MemoryParameterStore {
    values: Mutex<HashMap<(ParameterScope, String), String>>,
}

#[async_trait]
impl ParameterStore for MemoryParameterStore {
    async fn get(&self, scope: ParameterScope, key: &str) -> Result<Option<String>> {
        Ok(self
            .values
            .lock()
            .unwrap()
            .get(&(scope, key.to_string()))
            .cloned())
    }

    async fn set(&self, scope: ParameterScope, key: &str, value: String) -> Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert((scope, key.to_string()), value);
        Ok(())
    }

    async fn remove(&self, scope: ParameterScope, key: &str) -> Result<()> {
        self.values.lock().unwrap().remove(&(scope, key.to_string()));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        scope: ParameterScope,
        key: &str,
        value: String,
    ) -> Result<Option<String>> {
        let mut values = self.values.lock().unwrap();
        let entry = (scope, key.to_string());
        if let Some(existing) = values.get(&entry) {
            return Ok(Some(existing.clone()));
        }
        values.insert(entry, value);
        Ok(None)
    }
}

#[derive(Default)]
pub struct MemoryWorkQueue {
    items: Mutex<BTreeMap<WorkName, WorkItem>>,
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue(
        &self,
        request: WorkRequest,
        now: DateTime<Utc>,
        policy: ExistingWorkPolicy,
    ) -> Result<EnqueueOutcome> {
        let mut items = self.items.lock().unwrap();
        if policy == ExistingWorkPolicy::Keep {
            if let Some(existing) = items.get(&request.name) {
                return Ok(EnqueueOutcome::Kept(existing.clone()));
            }
        }
        let item = WorkItem::from_request(request, now);
        items.insert(item.name, item.clone());
        Ok(EnqueueOutcome::Enqueued(item))
    }

    async fn cancel(&self, name: WorkName) -> Result<bool> {
        Ok(self.items.lock().unwrap().remove(&name).is_some())
    }

    async fn get(&self, name: WorkName) -> Result<Option<WorkItem>> {
        Ok(self.items.lock().unwrap().get(&name).cloned())
    }

    async fn list_pending(&self) -> Result<Vec<WorkItem>> {
        Ok(self.items.lock().unwrap().values().cloned().collect())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<WorkItem>> {
        let mut due: Vec<WorkItem> = self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|item| item.run_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|item| item.run_at);
        Ok(due)
    }

    async fn complete(&self, name: WorkName, id: &str) -> Result<bool> {
        let mut items = self.items.lock().unwrap();
        if items.get(&name).is_some_and(|item| item.id == id) {
            items.remove(&name);
            return Ok(true);
        }
        Ok(false)
    }

    async fn retry(
        &self,
        name: WorkName,
        id: &str,
        run_at: DateTime<Utc>,
        attempts: i32,
    ) -> Result<bool> {
        let mut items = self.items.lock().unwrap();
        match items.get_mut(&name) {
            Some(item) if item.id == id => {
                item.run_at = run_at;
                item.attempts = attempts;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn shift_all(&self, delta: Duration) -> Result<usize> {
        let mut items = self.items.lock().unwrap();
        for item in items.values_mut() {
            item.run_at += delta;
        }
        Ok(items.len())
    }
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Scripted backend. Unscripted calls answer with a recoverable error, except
/// the country check which defaults to approved.
pub struct FakeTransport {
    check_in: Mutex<VecDeque<RpcResponse<CheckInResponse>>>,
    approved_country: Mutex<RpcResponse<bool>>,
    reports: Mutex<VecDeque<RpcResponse<ProvisionReportResponse>>>,
    pauses: Mutex<VecDeque<RpcResponse<()>>>,
    fcm: Mutex<VecDeque<RpcResponse<FcmTokenResult>>>,
    program_complete: Mutex<VecDeque<RpcResponse<()>>>,
    check_in_requests: Mutex<Vec<CheckInRequest>>,
    report_requests: Mutex<Vec<ProvisionReportRequest>>,
    pause_reasons: Mutex<Vec<PauseReason>>,
    fcm_tokens: Mutex<Vec<String>>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self {
            check_in: Mutex::new(VecDeque::new()),
            approved_country: Mutex::new(RpcResponse::Success(true)),
            reports: Mutex::new(VecDeque::new()),
            pauses: Mutex::new(VecDeque::new()),
            fcm: Mutex::new(VecDeque::new()),
            program_complete: Mutex::new(VecDeque::new()),
            check_in_requests: Mutex::new(Vec::new()),
            report_requests: Mutex::new(Vec::new()),
            pause_reasons: Mutex::new(Vec::new()),
            fcm_tokens: Mutex::new(Vec::new()),
        }
    }
}

fn next_scripted<T>(queue: &Mutex<VecDeque<RpcResponse<T>>>) -> RpcResponse<T> {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| RpcResponse::RecoverableError("no scripted response".to_string()))
}

impl FakeTransport {
    pub fn push_check_in(&self, response: RpcResponse<CheckInResponse>) {
        self.check_in.lock().unwrap().push_back(response);
    }

    pub fn set_approved_country(&self, response: RpcResponse<bool>) {
        *self.approved_country.lock().unwrap() = response;
    }

    pub fn push_report(&self, response: RpcResponse<ProvisionReportResponse>) {
        self.reports.lock().unwrap().push_back(response);
    }

    pub fn push_pause(&self, response: RpcResponse<()>) {
        self.pauses.lock().unwrap().push_back(response);
    }

    pub fn push_fcm(&self, response: RpcResponse<FcmTokenResult>) {
        self.fcm.lock().unwrap().push_back(response);
    }

    pub fn push_program_complete(&self, response: RpcResponse<()>) {
        self.program_complete.lock().unwrap().push_back(response);
    }

    pub fn check_in_requests(&self) -> Vec<CheckInRequest> {
        self.check_in_requests.lock().unwrap().clone()
    }

    pub fn report_requests(&self) -> Vec<ProvisionReportRequest> {
        self.report_requests.lock().unwrap().clone()
    }

    pub fn pause_reasons(&self) -> Vec<PauseReason> {
        self.pause_reasons.lock().unwrap().clone()
    }

    pub fn fcm_tokens(&self) -> Vec<String> {
        self.fcm_tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckInTransport for FakeTransport {
    async fn get_check_in_status(
        &self,
        request: &CheckInRequest,
    ) -> Result<RpcResponse<CheckInResponse>> {
        self.check_in_requests.lock().unwrap().push(request.clone());
        Ok(next_scripted(&self.check_in))
    }

    async fn is_device_in_approved_country(
        &self,
        _carrier_mccmnc: Option<&str>,
    ) -> Result<RpcResponse<bool>> {
        Ok(self.approved_country.lock().unwrap().clone())
    }

    async fn pause_provisioning(&self, reason: PauseReason) -> Result<RpcResponse<()>> {
        self.pause_reasons.lock().unwrap().push(reason);
        Ok(next_scripted(&self.pauses))
    }

    async fn update_fcm_token(&self, token: &str) -> Result<RpcResponse<FcmTokenResult>> {
        self.fcm_tokens.lock().unwrap().push(token.to_string());
        Ok(next_scripted(&self.fcm))
    }
}

#[async_trait]
impl ProvisioningReporter for FakeTransport {
    async fn report_provision_state(
        &self,
        request: &ProvisionReportRequest,
    ) -> Result<RpcResponse<ProvisionReportResponse>> {
        self.report_requests.lock().unwrap().push(*request);
        Ok(next_scripted(&self.reports))
    }
}

#[async_trait]
impl FinalizationReporter for FakeTransport {
    async fn report_program_complete(&self) -> Result<RpcResponse<()>> {
        Ok(next_scripted(&self.program_complete))
    }
}

pub struct FakeTransportProvider(pub Arc<FakeTransport>);

#[async_trait]
impl TransportProvider for FakeTransportProvider {
    async fn check_in(&self) -> Result<Arc<dyn CheckInTransport>> {
        Ok(self.0.clone())
    }

    async fn reporter(&self) -> Result<Arc<dyn ProvisioningReporter>> {
        Ok(self.0.clone())
    }

    async fn finalizer(&self) -> Result<Arc<dyn FinalizationReporter>> {
        Ok(self.0.clone())
    }
}

pub struct FakeIdentity {
    ids: Mutex<Vec<DeviceId>>,
}

impl FakeIdentity {
    pub fn set_ids(&self, ids: Vec<DeviceId>) {
        *self.ids.lock().unwrap() = ids;
    }
}

impl Default for FakeIdentity {
    fn default() -> Self {
        Self {
            ids: Mutex::new(vec![DeviceId::imei("490154203237518")]),
        }
    }
}

#[async_trait]
impl DeviceIdentity for FakeIdentity {
    async fn device_ids(&self) -> Result<Vec<DeviceId>> {
        Ok(self.ids.lock().unwrap().clone())
    }

    async fn carrier_mccmnc(&self) -> Result<Option<String>> {
        Ok(Some("310260".to_string()))
    }

    fn build_info(&self) -> BuildInfo {
        BuildInfo {
            manufacturer: "Acme".to_string(),
            model: "Phone 1".to_string(),
            fingerprint: "acme/phone1/1.0:user/release-keys".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    ResetCountdown { days_left: i32, ongoing: bool },
    Deferred(DateTime<Utc>),
    Cancel,
}

#[derive(Default)]
pub struct RecordingNotifications {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifications {
    /// Recorded events, ignoring cancellations.
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| **event != NotificationEvent::Cancel)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifications {
    async fn show_reset_countdown(&self, days_left: i32, ongoing: bool) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(NotificationEvent::ResetCountdown { days_left, ongoing });
        Ok(())
    }

    async fn show_deferred_provisioning(&self, resume_at: DateTime<Utc>) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(NotificationEvent::Deferred(resume_at));
        Ok(())
    }

    async fn cancel(&self) -> Result<()> {
        self.events.lock().unwrap().push(NotificationEvent::Cancel);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPolicy {
    enforced: Mutex<Vec<PolicySnapshot>>,
    wipes: Mutex<Vec<WipeReason>>,
}

impl RecordingPolicy {
    pub fn enforced(&self) -> Vec<PolicySnapshot> {
        self.enforced.lock().unwrap().clone()
    }

    pub fn wipes(&self) -> Vec<WipeReason> {
        self.wipes.lock().unwrap().clone()
    }
}

#[async_trait]
impl DevicePolicyController for RecordingPolicy {
    async fn enforce(&self, policy: PolicySnapshot) -> Result<()> {
        self.enforced.lock().unwrap().push(policy);
        Ok(())
    }

    async fn wipe_device(&self, reason: WipeReason) -> Result<()> {
        self.wipes.lock().unwrap().push(reason);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingProcess {
    terminations: AtomicUsize,
}

impl RecordingProcess {
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

impl ProcessControl for RecordingProcess {
    fn terminate_quietly(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingUi {
    started: Mutex<Vec<ProvisioningConfiguration>>,
    fail: Mutex<bool>,
}

impl RecordingUi {
    pub fn started(&self) -> Vec<ProvisioningConfiguration> {
        self.started.lock().unwrap().clone()
    }

    pub fn fail_next(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl ProvisioningUi for RecordingUi {
    async fn start_provisioning(&self, configuration: &ProvisioningConfiguration) -> Result<()> {
        if std::mem::take(&mut *self.fail.lock().unwrap()) {
            return Err(Error::platform("kiosk installer unavailable"));
        }
        self.started.lock().unwrap().push(configuration.clone());
        Ok(())
    }
}

pub fn sample_configuration() -> ProvisioningConfiguration {
    ProvisioningConfiguration {
        kiosk_app_package: "com.example.creditor".to_string(),
        kiosk_app_download_url: "https://kiosk.example.com/app.apk".to_string(),
        kiosk_app_signature_checksum: "c2lnbmF0dXJl".to_string(),
        provider_name: "Example Credit".to_string(),
        terms_and_conditions_url: Some("https://example.com/terms".to_string()),
        support_url: None,
        allowlisted_packages: vec!["com.example.dialer".to_string()],
        disable_outgoing_calls: true,
        enable_notifications_in_lock_task: false,
        provisioning_type: ProvisioningType::Financed,
        enrollment_token: Some("enroll-abc".to_string()),
    }
}

/// Fully wired core services over in-memory fakes.
pub struct Harness {
    pub store: Arc<MemoryParameterStore>,
    pub queue: Arc<MemoryWorkQueue>,
    pub clock: Arc<ManualClock>,
    pub global: GlobalParameters,
    pub setup: SetupParameters,
    pub transport: Arc<FakeTransport>,
    pub identity: Arc<FakeIdentity>,
    pub notifications: Arc<RecordingNotifications>,
    pub policy: Arc<RecordingPolicy>,
    pub process: Arc<RecordingProcess>,
    pub ui: Arc<RecordingUi>,
    scheduler: DeviceLockScheduler,
    device_state: DeviceStateController,
    provision: Arc<ProvisionStateController>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryParameterStore::default());
        let queue = Arc::new(MemoryWorkQueue::default());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let global = GlobalParameters::new(store.clone());
        let setup = SetupParameters::new(store.clone());
        let transport = Arc::new(FakeTransport::default());
        let identity = Arc::new(FakeIdentity::default());
        let notifications = Arc::new(RecordingNotifications::default());
        let policy = Arc::new(RecordingPolicy::default());
        let process = Arc::new(RecordingProcess::default());
        let ui = Arc::new(RecordingUi::default());

        let scheduler = DeviceLockScheduler::new(
            queue.clone(),
            global.clone(),
            clock.clone(),
            SchedulerConfig::default(),
        );
        let device_state = DeviceStateController::new(
            global.clone(),
            setup.clone(),
            policy.clone(),
            scheduler.clone(),
        );
        let provision = Arc::new(ProvisionStateController::new(
            global.clone(),
            setup.clone(),
            scheduler.clone(),
            device_state.clone(),
            Arc::new(FakeTransportProvider(transport.clone())),
            identity.clone(),
            ui.clone(),
            notifications.clone(),
            clock.clone(),
        ));

        Self {
            store,
            queue,
            clock,
            global,
            setup,
            transport,
            identity,
            notifications,
            policy,
            process,
            ui,
            scheduler,
            device_state,
            provision,
        }
    }

    pub fn scheduler(&self) -> DeviceLockScheduler {
        self.scheduler.clone()
    }

    pub fn device_state(&self) -> DeviceStateController {
        self.device_state.clone()
    }

    pub fn provision(&self) -> Arc<ProvisionStateController> {
        self.provision.clone()
    }

    pub fn supervisor(&self) -> Arc<FailureSupervisor> {
        Arc::new(FailureSupervisor::new(
            self.global.clone(),
            self.policy.clone(),
            self.process.clone(),
        ))
    }

    pub fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            params: self.global.clone(),
            setup: self.setup.clone(),
            scheduler: self.scheduler(),
            provision: self.provision(),
            device_state: self.device_state(),
            transports: Arc::new(FakeTransportProvider(self.transport.clone())),
            identity: self.identity.clone(),
            notifications: self.notifications.clone(),
            policy: self.policy.clone(),
            clock: self.clock.clone(),
        }
    }

    /// State after a `READY_FOR_PROVISION` check-in.
    pub async fn cache_ready_payload(&self, mandatory: bool) {
        self.global.set_registered_device_id("reg-123").await.unwrap();
        self.setup
            .store_configuration(&sample_configuration())
            .await
            .unwrap();
        self.global.set_provision_forced(mandatory).await.unwrap();
        self.global.set_provision_ready(true).await.unwrap();
    }
}
