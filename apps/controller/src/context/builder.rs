use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Mutex;
use tracing::info;

use devicelock_checkin::{CheckInClientFactory, NetworkMonitor};
use devicelock_core::checkin::TransportProvider;
use devicelock_core::config::SchedulerConfig;
use devicelock_core::device_state::DeviceStateController;
use devicelock_core::parameters::{GlobalParameters, ParameterStore, SetupParameters};
use devicelock_core::platform::{
    Clock, DeviceIdentity, DevicePolicyController, NotificationSink, ProcessControl,
    ProvisioningUi, SystemClock,
};
use devicelock_core::provision::ProvisionStateController;
use devicelock_core::scheduler::{DeviceLockScheduler, WorkDispatcher, WorkQueue};
use devicelock_core::supervisor::FailureSupervisor;
use devicelock_core::workers::{register_workers, WorkerContext};
use devicelock_storage_sqlite::{
    create_pool, init, run_migrations, spawn_writer, ParameterRepository, WorkQueueRepository,
};

use super::ServiceContext;
use crate::config::ControllerConfig;
use crate::platform::{
    ConfiguredIdentity, ExitProcess, HostPolicyController, LogNotifications, LogProvisioningUi,
};

pub fn build_context(config: ControllerConfig) -> anyhow::Result<Arc<ServiceContext>> {
    build_context_with(config, Arc::new(ExitProcess))
}

/// Wires storage, transports and the provisioning machinery together.
/// `process` is what the failure supervisor calls to stop the controller.
pub fn build_context_with(
    config: ControllerConfig,
    process: Arc<dyn ProcessControl>,
) -> anyhow::Result<Arc<ServiceContext>> {
    let data_dir = config.data_dir.to_string_lossy().to_string();
    let db_path = init(&data_dir).context("Failed to prepare data directory")?;
    run_migrations(&db_path).context("Failed to run database migrations")?;
    let pool = create_pool(&db_path).context("Failed to open database")?;
    let writer = spawn_writer(pool.as_ref().clone());
    info!("Database ready at {}", db_path);

    let store: Arc<dyn ParameterStore> =
        Arc::new(ParameterRepository::new(pool.clone(), writer.clone()));
    let queue: Arc<dyn WorkQueue> = Arc::new(WorkQueueRepository::new(pool, writer));

    let global = GlobalParameters::new(store.clone());
    let setup = SetupParameters::new(store);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let scheduler = DeviceLockScheduler::new(
        queue.clone(),
        global.clone(),
        clock.clone(),
        SchedulerConfig::default(),
    );

    let policy: Arc<dyn DevicePolicyController> = Arc::new(HostPolicyController::new(
        config.data_dir.clone(),
        config.wipe_command.clone(),
    ));
    let device_state =
        DeviceStateController::new(global.clone(), setup.clone(), policy.clone(), scheduler.clone());

    let network_monitor = Arc::new(NetworkMonitor::new());
    let transports = Arc::new(
        CheckInClientFactory::new(
            global.clone(),
            &config.api_url,
            &config.api_token,
            Some(network_monitor.clone()),
        )
        .with_debug(config.debug, config.debug_scenario),
    );
    let transport_provider: Arc<dyn TransportProvider> = transports.clone();

    let identity: Arc<dyn DeviceIdentity> =
        Arc::new(ConfiguredIdentity::new(config.identity.clone()));
    let notifications: Arc<dyn NotificationSink> = Arc::new(LogNotifications);
    let ui: Arc<dyn ProvisioningUi> = Arc::new(LogProvisioningUi);

    let provision = Arc::new(ProvisionStateController::new(
        global.clone(),
        setup.clone(),
        scheduler.clone(),
        device_state.clone(),
        transport_provider.clone(),
        identity.clone(),
        ui,
        notifications.clone(),
        clock.clone(),
    ));

    let supervisor = Arc::new(FailureSupervisor::new(
        global.clone(),
        policy.clone(),
        process,
    ));

    let mut dispatcher = WorkDispatcher::new(queue.clone(), supervisor);
    register_workers(
        &mut dispatcher,
        &WorkerContext {
            params: global.clone(),
            setup,
            scheduler: scheduler.clone(),
            provision: provision.clone(),
            device_state: device_state.clone(),
            transports: transport_provider,
            identity,
            notifications,
            policy,
            clock: clock.clone(),
        },
    );

    Ok(Arc::new(ServiceContext {
        config,
        global,
        queue,
        scheduler,
        device_state,
        provision,
        transports,
        network_monitor,
        dispatcher: Arc::new(dispatcher),
        clock,
        work_loop: Mutex::new(None),
    }))
}
