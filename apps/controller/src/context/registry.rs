use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use devicelock_checkin::{CheckInClientFactory, NetworkMonitor};
use devicelock_core::device_state::DeviceStateController;
use devicelock_core::parameters::GlobalParameters;
use devicelock_core::platform::Clock;
use devicelock_core::provision::ProvisionStateController;
use devicelock_core::scheduler::{DeviceLockScheduler, WorkDispatcher, WorkQueue};

use crate::config::ControllerConfig;

/// Everything the signal handlers, the work loop and the API share.
pub struct ServiceContext {
    pub config: ControllerConfig,

    pub global: GlobalParameters,
    pub queue: Arc<dyn WorkQueue>,
    pub scheduler: DeviceLockScheduler,
    pub device_state: DeviceStateController,
    pub provision: Arc<ProvisionStateController>,
    pub transports: Arc<CheckInClientFactory>,
    pub network_monitor: Arc<NetworkMonitor>,
    pub dispatcher: Arc<WorkDispatcher>,
    pub clock: Arc<dyn Clock>,

    /// Background work loop, see `runtime::start_work_loop`.
    pub work_loop: Mutex<Option<JoinHandle<()>>>,
}
