//! Platform broadcasts and user-facing events delivered to the controller.

use chrono::Duration;
use log::info;
use serde::{Deserialize, Serialize};

use devicelock_checkin::NetworkInfo;
use devicelock_core::provision::{ProvisionEvent, ProvisionFailureReason};
use devicelock_core::Result;

use crate::context::ServiceContext;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlatformSignal {
    BootCompleted,
    /// Credential-encrypted storage is still locked; only policies are restored.
    LockedBootCompleted,
    UserUnlocked,
    TimeChanged {
        #[serde(rename = "deltaSeconds")]
        delta_seconds: i64,
    },
    NetworkChanged {
        networks: Vec<NetworkInfo>,
    },
    SetupCompleted,
    FcmTokenRefreshed {
        token: String,
    },
    ProvisionPaused,
    ProvisionSucceeded,
    ProvisionFailed {
        reason: ProvisionFailureReason,
    },
    ProvisionRetry,
    KioskSetupFinished,
    DeviceLock,
    DeviceUnlock,
    DeviceClear,
}

impl PlatformSignal {
    pub fn name(&self) -> &'static str {
        match self {
            PlatformSignal::BootCompleted => "BOOT_COMPLETED",
            PlatformSignal::LockedBootCompleted => "LOCKED_BOOT_COMPLETED",
            PlatformSignal::UserUnlocked => "USER_UNLOCKED",
            PlatformSignal::TimeChanged { .. } => "TIME_CHANGED",
            PlatformSignal::NetworkChanged { .. } => "NETWORK_CHANGED",
            PlatformSignal::SetupCompleted => "SETUP_COMPLETED",
            PlatformSignal::FcmTokenRefreshed { .. } => "FCM_TOKEN_REFRESHED",
            PlatformSignal::ProvisionPaused => "PROVISION_PAUSED",
            PlatformSignal::ProvisionSucceeded => "PROVISION_SUCCEEDED",
            PlatformSignal::ProvisionFailed { .. } => "PROVISION_FAILED",
            PlatformSignal::ProvisionRetry => "PROVISION_RETRY",
            PlatformSignal::KioskSetupFinished => "KIOSK_SETUP_FINISHED",
            PlatformSignal::DeviceLock => "DEVICE_LOCK",
            PlatformSignal::DeviceUnlock => "DEVICE_UNLOCK",
            PlatformSignal::DeviceClear => "DEVICE_CLEAR",
        }
    }
}

/// Applies `signal` and wakes the work loop so anything it armed runs promptly.
pub async fn handle_signal(context: &ServiceContext, signal: PlatformSignal) -> Result<()> {
    info!("[Signal] {}", signal.name());
    match signal {
        PlatformSignal::BootCompleted | PlatformSignal::UserUnlocked => {
            context.scheduler.on_boot_completed().await?;
            context.device_state.enforce_current().await?;
        }
        PlatformSignal::LockedBootCompleted => {
            context.device_state.enforce_current().await?;
        }
        PlatformSignal::TimeChanged { delta_seconds } => {
            context
                .scheduler
                .on_time_changed(Duration::seconds(delta_seconds))
                .await?;
        }
        PlatformSignal::NetworkChanged { networks } => {
            let changed = context.network_monitor.update_networks(&networks);
            info!(
                "[Signal] {} network(s) reported, fallback changed: {}",
                networks.len(),
                changed
            );
        }
        PlatformSignal::SetupCompleted => {
            context.global.set_setup_wizard_completed(true).await?;
            context.provision.try_begin_provisioning().await?;
        }
        PlatformSignal::FcmTokenRefreshed { token } => {
            context.global.set_fcm_token(&token).await?;
            context.scheduler.schedule_fcm_token_update(&token).await?;
        }
        PlatformSignal::ProvisionPaused => {
            context.provision.post_event(ProvisionEvent::ProvisionPause).await?;
        }
        PlatformSignal::ProvisionSucceeded => {
            context
                .provision
                .post_event(ProvisionEvent::ProvisionSuccess)
                .await?;
        }
        PlatformSignal::ProvisionFailed { reason } => {
            context
                .provision
                .post_event(ProvisionEvent::ProvisionFailure(reason))
                .await?;
        }
        PlatformSignal::ProvisionRetry => {
            context.provision.post_event(ProvisionEvent::ProvisionRetry).await?;
        }
        PlatformSignal::KioskSetupFinished => {
            context.provision.post_event(ProvisionEvent::ProvisionKiosk).await?;
        }
        PlatformSignal::DeviceLock => {
            context.device_state.lock().await?;
        }
        PlatformSignal::DeviceUnlock => {
            context.device_state.unlock().await?;
        }
        PlatformSignal::DeviceClear => {
            context.device_state.clear().await?;
        }
    }
    context.scheduler.wake_handle().notify_one();
    Ok(())
}
