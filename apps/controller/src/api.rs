//! Local HTTP surface: platform signals in, controller status out.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use devicelock_core::device_state::{DeviceState, FinalizationState};
use devicelock_core::provision::ProvisionState;

use crate::context::ServiceContext;
use crate::signals::{handle_signal, PlatformSignal};

#[derive(Debug)]
pub enum ApiError {
    /// The signal is not valid in the current provisioning state.
    Conflict(String),
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (
            status,
            Json(ErrorBody {
                code: status.as_u16(),
                message,
            }),
        )
            .into_response()
    }
}

impl From<devicelock_core::Error> for ApiError {
    fn from(err: devicelock_core::Error) -> Self {
        match err {
            devicelock_core::Error::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWork {
    pub name: String,
    pub run_at: DateTime<Utc>,
    pub attempts: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    pub provision_state: ProvisionState,
    pub device_state: DeviceState,
    pub finalization_state: FinalizationState,
    pub registered_device_id: Option<String>,
    pub check_in_disabled: bool,
    pub non_vpn_fallback: bool,
    pub pending_work: Vec<PendingWork>,
}

pub async fn load_status(context: &ServiceContext) -> ApiResult<ControllerStatus> {
    let pending_work = context
        .queue
        .list_pending()
        .await?
        .into_iter()
        .map(|item| PendingWork {
            name: item.name.as_str().to_string(),
            run_at: item.run_at,
            attempts: item.attempts,
        })
        .collect();

    Ok(ControllerStatus {
        provision_state: context.global.provision_state().await?,
        device_state: context.global.device_state().await?,
        finalization_state: context.global.finalization_state().await?,
        registered_device_id: context.global.registered_device_id().await?,
        check_in_disabled: context.global.check_in_disabled().await?,
        non_vpn_fallback: context.network_monitor.current().best_non_vpn.is_some(),
        pending_work,
    })
}

async fn get_status(State(context): State<Arc<ServiceContext>>) -> ApiResult<Json<ControllerStatus>> {
    load_status(&context).await.map(Json).inspect_err(|err| {
        error!("[Api] Failed to load status: {:?}", err);
    })
}

async fn post_signal(
    State(context): State<Arc<ServiceContext>>,
    Json(signal): Json<PlatformSignal>,
) -> ApiResult<Json<ControllerStatus>> {
    let name = signal.name();
    if let Err(err) = handle_signal(&context, signal).await {
        warn!("[Api] Signal {} rejected: {}", name, err);
        return Err(err.into());
    }
    load_status(&context).await.map(Json)
}

pub fn router(context: Arc<ServiceContext>) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/signals", post(post_signal))
        .with_state(context)
}
