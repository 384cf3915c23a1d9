use std::collections::BTreeSet;

use log::warn;

use super::model::{CheckInRequest, DeviceId};
use crate::errors::Result;
use crate::platform::DeviceIdentity;

/// Sorted set of the non-empty identifiers, without duplicates.
pub fn dedupe_device_ids(ids: impl IntoIterator<Item = DeviceId>) -> Vec<DeviceId> {
    ids.into_iter()
        .filter(|id| !id.value.trim().is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Assemble a check-in request, or `None` when the device exposes no usable
/// identifier.
pub async fn build_check_in_request(
    identity: &dyn DeviceIdentity,
    fcm_token: Option<String>,
) -> Result<Option<CheckInRequest>> {
    let device_ids = dedupe_device_ids(identity.device_ids().await?);
    if device_ids.is_empty() {
        warn!("[CheckIn] Device exposes no IMEI/MEID");
        return Ok(None);
    }

    Ok(Some(CheckInRequest {
        device_ids,
        carrier_mccmnc: identity.carrier_mccmnc().await?,
        fcm_token: fcm_token.filter(|token| !token.is_empty()),
        build_info: identity.build_info(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_drops_blank_and_repeated_ids() {
        let ids = dedupe_device_ids(vec![
            DeviceId::imei("490154203237518"),
            DeviceId::imei("490154203237518"),
            DeviceId::meid("A0000000000001"),
            DeviceId::imei("  "),
        ]);
        assert_eq!(
            ids,
            vec![
                DeviceId::imei("490154203237518"),
                DeviceId::meid("A0000000000001")
            ]
        );
    }

    #[test]
    fn same_value_with_different_type_is_kept() {
        let ids = dedupe_device_ids(vec![DeviceId::imei("1"), DeviceId::meid("1")]);
        assert_eq!(ids.len(), 2);
    }
}
