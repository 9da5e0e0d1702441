//! BlueZ D-Bus backend for BTHome scanning.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{
    ADVERTISEMENT_CHANNEL_BUFFER_SIZE, Advertisement, AdvertisementResult,
    SERVICE_DATA_16_BIT_UUID_TYPE, ScanError, ServiceData,
};
use crate::parser::BTHOME_UUID;
use bluer::monitor::{Monitor, MonitorEvent, Pattern};
use bluer::{Adapter, Address, Session, Uuid};
use futures::StreamExt;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// The BTHome 16-bit UUID 0xFCD2 expanded with the Bluetooth base UUID.
pub const BTHOME_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000fcd2_0000_1000_8000_00805f9b34fb);

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Start scanning for BTHome devices using the BlueZ D-Bus backend.
///
/// Registers an advertisement monitor matching BTHome service data and
/// forwards the service data of every matching device through the returned
/// channel. Runs indefinitely until interrupted.
///
/// # Arguments
/// * `verbose` - If true, Bluetooth errors are sent as Err values; otherwise they're silently dropped.
pub async fn start_scan(verbose: bool) -> Result<mpsc::Receiver<AdvertisementResult>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;
    info!(adapter = adapter.name(), "scanning for BTHome advertisements");

    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    // Service data AD structures start with the 16-bit UUID, little-endian
    let pattern = Pattern {
        data_type: SERVICE_DATA_16_BIT_UUID_TYPE,
        start_position: 0,
        content: BTHOME_UUID.to_vec(),
    };

    let monitor_manager = adapter.monitor().await?;
    let mut monitor_handle = monitor_manager
        .register(Monitor {
            patterns: Some(vec![pattern]),
            ..Default::default()
        })
        .await?;

    // Spawn a task that owns all Bluetooth state and runs the event loop
    tokio::spawn(async move {
        // Keep all Bluetooth state alive by moving it into this task
        let _session = session;
        let _monitor_manager = monitor_manager;

        while let Some(event) = monitor_handle.next().await {
            let MonitorEvent::DeviceFound(device_id) = event else {
                continue;
            };
            match read_advertisement(&adapter, device_id.device).await {
                Ok(Some(advertisement)) => {
                    let _ = tx.send(Ok(advertisement)).await;
                }
                Ok(None) => {}
                Err(e) if verbose => {
                    let _ = tx.send(Err(e)).await;
                }
                Err(e) => debug!(error = %e, "failed to read device"),
            }
        }
    });

    Ok(rx)
}

/// Read the service data a discovered device advertised.
///
/// Returns `None` when the device has no BTHome service data.
async fn read_advertisement(
    adapter: &Adapter,
    address: Address,
) -> Result<Option<Advertisement>, ScanError> {
    let device = adapter.device(address)?;

    let service_data = match device.service_data().await? {
        Some(data) => to_service_data(data),
        None => return Ok(None),
    };

    if !service_data
        .iter()
        .any(|sd| sd.uuid.as_deref() == Some(&BTHOME_UUID[..]))
    {
        return Ok(None);
    }

    Ok(Some(Advertisement {
        mac: address.into(),
        service_data,
    }))
}

/// Convert BlueZ service data into UUID/data pairs.
///
/// BTHome entries get the 2-byte UUID the parser looks for, any other
/// service keeps its full 16-byte UUID so the parser skips it.
fn to_service_data(service_data: HashMap<Uuid, Vec<u8>>) -> Vec<ServiceData> {
    let mut entries: Vec<(Uuid, Vec<u8>)> = service_data.into_iter().collect();
    entries.sort_by_key(|(uuid, _)| *uuid);
    entries
        .into_iter()
        .map(|(uuid, data)| {
            if uuid == BTHOME_SERVICE_UUID {
                ServiceData::bthome(data)
            } else {
                ServiceData {
                    uuid: Some(uuid.as_bytes().to_vec()),
                    data,
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac_address::MacAddress;

    #[test]
    fn test_address_to_mac_address() {
        let addr = Address([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        let mac: MacAddress = addr.into();
        assert_eq!(mac, MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]));
    }

    #[test]
    fn test_bthome_service_uuid() {
        assert_eq!(
            BTHOME_SERVICE_UUID.to_string(),
            "0000fcd2-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_to_service_data() {
        let battery_service = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
        let service_data = HashMap::from([
            (BTHOME_SERVICE_UUID, vec![0x40, 0x01, 0x5a]),
            (battery_service, vec![0x64]),
        ]);

        let entries = to_service_data(service_data);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].uuid.as_deref().map(<[u8]>::len), Some(16));
        assert_eq!(entries[0].data, vec![0x64]);
        assert_eq!(entries[1], ServiceData::bthome(vec![0x40, 0x01, 0x5a]));
    }
}
