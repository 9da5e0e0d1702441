//! BLE scanner abstraction for BTHome devices.
//!
//! Scanners do not decode anything. They hand over the service data of every
//! advertisement that may carry BTHome data, and the app loop feeds it to the
//! [`Parser`](crate::parser::Parser).

#[cfg(feature = "bluer")]
pub mod bluer;

use crate::mac_address::MacAddress;
use crate::parser::BTHOME_UUID;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error type for scanner operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Backend not available (not compiled in)
    #[allow(dead_code)]
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Bluetooth AD type for Service Data with a 16-bit UUID.
pub const SERVICE_DATA_16_BIT_UUID_TYPE: u8 = 0x16;

/// Channel buffer size for scanned advertisements.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// One service data element of an advertisement.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceData {
    /// Service UUID bytes as advertised, `None` if the scanner already
    /// filtered for BTHome
    pub uuid: Option<Vec<u8>>,
    pub data: Vec<u8>,
}

impl ServiceData {
    /// Service data known to carry the BTHome UUID.
    pub fn bthome(data: Vec<u8>) -> Self {
        ServiceData {
            uuid: Some(BTHOME_UUID.to_vec()),
            data,
        }
    }
}

/// Service data received from one device.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub mac: MacAddress,
    pub service_data: Vec<ServiceData>,
}

impl Advertisement {
    /// The service data as `(uuid, data)` pairs for
    /// [`Parser::parse_pairs`](crate::parser::Parser::parse_pairs).
    pub fn pairs(&self) -> impl Iterator<Item = (Option<&[u8]>, &[u8])> {
        self.service_data
            .iter()
            .map(|sd| (sd.uuid.as_deref(), sd.data.as_slice()))
    }
}

/// Convenience alias for scanned advertisements or scanner errors.
pub type AdvertisementResult = Result<Advertisement, ScanError>;

/// Start scanning for BTHome advertisements with the compiled-in backend.
///
/// # Arguments
/// * `verbose` - If true, Bluetooth errors are sent as Err values; otherwise they're silently dropped.
///
/// # Returns
/// A receiver for advertisements (or scanner errors if verbose).
pub async fn start_scan(verbose: bool) -> Result<mpsc::Receiver<AdvertisementResult>, ScanError> {
    #[cfg(feature = "bluer")]
    return bluer::start_scan(verbose).await;

    #[cfg(not(feature = "bluer"))]
    {
        let _ = verbose;
        Err(ScanError::BackendNotAvailable("bluer".into()))
    }
}
