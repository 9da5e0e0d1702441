//! Command line encryption keys for BTHome devices.
//!
//! Devices with encryption enabled need their bind key on the command line,
//! given as `--key MAC=HEXKEY`.

use crate::mac_address::MacAddress;

/// A parsed `MAC=HEXKEY` argument.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceKey {
    /// The device the key belongs to
    pub address: MacAddress,
    /// Hex encoded AES-128 bind key
    pub key: String,
}

/// Parse a device key from a string in the format "MAC=HEXKEY".
///
/// Only the address is validated here, the key is checked when it is
/// registered with the parser.
///
/// # Example
/// ```
/// use bthome_listener::device_key::parse_device_key;
///
/// let key = parse_device_key("54:48:E6:8F:80:A5=231d39c1d7cc1ab1aee224cd096db932").unwrap();
/// assert_eq!(key.address.to_string(), "54:48:E6:8F:80:A5");
/// assert_eq!(key.key, "231d39c1d7cc1ab1aee224cd096db932");
/// ```
pub fn parse_device_key(src: &str) -> Result<DeviceKey, String> {
    let (address, key) = src
        .split_once('=')
        .ok_or_else(|| "invalid key: expected format MAC=HEXKEY".to_string())?;
    let address = address.trim().parse().map_err(|e| format!("{e}"))?;
    Ok(DeviceKey {
        address,
        key: key.trim().to_string(),
    })
}
