//! `bthome-listener` library.
//!
//! The decoding core lives in [`crate::parser`], [`crate::objects`] and
//! [`crate::crypto`] and has no Bluetooth dependency. The binary
//! (`src/main.rs`) only parses the CLI; the listening loop is in
//! [`crate::app`] where it can be tested with an injected scanner.

pub mod app;
pub mod crypto;
pub mod device_key;
pub mod error;
pub mod mac_address;
pub mod objects;
pub mod packet;
pub mod parser;
pub mod scanner;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use crypto::DeviceCipher;
pub use device_key::{DeviceKey, parse_device_key};
pub use error::DecodeError;
pub use mac_address::MacAddress;
pub use objects::{DecodeFn, ObjectRegistry};
pub use packet::{ButtonEvent, Packet, Trigger};
pub use parser::{BTHOME_UUID, Parser};
pub use scanner::{Advertisement, AdvertisementResult, ScanError, ServiceData};
