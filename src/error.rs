//! Error type shared by the BTHome decoding core.

use thiserror::Error;

/// Errors returned while registering keys or decoding BTHome payloads.
///
/// Every variant is fatal to the `parse` call that produced it: the call
/// returns this error and no packets.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Caller supplied input that can never decode (odd service data list,
    /// bad hex key, wrong key length, unparseable MAC address)
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    /// Payload ended in the middle of an object
    #[error("Truncated payload: needed {requested} byte(s), {available} available")]
    TruncatedPayload { requested: usize, available: usize },
    /// No decoder is registered for this object id
    #[error("Unknown object id: 0x{0:02x}")]
    UnknownObjectTag(u8),
    /// A field that may appear only once appeared again
    #[error("Duplicate object for set-once field {0}")]
    DuplicateSetOnceField(&'static str),
    /// Encrypted payload from a device without a registered key
    #[error("No encryption key registered for device {0}")]
    MissingKeyForDevice(String),
    /// The CCM integrity tag did not verify
    #[error("Authentication failed: payload was altered or the key is wrong")]
    AuthenticationFailure,
    /// Encrypted payload without a device address to build the nonce from
    #[error("Cannot decrypt payload without a device address")]
    UnknownDeviceForDecryption,
}

impl From<bytes::TryGetError> for DecodeError {
    fn from(err: bytes::TryGetError) -> Self {
        DecodeError::TruncatedPayload {
            requested: err.requested,
            available: err.available,
        }
    }
}
