//! AES-CCM payload encryption used by BTHome devices with a bind key.
//!
//! Encrypted payloads carry the object stream as ciphertext followed by a
//! fixed trailer:
//!
//! ```text
//! +--------------------------+-------------------+---------------+
//! | Encrypted Data (n bytes) | Counter (4 bytes) | MIC (4 bytes) |
//! +--------------------------+-------------------+---------------+
//! ```
//!
//! The 13 byte nonce is the device MAC, the BTHome UUID, the header byte and
//! the counter, in that order.

use crate::error::DecodeError;
use crate::mac_address::MacAddress;
use crate::parser::BTHOME_UUID;
use aes::Aes128;
use ccm::Ccm;
use ccm::aead::consts::{U4, U13};
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{Aead, KeyInit};
use std::fmt;
use tracing::trace;

/// BTHome bind keys are AES-128 keys.
pub const KEY_LEN: usize = 16;

const COUNTER_LEN: usize = 4;
const MIC_LEN: usize = 4;
const TRAILER_LEN: usize = COUNTER_LEN + MIC_LEN;

type BtHomeCcm = Ccm<Aes128, U4, U13>;

/// Plaintext recovered from an encrypted payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Decrypted {
    /// Counter from the trailer, little-endian on the wire
    pub counter: u32,
    /// Object stream, without header
    pub plaintext: Vec<u8>,
}

/// A prepared AES-128-CCM cipher for one device.
pub struct DeviceCipher {
    ccm: BtHomeCcm,
}

impl DeviceCipher {
    pub fn new(key: &[u8]) -> Result<Self, DecodeError> {
        let ccm = BtHomeCcm::new_from_slice(key).map_err(|_| {
            DecodeError::MalformedInput(format!(
                "encryption key must be {KEY_LEN} bytes, got {}",
                key.len()
            ))
        })?;
        Ok(DeviceCipher { ccm })
    }

    /// Build a cipher from a hex encoded bind key.
    pub fn from_hex(key_hex: &str) -> Result<Self, DecodeError> {
        let key = hex::decode(key_hex.trim())
            .map_err(|e| DecodeError::MalformedInput(format!("decoding key: {e}")))?;
        Self::new(&key)
    }

    /// Verify and decrypt `blob` (everything after the header byte).
    pub fn decrypt(
        &self,
        mac: MacAddress,
        header: u8,
        blob: &[u8],
    ) -> Result<Decrypted, DecodeError> {
        if blob.len() < TRAILER_LEN {
            return Err(DecodeError::TruncatedPayload {
                requested: TRAILER_LEN,
                available: blob.len(),
            });
        }

        let (ciphertext, trailer) = blob.split_at(blob.len() - TRAILER_LEN);
        let (counter, mic) = trailer.split_at(COUNTER_LEN);
        let counter: [u8; COUNTER_LEN] = [counter[0], counter[1], counter[2], counter[3]];

        let nonce = nonce(mac, header, counter);
        let mut sealed = Vec::with_capacity(ciphertext.len() + MIC_LEN);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(mic);

        let plaintext = self
            .ccm
            .decrypt(GenericArray::from_slice(&nonce), sealed.as_slice())
            .map_err(|_| DecodeError::AuthenticationFailure)?;

        trace!(%mac, len = plaintext.len(), "decrypted payload");

        Ok(Decrypted {
            counter: u32::from_le_bytes(counter),
            plaintext,
        })
    }

    /// Encrypt an object stream the way a sensor does, returning the bytes
    /// that follow the header: ciphertext, counter and MIC.
    pub fn encrypt(
        &self,
        mac: MacAddress,
        header: u8,
        counter: u32,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, DecodeError> {
        let counter = counter.to_le_bytes();
        let nonce = nonce(mac, header, counter);
        let sealed = self
            .ccm
            .encrypt(GenericArray::from_slice(&nonce), plaintext)
            .map_err(|_| DecodeError::MalformedInput("payload too large to encrypt".into()))?;

        let (ciphertext, mic) = sealed.split_at(sealed.len() - MIC_LEN);
        let mut blob = Vec::with_capacity(sealed.len() + COUNTER_LEN);
        blob.extend_from_slice(ciphertext);
        blob.extend_from_slice(&counter);
        blob.extend_from_slice(mic);
        Ok(blob)
    }
}

impl fmt::Debug for DeviceCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceCipher(..)")
    }
}

fn nonce(mac: MacAddress, header: u8, counter: [u8; COUNTER_LEN]) -> [u8; 13] {
    let mut nonce = [0u8; 13];
    nonce[..6].copy_from_slice(&mac.0);
    nonce[6..8].copy_from_slice(&BTHOME_UUID);
    nonce[8] = header;
    nonce[9..].copy_from_slice(&counter);
    nonce
}
