//! BTHome service data parser.
//!
//! [`Parser`] ties the pieces together: it filters service data by UUID,
//! reads the header byte, decrypts when the header says so, runs the object
//! decoders and drops repeated packets per device.

use crate::crypto::{Decrypted, DeviceCipher};
use crate::error::DecodeError;
use crate::mac_address::MacAddress;
use crate::objects::ObjectRegistry;
use crate::packet::Packet;
use bytes::Buf;
use std::collections::HashMap;
use tracing::debug;

/// BTHome service data UUID 0xFCD2, in the little-endian byte order it
/// appears in advertisements.
pub const BTHOME_UUID: [u8; 2] = [0xD2, 0xFC];

/// Normalize a device address for use as a map key: lowercase, no colons.
pub fn normalize_identity(identity: &str) -> String {
    identity
        .chars()
        .filter(|c| *c != ':')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn is_bthome(uuid: Option<&[u8]>) -> bool {
    uuid.is_none_or(|uuid| uuid == BTHOME_UUID)
}

/// Stateful BTHome parser.
///
/// Holds the object decoders, the per-device encryption keys and the last
/// packet id seen from every device. None of it is synchronized; wrap the
/// parser in a mutex to share it between threads.
#[derive(Debug, Default)]
pub struct Parser {
    registry: ObjectRegistry,
    ciphers: HashMap<String, DeviceCipher>,
    last_packet: HashMap<String, u8>,
}

impl Parser {
    /// Create a parser with the built-in object decoders registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the hex encoded bind key for the device at `address`.
    pub fn register_key(&mut self, address: &str, key_hex: &str) -> Result<(), DecodeError> {
        let cipher = DeviceCipher::from_hex(key_hex)?;
        self.ciphers.insert(normalize_identity(address), cipher);
        Ok(())
    }

    /// Register a decoder for an object id, replacing any existing one.
    pub fn register_decoder<F>(&mut self, id: u8, decoder: F)
    where
        F: Fn(&mut &[u8], &mut Packet) -> Result<(), DecodeError> + Send + Sync + 'static,
    {
        self.registry.register(id, decoder);
    }

    /// Parse service data given as a flat list alternating UUID and data.
    ///
    /// A `None` UUID means the caller already filtered for BTHome. If
    /// `address` is not empty, packets repeating the previous packet id of
    /// that device are dropped.
    pub fn parse(
        &mut self,
        address: &str,
        service_data: &[Option<&[u8]>],
    ) -> Result<Vec<Packet>, DecodeError> {
        if service_data.len() % 2 != 0 {
            return Err(DecodeError::MalformedInput(
                "service data must be pairs of UUID and data".into(),
            ));
        }

        let pairs = service_data
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1].unwrap_or_default()));
        self.parse_pairs(address, pairs)
    }

    /// Parse `(uuid, data)` pairs from one advertisement.
    ///
    /// All or nothing: on error no packets are returned and the duplicate
    /// tracking is left as it was before the call.
    pub fn parse_pairs<'a, I>(&mut self, address: &str, pairs: I) -> Result<Vec<Packet>, DecodeError>
    where
        I: IntoIterator<Item = (Option<&'a [u8]>, &'a [u8])>,
    {
        let identity = normalize_identity(address);
        let mut seen: Option<u8> = None;
        let mut packets = Vec::new();

        for (uuid, data) in pairs {
            if !is_bthome(uuid) {
                debug!(address, ?uuid, "skipping non-BTHome service data");
                continue;
            }

            let packet = self.decode_packet(&identity, data)?;

            if identity.is_empty() {
                packets.push(packet);
                continue;
            }

            let last = seen.or_else(|| self.last_packet.get(&identity).copied());
            if last == Some(packet.packet_id()) {
                debug!(address, id = packet.packet_id(), "dropping duplicate packet");
                continue;
            }
            seen = Some(packet.packet_id());
            packets.push(packet);
        }

        if let Some(id) = seen {
            self.last_packet.insert(identity, id);
        }

        Ok(packets)
    }

    fn decode_packet(&self, identity: &str, data: &[u8]) -> Result<Packet, DecodeError> {
        let mut buf = data;
        let header = buf.try_get_u8()?;
        let mut packet = Packet::from_header(header);

        if packet.encrypted {
            let decrypted = self.decrypt(identity, header, buf)?;
            packet.counter = Some(decrypted.counter);
            let mut plain = decrypted.plaintext.as_slice();
            self.registry.decode_objects(&mut plain, &mut packet)?;
        } else {
            self.registry.decode_objects(&mut buf, &mut packet)?;
        }

        Ok(packet)
    }

    fn decrypt(
        &self,
        identity: &str,
        header: u8,
        blob: &[u8],
    ) -> Result<Decrypted, DecodeError> {
        if identity.is_empty() {
            return Err(DecodeError::UnknownDeviceForDecryption);
        }
        let cipher = self
            .ciphers
            .get(identity)
            .ok_or_else(|| DecodeError::MissingKeyForDevice(identity.to_string()))?;
        let mac: MacAddress = identity
            .parse()
            .map_err(|e| DecodeError::MalformedInput(format!("decoding MAC address: {e}")))?;
        cipher.decrypt(mac, header, blob)
    }
}
