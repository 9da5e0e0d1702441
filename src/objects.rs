//! BTHome object registry and object stream decoding.
//!
//! After the header byte a BTHome payload is a flat sequence of objects, each
//! introduced by a one-byte object id whose decoder knows how many bytes
//! follow. There is no length framing, so a single unknown id makes the rest
//! of the payload undecodable.

use crate::error::DecodeError;
use crate::packet::{ButtonEvent, Packet};
use bytes::Buf;
use std::collections::HashMap;
use std::fmt;

pub const PACKET_ID: u8 = 0x00;
pub const BATTERY: u8 = 0x01;
pub const HUMIDITY: u8 = 0x2e;
pub const BUTTON: u8 = 0x3a;
pub const TEMPERATURE: u8 = 0x45;
pub const RAW: u8 = 0x54;
pub const DEVICE_TYPE_ID: u8 = 0xf0;
pub const FIRMWARE_VERSION_4: u8 = 0xf1;
pub const FIRMWARE_VERSION_3: u8 = 0xf2;

/// A routine that reads one object's value from the cursor into the packet.
///
/// The cursor is positioned right after the object id and must be advanced
/// past every byte the object occupies.
pub type DecodeFn = Box<dyn Fn(&mut &[u8], &mut Packet) -> Result<(), DecodeError> + Send + Sync>;

/// Mapping from object id to decoding routine.
pub struct ObjectRegistry {
    decoders: HashMap<u8, DecodeFn>,
}

impl ObjectRegistry {
    /// A registry with no decoders at all.
    pub fn empty() -> Self {
        ObjectRegistry {
            decoders: HashMap::new(),
        }
    }

    /// Install `decoder` for `id`, replacing any decoder already registered.
    pub fn register<F>(&mut self, id: u8, decoder: F)
    where
        F: Fn(&mut &[u8], &mut Packet) -> Result<(), DecodeError> + Send + Sync + 'static,
    {
        self.decoders.insert(id, Box::new(decoder));
    }

    pub fn get(&self, id: u8) -> Option<&DecodeFn> {
        self.decoders.get(&id)
    }

    /// Decode objects until `buf` is exhausted.
    ///
    /// Stops at the first error; `packet` is then partially filled and should
    /// be discarded.
    pub fn decode_objects(&self, buf: &mut &[u8], packet: &mut Packet) -> Result<(), DecodeError> {
        while let Ok(id) = buf.try_get_u8() {
            let decoder = self.get(id).ok_or(DecodeError::UnknownObjectTag(id))?;
            decoder(buf, packet)?;
        }
        Ok(())
    }
}

impl Default for ObjectRegistry {
    /// The registry seeded with every built-in BTHome object decoder.
    fn default() -> Self {
        let mut registry = ObjectRegistry::empty();
        registry.register(PACKET_ID, decode_packet_id);
        registry.register(BATTERY, decode_battery);
        registry.register(HUMIDITY, decode_humidity);
        registry.register(TEMPERATURE, decode_temperature);
        registry.register(BUTTON, decode_button);
        registry.register(DEVICE_TYPE_ID, decode_device_type_id);
        registry.register(FIRMWARE_VERSION_4, decode_firmware_version::<4>);
        registry.register(FIRMWARE_VERSION_3, decode_firmware_version::<3>);
        registry.register(RAW, decode_raw);
        registry
    }
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&u8> = self.decoders.keys().collect();
        ids.sort();
        f.debug_struct("ObjectRegistry").field("ids", &ids).finish()
    }
}

fn set_once<T>(field: &mut Option<T>, value: T, name: &'static str) -> Result<(), DecodeError> {
    if field.is_some() {
        return Err(DecodeError::DuplicateSetOnceField(name));
    }
    *field = Some(value);
    Ok(())
}

fn decode_packet_id(buf: &mut &[u8], packet: &mut Packet) -> Result<(), DecodeError> {
    let id = buf.try_get_u8()?;
    set_once(&mut packet.id, id, "id")
}

fn decode_battery(buf: &mut &[u8], packet: &mut Packet) -> Result<(), DecodeError> {
    packet.battery.push(buf.try_get_u8()?);
    Ok(())
}

fn decode_humidity(buf: &mut &[u8], packet: &mut Packet) -> Result<(), DecodeError> {
    packet.humidity.push(buf.try_get_u8()?);
    Ok(())
}

fn decode_temperature(buf: &mut &[u8], packet: &mut Packet) -> Result<(), DecodeError> {
    let raw = buf.try_get_i16_le()?;
    packet.temperature.push(f32::from(raw) * 0.1);
    Ok(())
}

fn decode_button(buf: &mut &[u8], packet: &mut Packet) -> Result<(), DecodeError> {
    packet.button.push(ButtonEvent::from(buf.try_get_u8()?));
    Ok(())
}

fn decode_device_type_id(buf: &mut &[u8], packet: &mut Packet) -> Result<(), DecodeError> {
    let device_type = buf.try_get_i16_le()?;
    set_once(&mut packet.device_type_id, device_type, "device_type_id")
}

/// Firmware version bytes are sent least significant first: `[1, 2, 3, 4]`
/// is version `4.3.2.1`.
fn decode_firmware_version<const N: usize>(
    buf: &mut &[u8],
    packet: &mut Packet,
) -> Result<(), DecodeError> {
    let mut bytes = [0u8; N];
    buf.try_copy_to_slice(&mut bytes)?;
    let version = bytes
        .iter()
        .rev()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(".");
    set_once(&mut packet.firmware_version, version, "firmware_version")
}

fn decode_raw(buf: &mut &[u8], packet: &mut Packet) -> Result<(), DecodeError> {
    let len = usize::from(buf.try_get_u8()?);
    if buf.remaining() < len {
        return Err(DecodeError::TruncatedPayload {
            requested: len,
            available: buf.remaining(),
        });
    }
    packet.raw.push(buf[..len].to_vec());
    buf.advance(len);
    Ok(())
}
