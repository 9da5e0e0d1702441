//! Decoded BTHome packet record.

use std::fmt;

/// What caused the device to send the advertisement (header bit 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trigger {
    /// Sent on a button press or another irregular event
    ByButton,
    /// Sent on the regular advertising interval
    #[default]
    ByInterval,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::ByButton => write!(f, "Button"),
            Trigger::ByInterval => write!(f, "Interval"),
        }
    }
}

/// Button event reported by object id 0x3a.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    None,
    Press,
    DoublePress,
    TriplePress,
    LongPress,
    LongDoublePress,
    LongTriplePress,
    Hold,
    Unknown(u8),
}

impl From<u8> for ButtonEvent {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ButtonEvent::None,
            0x01 => ButtonEvent::Press,
            0x02 => ButtonEvent::DoublePress,
            0x03 => ButtonEvent::TriplePress,
            0x04 => ButtonEvent::LongPress,
            0x05 => ButtonEvent::LongDoublePress,
            0x06 => ButtonEvent::LongTriplePress,
            0x80 => ButtonEvent::Hold,
            other => ButtonEvent::Unknown(other),
        }
    }
}

impl fmt::Display for ButtonEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonEvent::Unknown(value) => write!(f, "Unknown(0x{value:02x})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// A decoded BTHome advertisement.
///
/// Single-valued objects (`id`, `firmware_version`, `device_type_id`) are
/// `Option`s that the decoder fills at most once. Everything else may occur
/// repeatedly in one payload and is kept in stream order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Packet {
    /// Header bit 0
    pub encrypted: bool,
    /// Header bit 2
    pub trigger: Trigger,
    /// BTHome format version, header bits 5-7
    pub version: u8,
    /// Packet id (object 0x00)
    pub id: Option<u8>,
    /// Counter from the encryption trailer; never checked for freshness
    pub counter: Option<u32>,
    /// Firmware version (objects 0xf1 / 0xf2)
    pub firmware_version: Option<String>,
    /// Device type id (object 0xf0)
    pub device_type_id: Option<i16>,
    /// Battery in percent
    pub battery: Vec<u8>,
    /// Relative humidity in percent
    pub humidity: Vec<u8>,
    /// Temperature in degrees Celsius
    pub temperature: Vec<f32>,
    pub button: Vec<ButtonEvent>,
    /// Opaque length-prefixed blocks (object 0x54)
    pub raw: Vec<Vec<u8>>,
}

impl Packet {
    /// Build an empty packet from the BTHome header byte.
    pub fn from_header(header: u8) -> Self {
        Packet {
            encrypted: header & 0x01 != 0,
            trigger: if header & 0x04 != 0 {
                Trigger::ByButton
            } else {
                Trigger::ByInterval
            },
            version: header >> 5,
            ..Default::default()
        }
    }

    /// Packet id used for duplicate suppression, 0 when the payload had none.
    pub fn packet_id(&self) -> u8 {
        self.id.unwrap_or(0)
    }
}

fn fmt_list<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    values: &[T],
) -> fmt::Result {
    if values.is_empty() {
        return Ok(());
    }
    write!(f, ", {name}: [")?;
    for (i, value) in values.iter().enumerate() {
        if i != 0 {
            write!(f, ", ")?;
        }
        write!(f, "{value}")?;
    }
    write!(f, "]")
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BTHomePacket{{Encrypted: {}, Trigger: {}, Version: {}, ID: {}",
            self.encrypted,
            self.trigger,
            self.version,
            self.packet_id()
        )?;

        if let Some(counter) = self.counter {
            write!(f, ", Counter: {counter}")?;
        }
        if let Some(firmware) = &self.firmware_version {
            write!(f, ", FirmwareVersion: {firmware}")?;
        }
        if let Some(device_type) = self.device_type_id {
            write!(f, ", DeviceTypeID: {device_type}")?;
        }
        fmt_list(f, "Battery", &self.battery)?;
        fmt_list(f, "Humidity", &self.humidity)?;
        let temperature: Vec<String> = self.temperature.iter().map(|t| format!("{t:.2}")).collect();
        fmt_list(f, "Temperature", &temperature)?;
        fmt_list(f, "Button", &self.button)?;
        let raw: Vec<String> = self.raw.iter().map(hex::encode).collect();
        fmt_list(f, "Raw", &raw)?;

        write!(f, "}}")
    }
}
