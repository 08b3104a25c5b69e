//! Mijia service-data decoder.
//!
//! Mijia sensors broadcast their readings in a vendor service-data segment:
//! a `16 95 FE` prefix (service data AD header plus the little-endian Xiaomi
//! service UUID 0xFE95) at a fixed offset, a payload-type tag, and one or
//! two little-endian signed 16-bit values in tenths of a unit. Anything that
//! does not match is unrelated advertisement traffic and decodes to nothing.

use crate::address::DeviceAddress;
use crate::hci::LeAdvertisingReport;
use byteorder::{ByteOrder, LittleEndian};

/// Advertisement data lengths used by the sensor's broadcast format.
const PAYLOAD_LENGTHS: [usize; 3] = [22, 23, 25];

const SERVICE_DATA_PREFIX: [u8; 3] = [0x16, 0x95, 0xFE];
const PREFIX_OFFSET: usize = 4;
const TAG_OFFSET: usize = 18;
const VALUE_OFFSET: usize = 21;

// Payload-type tags
const TAG_TEMPERATURE_AND_HUMIDITY: u8 = 0x0D;
const TAG_BATTERY: u8 = 0x0A;
const TAG_TEMPERATURE: u8 = 0x04;
const TAG_HUMIDITY: u8 = 0x06;

/// A decoded sensor value. Temperature and humidity are in tenths of a
/// degree / percent; battery is a raw percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingValue {
    Temperature(i16),
    Humidity(i16),
    Battery(u8),
}

/// One decoded reading attributed to its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub address: DeviceAddress,
    pub value: ReadingValue,
}

/// Converts a tenths value to its exposed unit.
pub fn scaled(tenths: i16) -> f64 {
    tenths as f64 / 10.0
}

/// Decodes the sensor readings carried by an advertising report.
///
/// Returns an empty vector for any payload that is not a recognized Mijia
/// broadcast; that is the common case, not an error.
pub fn decode(report: &LeAdvertisingReport) -> Vec<Reading> {
    let data = &report.data;

    if !PAYLOAD_LENGTHS.contains(&data.len()) {
        return Vec::new();
    }
    if data.get(PREFIX_OFFSET..PREFIX_OFFSET + 3) != Some(&SERVICE_DATA_PREFIX[..]) {
        return Vec::new();
    }
    let Some(&tag) = data.get(TAG_OFFSET) else {
        return Vec::new();
    };

    let reading = |value| Reading {
        address: report.address,
        value,
    };

    match tag {
        TAG_TEMPERATURE_AND_HUMIDITY => {
            let (Some(temperature), Some(humidity)) = (
                read_i16_at(data, VALUE_OFFSET),
                read_i16_at(data, VALUE_OFFSET + 2),
            ) else {
                return Vec::new();
            };
            vec![
                reading(ReadingValue::Temperature(temperature)),
                reading(ReadingValue::Humidity(humidity)),
            ]
        }
        TAG_BATTERY => match data.get(VALUE_OFFSET) {
            Some(&level) => vec![reading(ReadingValue::Battery(level))],
            None => Vec::new(),
        },
        TAG_TEMPERATURE => match read_i16_at(data, VALUE_OFFSET) {
            Some(temperature) => vec![reading(ReadingValue::Temperature(temperature))],
            None => Vec::new(),
        },
        TAG_HUMIDITY => match read_i16_at(data, VALUE_OFFSET) {
            Some(humidity) => vec![reading(ReadingValue::Humidity(humidity))],
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn read_i16_at(data: &[u8], offset: usize) -> Option<i16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(LittleEndian::read_i16(bytes))
}
