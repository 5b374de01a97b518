//! Sensor wire vocabulary (SENSOR_DEFINITION / SENSOR_VALUE).

use bitflags::bitflags;
use strum::{Display, FromRepr};

/// Value reported for lowest/highest/recorded fields a sensor does not
/// track.
pub const SENSOR_VALUE_UNSUPPORTED: i16 = 0;

/// Sensor number addressing every sensor at once (SET SENSOR_VALUE and
/// RECORD_SENSORS only).
pub const ALL_SENSORS: u8 = 0xff;

/// What a sensor measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, Display)]
#[repr(u8)]
pub enum SensorType {
    Temperature = 0x00,
    Voltage = 0x01,
    Current = 0x02,
    Frequency = 0x03,
    Resistance = 0x04,
    Power = 0x05,
    Mass = 0x06,
    Length = 0x07,
    Area = 0x08,
    Volume = 0x09,
    Density = 0x0a,
    Velocity = 0x0b,
    Acceleration = 0x0c,
    Force = 0x0d,
    Energy = 0x0e,
    Pressure = 0x0f,
    Time = 0x10,
    Angle = 0x11,
    Other = 0x7f,
}

/// Unit of a sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, Display)]
#[repr(u8)]
pub enum SensorUnit {
    None = 0x00,
    Centigrade = 0x01,
    VoltsDc = 0x02,
    VoltsAcPeak = 0x03,
    VoltsAcRms = 0x04,
    AmpereDc = 0x05,
    AmpereAcPeak = 0x06,
    AmpereAcRms = 0x07,
    Hertz = 0x08,
    Ohm = 0x09,
    Watt = 0x0a,
    Kilogram = 0x0b,
    Meter = 0x0c,
    Second = 0x15,
}

/// Decimal prefix applied to a sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, Display)]
#[repr(u8)]
pub enum SensorPrefix {
    None = 0x00,
    Deci = 0x01,
    Centi = 0x02,
    Milli = 0x03,
    Micro = 0x04,
    Kilo = 0x13,
    Mega = 0x14,
}

bitflags! {
    /// Recorded-value support flags of a sensor definition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct RecordedSupport: u8 {
        /// The sensor supports RECORD_SENSORS snapshots.
        const RECORDED_VALUE = 1 << 0;
        /// The sensor tracks lowest/highest detected values.
        const LOWEST_HIGHEST = 1 << 1;
    }
}
