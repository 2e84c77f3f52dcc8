// src/common/measurement.rs

use super::command::Command;
use super::frame::ResponseFrame;
use core::fmt;

/// Volume units per raw level count, unless configured otherwise.
pub const DEFAULT_LEVEL_UNIT: f32 = 0.1;

/// Raw level values from here up are sensor error sentinels.
pub const LEVEL_RAW_RESERVED_START: u16 = 0xFFF0;

/// Valid raw temperature range, in tenths of a degree Celsius.
pub const TEMPERATURE_RAW_MIN: i16 = -600;
pub const TEMPERATURE_RAW_MAX: i16 = 850;

/// Why a sensor reading cannot be trusted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorFault {
    /// Level register holds a reserved/error value.
    LevelOutOfRange(u16),
    /// Temperature register is outside the sensor's operating range.
    TemperatureOutOfRange(i16),
    /// Status byte reports a broken measuring element.
    MeasuringElement,
    /// Status byte reports supply voltage out of range.
    SupplyVoltage,
    /// Status byte uses an undefined bit pattern.
    ReservedStatus(u8),
}

/// Health reported alongside a measurement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorStatus {
    #[default]
    Normal,
    NotCalibrated,
    SensorFault(SensorFault),
}

impl SensorStatus {
    /// Maps the raw status byte of a `ReadStatus` response.
    pub fn from_status_byte(byte: u8) -> Self {
        match byte {
            0x00 => SensorStatus::Normal,
            0x01 => SensorStatus::NotCalibrated,
            0x02 => SensorStatus::SensorFault(SensorFault::MeasuringElement),
            0x04 => SensorStatus::SensorFault(SensorFault::SupplyVoltage),
            other => SensorStatus::SensorFault(SensorFault::ReservedStatus(other)),
        }
    }

    #[inline]
    pub fn is_fault(&self) -> bool {
        matches!(self, SensorStatus::SensorFault(_))
    }

    fn severity(&self) -> u8 {
        match self {
            SensorStatus::Normal => 0,
            SensorStatus::NotCalibrated => 1,
            SensorStatus::SensorFault(_) => 2,
        }
    }
}

/// Typed reading of one sensor.
///
/// A single command fills only its own field; [`Measurement::merge`]
/// combines the commands of a polling round into one value.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Measurement {
    /// Fuel volume, in configured volume units. Never negative.
    pub fuel_level: Option<f32>,
    /// Fuel temperature in degrees Celsius, one decimal place.
    pub temperature: Option<f32>,
    pub status: SensorStatus,
}

impl Measurement {
    /// Combines two partial measurements of the same sensor.
    ///
    /// Values from `other` fill in what `self` lacks. The more severe status
    /// wins; between two faults the first one is kept.
    pub fn merge(self, other: Measurement) -> Measurement {
        let status = if other.status.severity() > self.status.severity() {
            other.status
        } else {
            self.status
        };
        Measurement {
            fuel_level: self.fuel_level.or(other.fuel_level),
            temperature: self.temperature.or(other.temperature),
            status,
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fuel_level {
            Some(level) => write!(f, "level={:.1}", level)?,
            None => write!(f, "level=-")?,
        }
        match self.temperature {
            Some(temp) => write!(f, " temp={:.1}C", temp)?,
            None => write!(f, " temp=-")?,
        }
        write!(f, " status={:?}", self.status)
    }
}

/// Converts a validated response into typed units.
///
/// Pure: reserved or out-of-range values become a `SensorFault` status
/// instead of an error. `level_unit` is the volume per raw level count.
pub fn decode_measurement(frame: &ResponseFrame, command: Command, level_unit: f32) -> Measurement {
    let data = frame.data();
    match command {
        Command::ReadFuelLevel => match data {
            [hi, lo] => decode_level(u16::from_be_bytes([*hi, *lo]), level_unit),
            _ => fault(SensorFault::LevelOutOfRange(0)),
        },
        Command::ReadTemperature => match data {
            [hi, lo] => decode_temperature(i16::from_be_bytes([*hi, *lo])),
            _ => fault(SensorFault::TemperatureOutOfRange(0)),
        },
        Command::ReadStatus => match data {
            [status] => Measurement {
                status: SensorStatus::from_status_byte(*status),
                ..Measurement::default()
            },
            _ => fault(SensorFault::ReservedStatus(0xFF)),
        },
    }
}

fn decode_level(raw: u16, level_unit: f32) -> Measurement {
    if raw >= LEVEL_RAW_RESERVED_START {
        return fault(SensorFault::LevelOutOfRange(raw));
    }
    Measurement {
        fuel_level: Some(f32::from(raw) * level_unit),
        ..Measurement::default()
    }
}

fn decode_temperature(raw: i16) -> Measurement {
    if !(TEMPERATURE_RAW_MIN..=TEMPERATURE_RAW_MAX).contains(&raw) {
        return fault(SensorFault::TemperatureOutOfRange(raw));
    }
    Measurement {
        temperature: Some(f32::from(raw) / 10.0),
        ..Measurement::default()
    }
}

fn fault(reason: SensorFault) -> Measurement {
    Measurement {
        status: SensorStatus::SensorFault(reason),
        ..Measurement::default()
    }
}
