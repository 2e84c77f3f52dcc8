// src/common/command.rs

//! LLS command set.
//!
//! Every command has a fixed request payload length and a fixed response
//! layout, so frame lengths never depend on a length field sent by the
//! sensor alone.

use core::fmt;

/// Register selector sent with the register-read commands.
pub const CURRENT_VALUE_REGISTER: [u8; 2] = [0x00, 0x00];

/// Bit set in the command echo of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// A request the driver can send to an LLS sensor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Read the current fuel level (`0x03`).
    ReadFuelLevel,
    /// Read the fuel temperature (`0x04`).
    ReadTemperature,
    /// Read the sensor status byte (`0x07`).
    ReadStatus,
}

/// Fixed frame layout of a command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CommandSchema {
    /// Function code carried in the second frame byte.
    pub code: u8,
    /// Number of payload bytes in the request.
    pub request_len: usize,
    /// Number of data bytes in the response.
    pub response_data_len: usize,
    /// Whether the response data is preceded by a byte-count field.
    pub counted: bool,
}

impl Command {
    /// All commands, in the order a full polling round issues them.
    pub const ALL: [Command; 3] = [
        Command::ReadFuelLevel,
        Command::ReadTemperature,
        Command::ReadStatus,
    ];

    pub const fn schema(&self) -> CommandSchema {
        match self {
            Command::ReadFuelLevel => CommandSchema {
                code: 0x03,
                request_len: 2,
                response_data_len: 2,
                counted: true,
            },
            Command::ReadTemperature => CommandSchema {
                code: 0x04,
                request_len: 2,
                response_data_len: 2,
                counted: true,
            },
            Command::ReadStatus => CommandSchema {
                code: 0x07,
                request_len: 0,
                response_data_len: 1,
                counted: false,
            },
        }
    }

    #[inline]
    pub const fn code(&self) -> u8 {
        self.schema().code
    }

    /// Looks up a command by its function code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|cmd| cmd.code() == code)
    }

    /// The payload a polling round sends with this command.
    pub fn default_payload(&self) -> &'static [u8] {
        match self {
            Command::ReadFuelLevel | Command::ReadTemperature => &CURRENT_VALUE_REGISTER,
            Command::ReadStatus => &[],
        }
    }

    /// Total length of a valid (non-exception) response frame, checksum included.
    pub const fn response_frame_len(&self) -> usize {
        let schema = self.schema();
        let count_field = if schema.counted { 1 } else { 0 };
        2 + count_field + schema.response_data_len + 2
    }

    /// Total length of the request frame, checksum included.
    pub const fn request_frame_len(&self) -> usize {
        2 + self.schema().request_len + 2
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::ReadFuelLevel => "read-fuel-level",
            Command::ReadTemperature => "read-temperature",
            Command::ReadStatus => "read-status",
        };
        write!(f, "{} ({:#04x})", name, self.code())
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique_and_round_trip() {
        for cmd in Command::ALL {
            assert_eq!(Command::from_code(cmd.code()), Some(cmd));
            assert_eq!(cmd.code() & EXCEPTION_FLAG, 0);
        }
        assert_eq!(Command::from_code(0x10), None);
    }

    #[test]
    fn test_frame_lengths() {
        assert_eq!(Command::ReadFuelLevel.request_frame_len(), 6);
        assert_eq!(Command::ReadFuelLevel.response_frame_len(), 7);
        assert_eq!(Command::ReadTemperature.response_frame_len(), 7);
        assert_eq!(Command::ReadStatus.request_frame_len(), 4);
        assert_eq!(Command::ReadStatus.response_frame_len(), 5);
    }

    #[test]
    fn test_default_payload_matches_schema() {
        for cmd in Command::ALL {
            assert_eq!(cmd.default_payload().len(), cmd.schema().request_len);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Command::ReadFuelLevel), "read-fuel-level (0x03)");
    }
}
