// src/common/mod.rs

// --- Declare all public modules within common ---
pub mod address;
pub mod command;
pub mod config;
pub mod crc;
pub mod error;
pub mod frame;
pub mod hal_traits;
pub mod measurement;
pub mod timing;

// --- Re-export key types/traits/functions for easier access ---

pub use address::SensorAddress;
pub use command::Command;
pub use config::{CyclePolicy, DriverConfig, MAX_SENSORS};
pub use crc::{calculate_crc16, decode_crc, encode_crc, verify_frame_crc};
pub use error::{ConfigError, DecodingError, EncodingError, LlsError};
pub use frame::{encode_exception_response, encode_request, encode_response, try_decode_response, RequestFrame, ResponseFrame};
pub use hal_traits::{LlsSerial, LlsTimer, MicrosInstant};
pub use measurement::{decode_measurement, Measurement, SensorFault, SensorStatus};

#[cfg(feature = "embedded-hal")]
pub use hal_traits::DelayTimer;
