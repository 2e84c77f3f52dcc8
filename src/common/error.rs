// src/common/error.rs

use super::command::Command;

/// Errors raised while building an outgoing request frame.
///
/// These are programmer errors (bad address or payload passed in) and are
/// never retried.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum EncodingError {
    /// Address outside the bus range 1..=247.
    #[error("invalid sensor address: {0}")]
    InvalidAddress(u8),

    /// Payload length does not match the command's fixed schema.
    #[error("payload for {command:?} must be {expected} bytes, got {got}")]
    PayloadLength { command: Command, expected: usize, got: usize },

    /// Response data does not fit the command's response schema.
    #[error("response data for {command:?} must be {expected} bytes, got {got}")]
    ResponseLength { command: Command, expected: usize, got: usize },
}

/// Frame-level classification of a received byte buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DecodingError {
    /// Not enough bytes yet; keep buffering.
    #[error("incomplete frame: need {needed} bytes, have {got}")]
    Incomplete { needed: usize, got: usize },

    /// Leading address byte names a different sensor.
    #[error("address mismatch: expected {expected}, received {received}")]
    AddressMismatch { expected: u8, received: u8 },

    /// Command echo byte is not the one the request implies.
    #[error("unexpected command: expected {expected:#04x}, received {received:#04x}")]
    UnexpectedCommand { expected: u8, received: u8 },

    /// Transmitted checksum does not match the recomputed one.
    #[error("checksum failure: received {received:#06x}, calculated {calculated:#06x}")]
    ChecksumFailure { received: u16, calculated: u16 },

    /// Checksum is intact but the declared structure disagrees with the schema.
    #[error("malformed frame: declared {declared} data bytes, expected {expected}")]
    Malformed { declared: u8, expected: u8 },

    /// Sensor answered with an exception response.
    #[error("sensor exception code {0:#04x}")]
    SensorException(u8),
}

/// Rejected driver configuration.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("no sensor addresses configured")]
    NoAddresses,

    #[error("sensor address {0} configured more than once")]
    DuplicateAddress(u8),

    #[error("too many sensors: at most {max} per bus")]
    TooManySensors { max: usize },

    #[error("no commands configured for a polling round")]
    NoCommands,

    #[error("poll interval {got_ms} ms is below the minimum of {min_ms} ms")]
    PollIntervalTooShort { got_ms: u64, min_ms: u64 },

    #[error("response timeout must be greater than zero")]
    ZeroResponseTimeout,

    #[error("inter-byte timeout must be shorter than the response timeout")]
    InterByteTimeoutTooLong,

    #[error("baud rate must be greater than zero")]
    ZeroBaudRate,

    #[error("level unit factor must be finite and positive")]
    InvalidLevelScale,
}

/// I/O-level error of a single exchange, generic over the transport error.
#[derive(Debug, thiserror::Error)]
pub enum LlsError<E = ()>
where
    E: core::fmt::Debug,
{
    /// Underlying error from the transport implementation.
    #[error("I/O error: {0:?}")]
    Io(E),

    /// No byte arrived (or could be written) within the allotted time.
    #[error("operation timed out")]
    Timeout,

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Decoding(#[from] DecodingError),
}
