// src/common/timing.rs

use core::time::Duration;

// Defaults suit an LLS sensor on RS-485 at 19200 baud. The host may
// override all of them through `DriverConfig`.

// === Serial Line ===

/// Default line speed of LLS sensors.
pub const DEFAULT_BAUD_RATE: u32 = 19_200;
/// Bits on the wire per byte: 1 start + 8 data + 1 stop (8N1).
pub const BITS_PER_BYTE: u32 = 10;
/// Silence, in character times, that ends a frame.
pub const FRAME_GAP_CHARS: u32 = 4; // 3.5 rounded up

// === Exchange Timing ===

/// Time allowed from the end of a request until a complete response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);
/// Silence after the last received byte that marks a frame as complete.
pub const DEFAULT_INTER_BYTE_TIMEOUT: Duration = Duration::from_millis(20);
/// Extra attempts after the first one for a failed exchange.
pub const DEFAULT_MAX_RETRIES: u8 = 2;
/// Granularity of the receive loop while waiting for bytes.
pub const RECEIVE_POLL_STEP: Duration = Duration::from_micros(500);
/// Allowance for draining the transmit buffer, on top of the bytes' own air time.
pub const WRITE_SLACK: Duration = Duration::from_millis(20);

// === Scheduling ===

/// Default time between the starts of two polling rounds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Lower bound for the poll interval, whatever the bus size.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Default bus rest time between two sensors of a round.
pub const DEFAULT_INTER_SENSOR_DELAY: Duration = Duration::from_millis(50);
/// Longest single sleep of the `run` loop, so a stop request is seen promptly.
pub const STOP_CHECK_SLICE: Duration = Duration::from_millis(10);

/// Air time of one byte at `baud_rate` (8N1).
pub fn byte_duration(baud_rate: u32) -> Duration {
    let baud = u64::from(baud_rate.max(1));
    Duration::from_micros(u64::from(BITS_PER_BYTE) * 1_000_000 / baud)
}

/// Silence that reliably marks the end of a frame at `baud_rate`.
///
/// Never shorter than [`DEFAULT_INTER_BYTE_TIMEOUT`]; slow lines get the
/// 3.5 character rule instead.
pub fn frame_gap(baud_rate: u32) -> Duration {
    let by_chars = byte_duration(baud_rate) * FRAME_GAP_CHARS;
    by_chars.max(DEFAULT_INTER_BYTE_TIMEOUT)
}
