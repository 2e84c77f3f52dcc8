// src/common/hal_traits.rs

use core::fmt::Debug;
use core::ops::{Add, Sub};
use core::time::Duration;

/// Point in time as reported by an [`LlsTimer`].
pub trait LlsInstant: Copy + Ord + Debug + Add<Duration, Output = Self> + Sub<Self, Output = Duration> {}

impl<T> LlsInstant for T where T: Copy + Ord + Debug + Add<Duration, Output = T> + Sub<T, Output = Duration> {}

/// Abstraction for the clock and delay operations the driver needs.
pub trait LlsTimer {
    type Instant: LlsInstant;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Delay for at least the specified number of microseconds.
    fn delay_us(&mut self, us: u32);

    /// Delay for at least the specified number of milliseconds.
    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1_000);
        }
    }
}

/// Abstraction for an already-opened, byte-oriented serial channel.
///
/// The driver owns the channel exclusively while it runs. Opening and
/// closing the port is the host's job.
pub trait LlsSerial {
    /// Associated error type for communication errors.
    type Error: Debug;

    /// Attempts to read whatever bytes have arrived into `buffer`.
    ///
    /// Returns `Ok(n)` with `n > 0` for a chunk of any size, or
    /// `Err(nb::Error::WouldBlock)` if nothing is available yet. `Ok(0)` is
    /// treated like `WouldBlock`.
    fn read(&mut self, buffer: &mut [u8]) -> nb::Result<usize, Self::Error>;

    /// Attempts to queue `bytes` for transmission.
    ///
    /// Returns the number of bytes accepted, or `Err(nb::Error::WouldBlock)`
    /// if the transmit buffer is full.
    fn write(&mut self, bytes: &[u8]) -> nb::Result<usize, Self::Error>;

    /// Attempts to flush the transmit buffer, ensuring all written bytes have been sent.
    fn flush(&mut self) -> nb::Result<(), Self::Error>;
}

/// Microseconds since an arbitrary epoch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MicrosInstant(pub u64);

impl Add<Duration> for MicrosInstant {
    type Output = Self;
    fn add(self, rhs: Duration) -> Self {
        MicrosInstant(self.0.saturating_add(rhs.as_micros() as u64))
    }
}

impl Sub<MicrosInstant> for MicrosInstant {
    type Output = Duration;
    fn sub(self, rhs: MicrosInstant) -> Duration {
        Duration::from_micros(self.0.saturating_sub(rhs.0))
    }
}

/// [`LlsTimer`] built from an `embedded-hal` delay and a microsecond clock.
///
/// `clock` must be monotonic; a free-running hardware timer works.
#[cfg(feature = "embedded-hal")]
pub struct DelayTimer<D, C> {
    delay: D,
    clock: C,
}

#[cfg(feature = "embedded-hal")]
impl<D, C> DelayTimer<D, C>
where
    D: embedded_hal::delay::DelayNs,
    C: Fn() -> u64,
{
    pub fn new(delay: D, clock: C) -> Self {
        DelayTimer { delay, clock }
    }

    pub fn release(self) -> (D, C) {
        (self.delay, self.clock)
    }
}

#[cfg(feature = "embedded-hal")]
impl<D, C> LlsTimer for DelayTimer<D, C>
where
    D: embedded_hal::delay::DelayNs,
    C: Fn() -> u64,
{
    type Instant = MicrosInstant;

    fn now(&self) -> MicrosInstant {
        MicrosInstant((self.clock)())
    }

    fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }
}
