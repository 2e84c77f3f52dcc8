// src/std_io.rs

//! Adapters for hosts with `std`: a monotonic clock and any blocking
//! `Read + Write` serial handle.

use crate::common::hal_traits::{LlsSerial, LlsTimer};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

/// [`LlsTimer`] backed by `std::time::Instant` and `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdTimer;

impl LlsTimer for StdTimer {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(u64::from(us)));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

/// Wraps an opened port so the driver can use it.
///
/// The port should be configured with a short read timeout. Reads that time
/// out, and `WouldBlock` or `Interrupted` errors, are reported as
/// `nb::Error::WouldBlock`.
#[derive(Debug)]
pub struct IoSerial<T, TM = StdTimer> {
    port: T,
    timer: TM,
}

impl<T> IoSerial<T, StdTimer>
where
    T: Read + Write,
{
    pub fn new(port: T) -> Self {
        IoSerial { port, timer: StdTimer }
    }
}

impl<T, TM> IoSerial<T, TM>
where
    T: Read + Write,
    TM: LlsTimer,
{
    pub fn with_timer(port: T, timer: TM) -> Self {
        IoSerial { port, timer }
    }

    pub fn port(&self) -> &T {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut T {
        &mut self.port
    }

    pub fn release(self) -> T {
        self.port
    }
}

fn map_io(err: io::Error) -> nb::Error<io::Error> {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => nb::Error::WouldBlock,
        _ => nb::Error::Other(err),
    }
}

impl<T, TM> LlsSerial for IoSerial<T, TM>
where
    T: Read + Write,
    TM: LlsTimer,
{
    type Error = io::Error;

    fn read(&mut self, buffer: &mut [u8]) -> nb::Result<usize, io::Error> {
        match self.port.read(buffer) {
            Ok(0) => Err(nb::Error::WouldBlock),
            Ok(n) => Ok(n),
            Err(e) => Err(map_io(e)),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> nb::Result<usize, io::Error> {
        match self.port.write(bytes) {
            Ok(0) if !bytes.is_empty() => Err(nb::Error::WouldBlock),
            Ok(n) => Ok(n),
            Err(e) => Err(map_io(e)),
        }
    }

    fn flush(&mut self) -> nb::Result<(), io::Error> {
        self.port.flush().map_err(map_io)
    }
}

impl<T, TM> LlsTimer for IoSerial<T, TM>
where
    TM: LlsTimer,
{
    type Instant = TM::Instant;

    fn now(&self) -> Self::Instant {
        self.timer.now()
    }

    fn delay_us(&mut self, us: u32) {
        self.timer.delay_us(us)
    }

    fn delay_ms(&mut self, ms: u32) {
        self.timer.delay_ms(ms)
    }
}
