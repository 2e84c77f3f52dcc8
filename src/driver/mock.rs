// src/driver/mock.rs

//! Simulated half-duplex bus shared by the driver tests.

use crate::common::{
    address::SensorAddress,
    command::Command,
    frame::encode_response,
    hal_traits::{LlsSerial, LlsTimer, MicrosInstant},
};
use nb::Result as NbResult;

// --- Mock Comm Error ---
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct MockCommError;

/// Replies to a flushed request: `(delay after flush in µs, bytes)`.
pub(crate) type Responder = Box<dyn FnMut(&[u8]) -> Vec<(u64, Vec<u8>)>>;

// --- Mock Interface ---
pub(crate) struct MockBus {
    pub now_us: u64,
    /// Flushed frames, in order.
    pub writes: Vec<Vec<u8>>,
    /// Bytes written but not flushed yet.
    pub unflushed: usize,
    pub flush_count: usize,
    pub fail_writes: bool,
    pub fail_reads: bool,
    /// Most bytes a single `write` call accepts.
    pub max_write_chunk: usize,
    tx: Vec<u8>,
    /// `(ready_at_us, bytes)`, kept sorted by ready time.
    pending: Vec<(u64, Vec<u8>)>,
    responder: Responder,
}

impl MockBus {
    pub fn new<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<(u64, Vec<u8>)> + 'static,
    {
        MockBus {
            now_us: 0,
            writes: Vec::new(),
            unflushed: 0,
            flush_count: 0,
            fail_writes: false,
            fail_reads: false,
            max_write_chunk: usize::MAX,
            tx: Vec::new(),
            pending: Vec::new(),
            responder: Box::new(responder),
        }
    }

    /// Schedules unsolicited bytes to arrive at absolute time `at_us`.
    pub fn inject(&mut self, at_us: u64, bytes: &[u8]) {
        let index = self.pending.partition_point(|(ready, _)| *ready <= at_us);
        self.pending.insert(index, (at_us, bytes.to_vec()));
    }

    /// Bytes still scheduled to arrive.
    pub fn pending_bytes(&self) -> usize {
        self.pending.iter().map(|(_, bytes)| bytes.len()).sum()
    }
}

impl LlsTimer for MockBus {
    type Instant = MicrosInstant;

    fn now(&self) -> MicrosInstant {
        MicrosInstant(self.now_us)
    }

    fn delay_us(&mut self, us: u32) {
        self.now_us += u64::from(us);
    }
}

impl LlsSerial for MockBus {
    type Error = MockCommError;

    fn read(&mut self, buffer: &mut [u8]) -> NbResult<usize, Self::Error> {
        if self.fail_reads {
            return Err(nb::Error::Other(MockCommError));
        }
        match self.pending.first_mut() {
            Some((ready, bytes)) if *ready <= self.now_us => {
                let n = bytes.len().min(buffer.len());
                buffer[..n].copy_from_slice(&bytes[..n]);
                bytes.drain(..n);
                if bytes.is_empty() {
                    self.pending.remove(0);
                }
                Ok(n)
            }
            _ => Err(nb::Error::WouldBlock),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> NbResult<usize, Self::Error> {
        if self.fail_writes {
            return Err(nb::Error::Other(MockCommError));
        }
        let n = bytes.len().min(self.max_write_chunk);
        self.tx.extend_from_slice(&bytes[..n]);
        self.unflushed += n;
        Ok(n)
    }

    fn flush(&mut self) -> NbResult<(), Self::Error> {
        self.flush_count += 1;
        if self.tx.is_empty() {
            return Ok(());
        }
        let frame = core::mem::take(&mut self.tx);
        self.unflushed = 0;
        for (delay, bytes) in (self.responder)(&frame) {
            self.inject(self.now_us + delay, &bytes);
        }
        self.writes.push(frame);
        Ok(())
    }
}

/// Fuel level response to `request`, echoing its address.
pub(crate) fn level_reply(request: &[u8], raw: u16) -> Vec<u8> {
    let address = SensorAddress::new(request[0]).unwrap();
    encode_response(address, Command::ReadFuelLevel, &raw.to_be_bytes())
        .unwrap()
        .to_vec()
}

/// Responder for a bus of well-behaved sensors.
///
/// Every address answers after 2 ms with level `address * 100`, 25.0 °C and
/// a normal status, except the ones listed in `silent`.
pub(crate) fn sensor_bank(silent: &'static [u8]) -> impl FnMut(&[u8]) -> Vec<(u64, Vec<u8>)> {
    move |request: &[u8]| {
        let raw_address = request[0];
        if silent.contains(&raw_address) {
            return Vec::new();
        }
        let address = SensorAddress::new(raw_address).unwrap();
        let reply = match Command::from_code(request[1]) {
            Some(Command::ReadFuelLevel) => {
                encode_response(address, Command::ReadFuelLevel, &(u16::from(raw_address) * 100).to_be_bytes())
            }
            Some(Command::ReadTemperature) => encode_response(address, Command::ReadTemperature, &250i16.to_be_bytes()),
            Some(Command::ReadStatus) => encode_response(address, Command::ReadStatus, &[0x00]),
            None => return Vec::new(),
        };
        vec![(2_000, reply.unwrap().to_vec())]
    }
}
