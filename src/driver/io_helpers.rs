// src/driver/io_helpers.rs

use super::request_cycle::{AttemptOutcome, RequestCycle};
use crate::common::{
    error::{DecodingError, LlsError},
    frame::{self, MAX_FRAME_LEN},
    hal_traits::{LlsSerial, LlsTimer},
    timing,
};
use arrayvec::ArrayVec;
use core::fmt::Debug;
use core::time::Duration;
use log::{debug, trace};
use nb::Result as NbResult;

/// Room for a frame plus whatever noise trails it.
const RX_BUFFER_LEN: usize = MAX_FRAME_LEN * 4;

/// Size of a single read from the transport.
const RX_CHUNK_LEN: usize = 16;

// Implementation block for I/O related helpers
impl<IF> RequestCycle<'_, IF>
where
    IF: LlsSerial + LlsTimer,
    IF::Error: Debug,
{
    /// Executes a non-blocking I/O operation (`f`) repeatedly until it
    /// stops returning `WouldBlock`, returning the final result or a timeout error.
    pub(super) fn execute_blocking_io_with_timeout<FN, T>(
        &mut self,
        timeout: Duration,
        mut f: FN,
    ) -> Result<T, LlsError<IF::Error>>
    where
        FN: FnMut(&mut IF) -> NbResult<T, IF::Error>,
    {
        let deadline = self.interface.now() + timeout;

        loop {
            match f(&mut *self.interface) {
                Ok(result) => return Ok(result),
                Err(nb::Error::WouldBlock) => {
                    if self.interface.now() >= deadline {
                        return Err(LlsError::Timeout);
                    }
                    self.pause_until(deadline);
                }
                Err(nb::Error::Other(e)) => return Err(LlsError::Io(e)),
            }
        }
    }

    /// Writes the whole request frame and flushes it onto the line.
    pub(super) fn send_request(&mut self, deadline: IF::Instant) -> Result<(), LlsError<IF::Error>> {
        let request = self.request.clone();
        let bytes = request.as_bytes();

        let air_time = self.policy.byte_duration * bytes.len() as u32 + timing::WRITE_SLACK;
        let write_timeout = air_time.min(self.remaining(deadline));

        let mut written = 0;
        while written < bytes.len() {
            let chunk = &bytes[written..];
            let accepted = self.execute_blocking_io_with_timeout(write_timeout, |iface| iface.write(chunk))?;
            written += accepted;
        }

        self.execute_blocking_io_with_timeout(write_timeout, |iface| iface.flush())
    }

    /// Collects bytes until a frame decodes, the line goes quiet mid-frame,
    /// or `deadline` passes.
    ///
    /// Bytes after a decoded frame are dropped with the buffer.
    pub(super) fn await_response(&mut self, deadline: IF::Instant) -> Result<AttemptOutcome, LlsError<IF::Error>> {
        let address = self.request.address();
        let command = self.request.command();
        let gap = self.policy.inter_byte_timeout;

        let mut buffer: ArrayVec<u8, RX_BUFFER_LEN> = ArrayVec::new();
        let mut chunk = [0u8; RX_CHUNK_LEN];
        let mut last_byte_at: Option<IF::Instant> = None;

        loop {
            match self.interface.read(&mut chunk) {
                Ok(n) if n > 0 => {
                    let n = n.min(chunk.len());
                    trace!("sensor {}: rx {:02x?}", address, &chunk[..n]);
                    last_byte_at = Some(self.interface.now());

                    if buffer.try_extend_from_slice(&chunk[..n]).is_err() {
                        debug!("sensor {}: receive buffer overflow", address);
                        return Ok(AttemptOutcome::Rejected(DecodingError::Malformed {
                            declared: buffer.len() as u8,
                            expected: command.response_frame_len() as u8,
                        }));
                    }

                    match frame::try_decode_response(&buffer, address, command) {
                        Ok(decoded) => {
                            if decoded.consumed < buffer.len() {
                                debug!(
                                    "sensor {}: ignoring {} bytes after frame",
                                    address,
                                    buffer.len() - decoded.consumed
                                );
                            }
                            return Ok(AttemptOutcome::Completed(decoded.frame));
                        }
                        Err(DecodingError::Incomplete { .. }) => {}
                        Err(err) => return Ok(AttemptOutcome::Rejected(err)),
                    }
                }
                Ok(_) | Err(nb::Error::WouldBlock) => {
                    let now = self.interface.now();
                    if let Some(last) = last_byte_at {
                        if now - last >= gap {
                            return Ok(AttemptOutcome::Truncated(buffer.len()));
                        }
                    }
                    if now >= deadline {
                        return Ok(AttemptOutcome::TimedOut);
                    }
                    self.pause_until(deadline);
                }
                Err(nb::Error::Other(e)) => return Err(LlsError::Io(e)),
            }
        }
    }

    /// Discards bytes until the line has been quiet for one inter-byte
    /// timeout, or until `deadline`. Returns the number of bytes dropped.
    pub(super) fn settle_line(&mut self, deadline: IF::Instant) -> Result<usize, LlsError<IF::Error>> {
        let gap = self.policy.inter_byte_timeout;
        let mut chunk = [0u8; RX_CHUNK_LEN];
        let mut quiet_since = self.interface.now();
        let mut dropped = 0;

        loop {
            match self.interface.read(&mut chunk) {
                Ok(n) if n > 0 => {
                    dropped += n.min(chunk.len());
                    quiet_since = self.interface.now();
                }
                Ok(_) | Err(nb::Error::WouldBlock) => {
                    let now = self.interface.now();
                    if now - quiet_since >= gap || now >= deadline {
                        return Ok(dropped);
                    }
                    let quiet_at = quiet_since + gap;
                    self.pause_until(quiet_at.min(deadline));
                }
                Err(nb::Error::Other(e)) => return Err(LlsError::Io(e)),
            }
        }
    }

    fn remaining(&self, deadline: IF::Instant) -> Duration {
        deadline - self.interface.now()
    }

    /// Sleeps one receive step, never past `until`.
    fn pause_until(&mut self, until: IF::Instant) {
        let step = timing::RECEIVE_POLL_STEP.min(self.remaining(until));
        let us = step.as_micros() as u32;
        self.interface.delay_us(us.max(1));
    }
}
