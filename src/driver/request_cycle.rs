// src/driver/request_cycle.rs

use super::{FailureKind, PollCycleResult};
use crate::common::{
    address::SensorAddress,
    command::Command,
    config::CyclePolicy,
    error::{DecodingError, EncodingError, LlsError},
    frame::{self, RequestFrame, ResponseFrame},
    hal_traits::{LlsSerial, LlsTimer},
    measurement::decode_measurement,
};
use core::fmt::Debug;
use log::{debug, trace, warn};

/// Address mismatches tolerated before the exchange gives up.
const MAX_ADDRESS_MISMATCHES: u8 = 2;

/// Where an exchange currently stands.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Sent,
    AwaitingResponse,
    Completed,
    TimedOut,
    Failed,
}

/// How a single attempt ended, short of a transport error.
#[derive(Debug)]
pub(super) enum AttemptOutcome {
    Completed(ResponseFrame),
    TimedOut,
    Rejected(DecodingError),
    /// Bytes arrived, then the line went quiet before a frame was complete.
    Truncated(usize),
}

/// One write-then-await exchange with a sensor.
///
/// Short-lived: all retry state lives here and is dropped with the cycle.
pub struct RequestCycle<'a, IF>
where
    IF: LlsSerial + LlsTimer,
    IF::Error: Debug,
{
    pub(super) interface: &'a mut IF,
    pub(super) request: RequestFrame,
    pub(super) policy: CyclePolicy,
    state: CycleState,
    attempts: u8,
    address_mismatches: u8,
}

impl<'a, IF> RequestCycle<'a, IF>
where
    IF: LlsSerial + LlsTimer,
    IF::Error: Debug,
{
    /// Encodes the request. Fails without touching the bus if the request is invalid.
    pub fn new(
        interface: &'a mut IF,
        address: SensorAddress,
        command: Command,
        payload: &[u8],
        policy: CyclePolicy,
    ) -> Result<Self, EncodingError> {
        let request = frame::encode_request(address, command, payload)?;
        Ok(RequestCycle {
            interface,
            request,
            policy,
            state: CycleState::Idle,
            attempts: 0,
            address_mismatches: 0,
        })
    }

    #[inline]
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Requests sent so far.
    #[inline]
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    pub fn request(&self) -> &RequestFrame {
        &self.request
    }

    /// Drives the exchange to a terminal state.
    ///
    /// Timeouts, checksum failures and malformed frames are retried up to
    /// `max_retries` times with the identical frame. A second address
    /// mismatch, a sensor exception or a transport error end the exchange
    /// at once.
    pub fn execute(&mut self, level_unit: f32) -> PollCycleResult {
        let max_attempts = u16::from(self.policy.max_retries) + 1;
        let address = self.request.address();
        let command = self.request.command();
        let mut last_failure = FailureKind::Timeout;

        while u16::from(self.attempts) < max_attempts {
            // The attempt's timer covers settling, sending and waiting.
            let deadline = self.interface.now() + self.policy.response_timeout;

            // Bytes still trailing the previous exchange or attempt must not
            // reach this one.
            self.state = CycleState::Idle;
            match self.settle_line(deadline) {
                Ok(0) => {}
                Ok(late) => debug!("sensor {}: discarded {} stale bytes before sending", address, late),
                Err(e) => return self.transport_failure(e),
            }

            self.attempts += 1;
            if let Err(e) = self.send_request(deadline) {
                return self.transport_failure(e);
            }
            self.state = CycleState::Sent;
            trace!("sensor {}: sent {:02x?}", address, self.request.as_bytes());

            self.state = CycleState::AwaitingResponse;
            let outcome = match self.await_response(deadline) {
                Ok(outcome) => outcome,
                Err(e) => return self.transport_failure(e),
            };

            match outcome {
                AttemptOutcome::Completed(response) => {
                    self.state = CycleState::Completed;
                    let measurement = decode_measurement(&response, command, level_unit);
                    debug!(
                        "sensor {}: {} ok after {} attempt(s): {}",
                        address, command, self.attempts, measurement
                    );
                    return PollCycleResult::Measurement(measurement);
                }
                AttemptOutcome::TimedOut => {
                    self.state = CycleState::TimedOut;
                    last_failure = FailureKind::Timeout;
                }
                AttemptOutcome::Truncated(received) => {
                    self.state = CycleState::Failed;
                    debug!("sensor {}: frame cut off after {} bytes", address, received);
                    last_failure = FailureKind::MalformedFrame;
                }
                AttemptOutcome::Rejected(err) => {
                    self.state = CycleState::Failed;
                    debug!("sensor {}: {} rejected: {}", address, command, err);
                    last_failure = FailureKind::from(err);

                    match err {
                        DecodingError::AddressMismatch { .. } => {
                            self.address_mismatches += 1;
                            if self.address_mismatches >= MAX_ADDRESS_MISMATCHES {
                                return self.give_up(last_failure);
                            }
                        }
                        DecodingError::SensorException(_) => return self.give_up(last_failure),
                        _ => {}
                    }
                }
            }

            if u16::from(self.attempts) < max_attempts {
                debug!(
                    "sensor {}: retrying {} ({}/{}) after {}",
                    address, command, self.attempts, max_attempts, last_failure
                );
            }
        }

        self.give_up(last_failure)
    }

    fn give_up(&mut self, kind: FailureKind) -> PollCycleResult {
        warn!(
            "sensor {}: {} failed after {} attempt(s): {}",
            self.request.address(),
            self.request.command(),
            self.attempts,
            kind
        );
        PollCycleResult::failure(kind, self.attempts)
    }

    fn transport_failure(&mut self, err: LlsError<IF::Error>) -> PollCycleResult {
        self.state = CycleState::Failed;
        warn!(
            "sensor {}: transport error during {}: {}",
            self.request.address(),
            self.request.command(),
            err
        );
        PollCycleResult::failure(FailureKind::Transport, self.attempts)
    }
}
