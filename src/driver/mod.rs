// src/driver/mod.rs

//! Bus-owning side of the protocol: single exchanges with retries and the
//! round-robin scheduler built on top of them.

mod io_helpers;
pub mod request_cycle;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod mock;

pub use request_cycle::{CycleState, RequestCycle};
pub use scheduler::{MeasurementSink, PollingScheduler, RoundReport, Tick};

use crate::common::{
    address::SensorAddress,
    command::Command,
    config::CyclePolicy,
    error::{DecodingError, EncodingError},
    hal_traits::{LlsSerial, LlsTimer},
    measurement::{Measurement, DEFAULT_LEVEL_UNIT},
};
use core::fmt::Debug;
use core::time::Duration;

/// Classified reason an exchange produced no measurement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FailureKind {
    #[error("no response before timeout")]
    Timeout,
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("malformed frame")]
    MalformedFrame,
    #[error("response from another address")]
    AddressMismatch,
    #[error("unexpected command in response")]
    UnexpectedCommand,
    #[error("sensor exception {0:#04x}")]
    SensorException(u8),
    #[error("transport error")]
    Transport,
    #[error("request could not be encoded")]
    Encoding,
}

impl From<DecodingError> for FailureKind {
    fn from(err: DecodingError) -> Self {
        match err {
            DecodingError::Incomplete { .. } | DecodingError::Malformed { .. } => FailureKind::MalformedFrame,
            DecodingError::AddressMismatch { .. } => FailureKind::AddressMismatch,
            DecodingError::UnexpectedCommand { .. } => FailureKind::UnexpectedCommand,
            DecodingError::ChecksumFailure { .. } => FailureKind::ChecksumMismatch,
            DecodingError::SensorException(code) => FailureKind::SensorException(code),
        }
    }
}

impl From<EncodingError> for FailureKind {
    fn from(_: EncodingError) -> Self {
        FailureKind::Encoding
    }
}

/// A failed poll, with the number of requests actually sent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("{kind} after {attempts} attempt(s)")]
pub struct PollFailure {
    pub kind: FailureKind,
    pub attempts: u8,
}

/// Outcome of polling one address.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PollCycleResult {
    Measurement(Measurement),
    Failure(PollFailure),
}

impl PollCycleResult {
    pub(crate) fn failure(kind: FailureKind, attempts: u8) -> Self {
        PollCycleResult::Failure(PollFailure { kind, attempts })
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, PollCycleResult::Measurement(_))
    }

    pub fn measurement(&self) -> Option<&Measurement> {
        match self {
            PollCycleResult::Measurement(m) => Some(m),
            PollCycleResult::Failure(_) => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            PollCycleResult::Measurement(_) => None,
            PollCycleResult::Failure(f) => Some(f.kind),
        }
    }
}

/// Exclusive owner of one serial bus.
///
/// Every exchange needs `&mut self`, so two exchanges can never overlap on
/// the same transport.
#[derive(Debug)]
pub struct LlsDriver<IF>
where
    IF: LlsSerial + LlsTimer,
    IF::Error: Debug,
{
    interface: IF,
    level_unit: f32,
    exchanges: u64,
}

impl<IF> LlsDriver<IF>
where
    IF: LlsSerial + LlsTimer,
    IF::Error: Debug,
{
    pub fn new(interface: IF) -> Self {
        LlsDriver {
            interface,
            level_unit: DEFAULT_LEVEL_UNIT,
            exchanges: 0,
        }
    }

    /// Volume units per raw level count used when decoding levels.
    pub fn with_level_unit(mut self, level_unit: f32) -> Self {
        self.level_unit = level_unit;
        self
    }

    pub(crate) fn set_level_unit(&mut self, level_unit: f32) {
        self.level_unit = level_unit;
    }

    /// Runs one request/response exchange, retrying per `policy`.
    pub fn execute(
        &mut self,
        address: SensorAddress,
        command: Command,
        payload: &[u8],
        policy: &CyclePolicy,
    ) -> PollCycleResult {
        self.exchanges += 1;
        match RequestCycle::new(&mut self.interface, address, command, payload, *policy) {
            Ok(mut cycle) => cycle.execute(self.level_unit),
            Err(e) => {
                log::warn!("sensor {}: cannot encode {}: {}", address, command, e);
                PollCycleResult::failure(FailureKind::from(e), 0)
            }
        }
    }

    /// Number of exchanges started since the driver was created.
    #[inline]
    pub fn exchange_count(&self) -> u64 {
        self.exchanges
    }

    pub fn now(&self) -> IF::Instant {
        self.interface.now()
    }

    pub(crate) fn sleep(&mut self, duration: Duration) {
        let us = duration.as_micros().min(u128::from(u32::MAX)) as u32;
        if us > 0 {
            self.interface.delay_us(us);
        }
    }

    pub fn interface(&self) -> &IF {
        &self.interface
    }

    /// Gives the transport back to the host.
    pub fn release(self) -> IF {
        self.interface
    }
}
