// src/lib.rs

#![cfg_attr(not(any(feature = "std", test)), no_std)]

pub mod common;
pub mod driver;

#[cfg(feature = "std")]
pub mod std_io;

// Re-export key types for convenience
pub use common::{Command, DriverConfig, LlsError, Measurement, SensorAddress, SensorStatus};
pub use driver::{FailureKind, LlsDriver, MeasurementSink, PollCycleResult, PollFailure, PollingScheduler, RoundReport, Tick};
