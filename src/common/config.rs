// src/common/config.rs

use super::address::SensorAddress;
use super::command::Command;
use super::error::ConfigError;
use super::measurement::DEFAULT_LEVEL_UNIT;
use super::timing;
use arrayvec::ArrayVec;
use core::time::Duration;

/// Most sensors a single driver instance polls.
pub const MAX_SENSORS: usize = 32;

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Retry and timing limits of one request/response exchange.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CyclePolicy {
    pub response_timeout: Duration,
    pub inter_byte_timeout: Duration,
    pub max_retries: u8,
    /// Air time of one byte, used to bound how long a write may take.
    pub byte_duration: Duration,
}

impl CyclePolicy {
    /// Upper bound on the wall time of one exchange, excluding settling.
    pub fn worst_case(&self) -> Duration {
        self.response_timeout.saturating_mul(u32::from(self.max_retries) + 1)
    }
}

impl Default for CyclePolicy {
    fn default() -> Self {
        CyclePolicy {
            response_timeout: timing::DEFAULT_RESPONSE_TIMEOUT,
            inter_byte_timeout: timing::DEFAULT_INTER_BYTE_TIMEOUT,
            max_retries: timing::DEFAULT_MAX_RETRIES,
            byte_duration: timing::byte_duration(timing::DEFAULT_BAUD_RATE),
        }
    }
}

/// Host-provided settings for one bus.
///
/// Durations are kept in milliseconds so the struct maps one-to-one onto a
/// configuration file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DriverConfig {
    pub baud_rate: u32,
    pub addresses: ArrayVec<SensorAddress, MAX_SENSORS>,
    pub poll_interval_ms: u64,
    pub inter_sensor_delay_ms: u64,
    pub response_timeout_ms: u64,
    /// `None` derives the silence gap from the baud rate.
    pub inter_byte_timeout_ms: Option<u64>,
    pub max_retries: u8,
    /// Commands issued to every sensor each round, in order.
    pub commands: ArrayVec<Command, 3>,
    /// Volume units per raw level count.
    pub level_unit: f32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            baud_rate: timing::DEFAULT_BAUD_RATE,
            addresses: ArrayVec::new(),
            poll_interval_ms: millis(timing::DEFAULT_POLL_INTERVAL),
            inter_sensor_delay_ms: millis(timing::DEFAULT_INTER_SENSOR_DELAY),
            response_timeout_ms: millis(timing::DEFAULT_RESPONSE_TIMEOUT),
            inter_byte_timeout_ms: None,
            max_retries: timing::DEFAULT_MAX_RETRIES,
            commands: ArrayVec::from(Command::ALL),
            level_unit: DEFAULT_LEVEL_UNIT,
        }
    }
}

impl DriverConfig {
    /// Default configuration polling the given addresses.
    pub fn new(addresses: &[SensorAddress]) -> Result<Self, ConfigError> {
        let mut config = DriverConfig::default();
        for address in addresses {
            config
                .addresses
                .try_push(*address)
                .map_err(|_| ConfigError::TooManySensors { max: MAX_SENSORS })?;
        }
        Ok(config)
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = millis(interval);
        self
    }

    pub fn with_inter_sensor_delay(mut self, delay: Duration) -> Self {
        self.inter_sensor_delay_ms = millis(delay);
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = millis(timeout);
        self
    }

    pub fn with_inter_byte_timeout(mut self, timeout: Duration) -> Self {
        self.inter_byte_timeout_ms = Some(millis(timeout));
        self
    }

    pub fn with_max_retries(mut self, max_retries: u8) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_commands(mut self, commands: &[Command]) -> Self {
        self.commands = commands.iter().copied().take(3).collect();
        self
    }

    pub fn with_level_unit(mut self, level_unit: f32) -> Self {
        self.level_unit = level_unit;
        self
    }

    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[inline]
    pub fn inter_sensor_delay(&self) -> Duration {
        Duration::from_millis(self.inter_sensor_delay_ms)
    }

    #[inline]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn inter_byte_timeout(&self) -> Duration {
        match self.inter_byte_timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => timing::frame_gap(self.baud_rate),
        }
    }

    pub fn cycle_policy(&self) -> CyclePolicy {
        CyclePolicy {
            response_timeout: self.response_timeout(),
            inter_byte_timeout: self.inter_byte_timeout(),
            max_retries: self.max_retries,
            byte_duration: timing::byte_duration(self.baud_rate),
        }
    }

    /// Bus time a round needs when every sensor answers on the first try.
    pub fn nominal_round_time(&self) -> Duration {
        let per_sensor = self
            .response_timeout()
            .saturating_mul(self.commands.len() as u32)
            .saturating_add(self.inter_sensor_delay());
        per_sensor.saturating_mul(self.addresses.len() as u32)
    }

    /// Shortest poll interval this configuration accepts.
    pub fn min_poll_interval(&self) -> Duration {
        self.nominal_round_time().max(timing::MIN_POLL_INTERVAL)
    }

    /// Checks every constraint the driver relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.addresses.is_empty() {
            return Err(ConfigError::NoAddresses);
        }
        for (i, address) in self.addresses.iter().enumerate() {
            if self.addresses[..i].contains(address) {
                return Err(ConfigError::DuplicateAddress(address.as_u8()));
            }
        }
        if self.commands.is_empty() {
            return Err(ConfigError::NoCommands);
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::ZeroBaudRate);
        }
        if self.response_timeout_ms == 0 {
            return Err(ConfigError::ZeroResponseTimeout);
        }
        if self.inter_byte_timeout() >= self.response_timeout() {
            return Err(ConfigError::InterByteTimeoutTooLong);
        }
        if !self.level_unit.is_finite() || self.level_unit <= 0.0 {
            return Err(ConfigError::InvalidLevelScale);
        }
        let min = self.min_poll_interval();
        if self.poll_interval() < min {
            return Err(ConfigError::PollIntervalTooShort {
                got_ms: self.poll_interval_ms,
                min_ms: millis(min),
            });
        }
        Ok(())
    }
}
