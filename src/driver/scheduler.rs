// src/driver/scheduler.rs

use super::{FailureKind, LlsDriver, PollCycleResult};
use crate::common::{
    address::SensorAddress,
    command::Command,
    config::{CyclePolicy, DriverConfig, MAX_SENSORS},
    error::ConfigError,
    hal_traits::{LlsSerial, LlsTimer},
    measurement::Measurement,
    timing,
};
use arrayvec::ArrayVec;
use core::fmt::Debug;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use log::{debug, info, warn};

/// Receives poll results as the scheduler produces them.
pub trait MeasurementSink {
    /// Called once per configured address per round, in polling order.
    fn on_result(&mut self, address: SensorAddress, result: &PollCycleResult);

    /// Called after the last address of a round has been polled.
    fn on_round_complete(&mut self, _report: &RoundReport) {}
}

impl<F> MeasurementSink for F
where
    F: FnMut(SensorAddress, &PollCycleResult),
{
    fn on_result(&mut self, address: SensorAddress, result: &PollCycleResult) {
        self(address, result)
    }
}

/// Every address of one round mapped to its result.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoundReport {
    round: u32,
    results: ArrayVec<(SensorAddress, PollCycleResult), MAX_SENSORS>,
}

impl RoundReport {
    /// 1-based round number.
    #[inline]
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn get(&self, address: SensorAddress) -> Option<&PollCycleResult> {
        self.results.iter().find(|(a, _)| *a == address).map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(SensorAddress, PollCycleResult)> {
        self.results.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn successes(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.len() - self.successes()
    }
}

/// What a call to [`PollingScheduler::tick`] did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Not running; nothing was done.
    Stopped,
    /// Nothing due yet. Call again after at most this long.
    Waiting(Duration),
    /// One address was polled and more remain in the round.
    Polled(SensorAddress),
    /// The last address was polled; carries the round number.
    RoundComplete(u32),
}

/// Round-robin poller over one bus.
///
/// Cooperative: the host calls [`tick`](Self::tick) (or [`run`](Self::run))
/// and each call does at most one address worth of bus work. Waits between
/// addresses and rounds are deadlines only, so [`stop`](Self::stop) drops
/// them at once.
pub struct PollingScheduler<IF>
where
    IF: LlsSerial + LlsTimer,
    IF::Error: Debug,
{
    driver: LlsDriver<IF>,
    config: Option<DriverConfig>,
    policy: CyclePolicy,
    running: bool,
    next_index: usize,
    round_started: Option<IF::Instant>,
    next_due: Option<IF::Instant>,
    current: ArrayVec<(SensorAddress, PollCycleResult), MAX_SENSORS>,
    rounds: u32,
}

impl<IF> PollingScheduler<IF>
where
    IF: LlsSerial + LlsTimer,
    IF::Error: Debug,
{
    pub fn new(driver: LlsDriver<IF>) -> Self {
        PollingScheduler {
            driver,
            config: None,
            policy: CyclePolicy::default(),
            running: false,
            next_index: 0,
            round_started: None,
            next_due: None,
            current: ArrayVec::new(),
            rounds: 0,
        }
    }

    /// Validates `config` and starts polling; the first round is due at once.
    ///
    /// Does nothing while already running, including ignoring `config`.
    pub fn start(&mut self, config: &DriverConfig) -> Result<(), ConfigError> {
        if self.running {
            debug!("scheduler already running");
            return Ok(());
        }
        config.validate()?;

        self.driver.set_level_unit(config.level_unit);
        self.policy = config.cycle_policy();
        self.config = Some(config.clone());
        self.reset_round();
        self.next_due = None;
        self.running = true;
        info!(
            "polling {} sensor(s) every {} ms at {} baud",
            config.addresses.len(),
            config.poll_interval_ms,
            config.baud_rate
        );
        Ok(())
    }

    /// Stops polling. A partially polled round is dropped without a report.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.next_due = None;
        if self.next_index > 0 {
            debug!("abandoning round after {} address(es)", self.next_index);
        }
        self.reset_round();
        info!("polling stopped after {} round(s)", self.rounds);
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Polls the next address if it is due.
    pub fn tick<S: MeasurementSink>(&mut self, sink: &mut S) -> Tick {
        if !self.running {
            return Tick::Stopped;
        }
        let (address, commands, inter_sensor_delay, poll_interval, round_len) = match self.config.as_ref() {
            Some(config) => (
                config.addresses[self.next_index],
                config.commands.clone(),
                config.inter_sensor_delay(),
                config.poll_interval(),
                config.addresses.len(),
            ),
            None => return Tick::Stopped,
        };

        let now = self.driver.now();
        if let Some(due) = self.next_due {
            if now < due {
                return Tick::Waiting(due - now);
            }
        }
        let round_started = match self.round_started {
            Some(started) => started,
            None => {
                debug!("round {} started", self.rounds + 1);
                self.round_started = Some(now);
                now
            }
        };

        let result = self.poll_address(address, &commands);
        sink.on_result(address, &result);
        // Capacity matches the address list, which `validate` bounds.
        let pushed = self.current.try_push((address, result));
        debug_assert!(pushed.is_ok(), "round holds more results than addresses");
        self.next_index += 1;

        let after = self.driver.now();
        if self.next_index < round_len {
            self.next_due = Some(after + inter_sensor_delay);
            return Tick::Polled(address);
        }

        self.rounds = self.rounds.wrapping_add(1);
        let report = RoundReport {
            round: self.rounds,
            results: core::mem::take(&mut self.current),
        };
        debug!(
            "round {} complete: {} ok, {} failed",
            report.round,
            report.successes(),
            report.failures()
        );
        sink.on_round_complete(&report);

        let interval_end = round_started + poll_interval;
        if after > interval_end {
            warn!(
                "round {} took {:?}, longer than the {:?} poll interval",
                report.round,
                after - round_started,
                poll_interval
            );
        }
        self.next_due = Some(interval_end.max(after + inter_sensor_delay));
        self.reset_round();
        Tick::RoundComplete(report.round)
    }

    /// Ticks until `stop_flag` is raised, sleeping in short slices while
    /// waiting. Returns the number of rounds completed by this call.
    pub fn run<S: MeasurementSink>(&mut self, sink: &mut S, stop_flag: &AtomicBool) -> u32 {
        let first_round = self.rounds;
        loop {
            if stop_flag.load(Ordering::Acquire) {
                self.stop();
                break;
            }
            match self.tick(sink) {
                Tick::Stopped => break,
                Tick::Waiting(remaining) => self.driver.sleep(remaining.min(timing::STOP_CHECK_SLICE)),
                Tick::Polled(_) | Tick::RoundComplete(_) => {}
            }
        }
        self.rounds.wrapping_sub(first_round)
    }

    /// Runs every configured command against `address`; the first failure
    /// is the address's result.
    fn poll_address(&mut self, address: SensorAddress, commands: &[Command]) -> PollCycleResult {
        let mut merged: Option<Measurement> = None;
        for command in commands {
            match self.driver.execute(address, *command, command.default_payload(), &self.policy) {
                PollCycleResult::Measurement(m) => {
                    merged = Some(match merged {
                        Some(previous) => previous.merge(m),
                        None => m,
                    });
                }
                failure @ PollCycleResult::Failure(_) => return failure,
            }
        }
        match merged {
            Some(measurement) => PollCycleResult::Measurement(measurement),
            None => PollCycleResult::failure(FailureKind::Encoding, 0),
        }
    }

    fn reset_round(&mut self) {
        self.next_index = 0;
        self.round_started = None;
        self.current.clear();
    }

    /// Rounds completed since the scheduler was created.
    #[inline]
    pub fn rounds_completed(&self) -> u32 {
        self.rounds
    }

    /// Exchanges executed since the driver was created.
    #[inline]
    pub fn exchanges(&self) -> u64 {
        self.driver.exchange_count()
    }

    pub fn driver(&self) -> &LlsDriver<IF> {
        &self.driver
    }

    /// Stops polling and hands the driver back.
    pub fn release(mut self) -> LlsDriver<IF> {
        self.stop();
        self.driver
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::measurement::SensorStatus;
    use crate::driver::mock::{sensor_bank, MockBus};

    fn addr(value: u8) -> SensorAddress {
        SensorAddress::new(value).unwrap()
    }

    fn config(addresses: &[u8]) -> DriverConfig {
        let addresses: Vec<SensorAddress> = addresses.iter().map(|a| addr(*a)).collect();
        DriverConfig::new(&addresses)
            .unwrap()
            .with_response_timeout(Duration::from_millis(100))
            .with_inter_byte_timeout(Duration::from_millis(10))
            .with_max_retries(1)
            .with_poll_interval(Duration::from_secs(2))
    }

    fn scheduler(silent: &'static [u8]) -> PollingScheduler<MockBus> {
        PollingScheduler::new(LlsDriver::new(MockBus::new(sensor_bank(silent))))
    }

    #[derive(Default)]
    struct RecordingSink {
        results: Vec<(SensorAddress, PollCycleResult)>,
        reports: Vec<RoundReport>,
    }

    impl MeasurementSink for RecordingSink {
        fn on_result(&mut self, address: SensorAddress, result: &PollCycleResult) {
            self.results.push((address, *result));
        }

        fn on_round_complete(&mut self, report: &RoundReport) {
            self.reports.push(report.clone());
        }
    }

    /// Ticks until a round completes, advancing the mock clock through waits.
    fn complete_round(scheduler: &mut PollingScheduler<MockBus>, sink: &mut RecordingSink) -> u32 {
        loop {
            match scheduler.tick(sink) {
                Tick::RoundComplete(round) => return round,
                Tick::Waiting(remaining) => scheduler.driver.sleep(remaining),
                Tick::Polled(_) => {}
                Tick::Stopped => panic!("scheduler stopped mid-round"),
            }
        }
    }

    fn written_addresses(scheduler: &PollingScheduler<MockBus>) -> Vec<u8> {
        scheduler.driver().interface().writes.iter().map(|w| w[0]).collect()
    }

    #[test]
    fn test_silent_sensor_does_not_affect_neighbours() {
        let mut scheduler = scheduler(&[2]);
        let mut sink = RecordingSink::default();
        scheduler.start(&config(&[1, 2, 3])).unwrap();

        assert_eq!(complete_round(&mut scheduler, &mut sink), 1);
        assert_eq!(sink.results.len(), 3);

        let first = sink.results[0].1.measurement().copied().unwrap();
        assert!((first.fuel_level.unwrap() - 10.0).abs() < 1e-3);
        assert!((first.temperature.unwrap() - 25.0).abs() < 1e-3);
        assert_eq!(first.status, SensorStatus::Normal);

        assert_eq!(sink.results[1].1, PollCycleResult::failure(FailureKind::Timeout, 2));

        let third = sink.results[2].1.measurement().copied().unwrap();
        assert!((third.fuel_level.unwrap() - 30.0).abs() < 1e-3);

        let report = &sink.reports[0];
        assert_eq!(report.round(), 1);
        assert_eq!(report.len(), 3);
        assert_eq!(report.successes(), 2);
        assert_eq!(report.failures(), 1);
        assert_eq!(report.get(addr(2)).and_then(|r| r.failure_kind()), Some(FailureKind::Timeout));
    }

    #[test]
    fn test_addresses_polled_in_configured_order() {
        let mut scheduler = scheduler(&[2]);
        let mut sink = RecordingSink::default();
        scheduler.start(&config(&[3, 1, 2])).unwrap();
        complete_round(&mut scheduler, &mut sink);

        let order: Vec<u8> = sink.results.iter().map(|(a, _)| a.as_u8()).collect();
        assert_eq!(order, vec![3, 1, 2]);
        // Three commands each for 3 and 1; the silent sensor gets the first command twice.
        assert_eq!(written_addresses(&scheduler), vec![3, 3, 3, 1, 1, 1, 2, 2]);
    }

    #[test]
    fn test_inter_sensor_delay_between_addresses() {
        let mut scheduler = scheduler(&[]);
        let mut sink = RecordingSink::default();
        scheduler.start(&config(&[1, 2])).unwrap();

        assert_eq!(scheduler.tick(&mut sink), Tick::Polled(addr(1)));
        match scheduler.tick(&mut sink) {
            Tick::Waiting(remaining) => assert_eq!(remaining, Duration::from_millis(50)),
            other => panic!("expected a wait, got {:?}", other),
        }
    }

    #[test]
    fn test_start_is_idempotent_while_running() {
        let mut scheduler = scheduler(&[]);
        let mut sink = RecordingSink::default();
        scheduler.start(&config(&[1, 2])).unwrap();
        assert_eq!(scheduler.tick(&mut sink), Tick::Polled(addr(1)));

        // A second start neither restarts the round nor swaps the plan.
        assert_eq!(scheduler.start(&config(&[5])), Ok(()));
        assert!(matches!(scheduler.tick(&mut sink), Tick::Waiting(_)));
        scheduler.driver.sleep(Duration::from_millis(50));
        assert_eq!(scheduler.tick(&mut sink), Tick::RoundComplete(1));
    }

    #[test]
    fn test_invalid_config_does_not_start() {
        let mut scheduler = scheduler(&[]);
        let bad = config(&[1]).with_poll_interval(Duration::from_millis(10));
        assert!(matches!(scheduler.start(&bad), Err(ConfigError::PollIntervalTooShort { .. })));
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.tick(&mut RecordingSink::default()), Tick::Stopped);
    }

    #[test]
    fn test_stop_cancels_pending_wait() {
        let mut scheduler = scheduler(&[]);
        let mut sink = RecordingSink::default();
        scheduler.start(&config(&[1])).unwrap();
        complete_round(&mut scheduler, &mut sink);

        let writes = scheduler.driver().interface().writes.len();
        assert!(matches!(scheduler.tick(&mut sink), Tick::Waiting(_)));
        scheduler.stop();
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.tick(&mut sink), Tick::Stopped);
        assert_eq!(scheduler.driver().interface().writes.len(), writes);

        // Restarting polls straight away.
        scheduler.start(&config(&[1])).unwrap();
        assert_eq!(scheduler.tick(&mut sink), Tick::RoundComplete(2));
    }

    #[test]
    fn test_stop_mid_round_drops_partial_round() {
        let mut scheduler = scheduler(&[]);
        let mut sink = RecordingSink::default();
        scheduler.start(&config(&[1, 2, 3])).unwrap();
        assert_eq!(scheduler.tick(&mut sink), Tick::Polled(addr(1)));
        scheduler.stop();

        assert!(sink.reports.is_empty());
        assert_eq!(scheduler.rounds_completed(), 0);

        scheduler.start(&config(&[1, 2, 3])).unwrap();
        complete_round(&mut scheduler, &mut sink);
        assert_eq!(sink.reports[0].len(), 3);
    }

    #[test]
    fn test_next_round_waits_for_poll_interval() {
        let mut scheduler = scheduler(&[]);
        let mut sink = RecordingSink::default();
        scheduler.start(&config(&[1, 2])).unwrap();
        complete_round(&mut scheduler, &mut sink);
        complete_round(&mut scheduler, &mut sink);

        // Second round began exactly one interval after the first.
        let elapsed = scheduler.driver().interface().now_us;
        assert!(elapsed >= 2_000_000, "second round finished at {} us", elapsed);
        assert!(elapsed < 2_500_000, "second round finished at {} us", elapsed);
    }

    #[test]
    fn test_run_until_stop_flag() {
        struct StopAfter<'a> {
            flag: &'a AtomicBool,
            rounds: u32,
            results: usize,
        }
        impl MeasurementSink for StopAfter<'_> {
            fn on_result(&mut self, _address: SensorAddress, result: &PollCycleResult) {
                assert!(result.is_success());
                self.results += 1;
            }
            fn on_round_complete(&mut self, report: &RoundReport) {
                self.rounds = report.round();
                if report.round() == 2 {
                    self.flag.store(true, Ordering::Release);
                }
            }
        }

        let flag = AtomicBool::new(false);
        let mut sink = StopAfter { flag: &flag, rounds: 0, results: 0 };
        let mut scheduler = scheduler(&[]);
        scheduler.start(&config(&[1, 2, 3])).unwrap();

        assert_eq!(scheduler.run(&mut sink, &flag), 2);
        assert!(!scheduler.is_running());
        assert_eq!(sink.results, 6);
        assert_eq!(scheduler.driver().interface().writes.len(), 18);
        assert_eq!(scheduler.exchanges(), 18);
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        let mut sink = |address: SensorAddress, result: &PollCycleResult| seen.push((address.as_u8(), result.is_success()));
        let mut scheduler = scheduler(&[1]);
        scheduler.start(&config(&[1, 2])).unwrap();
        loop {
            match scheduler.tick(&mut sink) {
                Tick::RoundComplete(_) => break,
                Tick::Waiting(remaining) => scheduler.driver.sleep(remaining),
                _ => {}
            }
        }
        assert_eq!(seen, vec![(1, false), (2, true)]);
    }

    #[test]
    fn test_many_rounds_leave_no_residue() {
        let mut scheduler = scheduler(&[2]);
        let mut sink = RecordingSink::default();
        scheduler.start(&config(&[1, 2, 3])).unwrap();

        for round in 1..=50 {
            assert_eq!(complete_round(&mut scheduler, &mut sink), round);
        }

        let bus = scheduler.driver().interface();
        assert_eq!(bus.unflushed, 0);
        assert_eq!(bus.pending_bytes(), 0);
        assert_eq!(bus.writes.len(), 50 * 8);
        assert_eq!(scheduler.exchanges(), 50 * 7);
        assert_eq!(sink.results.len(), 150);
        assert!(sink.reports.iter().all(|r| r.len() == 3 && r.successes() == 2));
    }
}
