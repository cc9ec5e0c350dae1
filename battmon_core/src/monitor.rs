//! The per-cycle measurement/shutdown pipeline (`Monitor`).
//!
//! Each cycle: cancellation check, timestamps, battery and sensor sampling,
//! moving-average filtering, raw-current computation, the one-shot scale
//! calibration suspension, dead zone and Coulomb integration, telemetry,
//! debounced cutoff detection, and (on trip) the serial handshake that
//! gates the relay. Single-threaded; all shared state is owned here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use battmon_traits::clock::Clock;
use battmon_traits::{AnalogInput, Relay, SerialLink};
use eyre::WrapErr;

use crate::calibration::{CalibrationState, ReferenceReading, SCALE_TRIGGER_A};
use crate::config::{ConverterCfg, CutoffCfg, FilterCfg, HandshakeCfg, PacingCfg, ScaleCalCfg};
use crate::debounce::CutoffDebounce;
use crate::error::{BuildError, MonitorError, Result};
use crate::filter::MovingAverage;
use crate::handshake::{HandshakeOutcome, request_shutdown};
use crate::hw_error::map_hw_error;
use crate::integrator::{CapacityIntegrator, clamp_dead_zone};
use crate::sampler::{AdcSampler, current_from_sensor_volts, undivide};
use crate::telemetry::{CycleLog, MeasurementRecord};
use crate::util::seconds_from_ms;

/// Public status of a single step of the sampling loop.
#[derive(Debug)]
pub enum CycleStatus {
    /// Keep going; nothing tripped.
    Running,
    /// The loop is suspended until the operator supplies a reference
    /// current; resume with `Monitor::resume_with_reference`.
    AwaitingOperatorInput { raw_current_a: f64 },
    /// Low battery confirmed and the handshake has run; the loop is over.
    Tripped(HandshakeOutcome),
    /// The cancellation token was observed; the loop is over.
    Interrupted,
}

/// Snapshot of a cycle paused for operator input.
#[derive(Debug, Clone, Copy)]
struct PendingCycle {
    now_ms: u64,
    dt_ms: u64,
    vbat_v: f64,
    raw_current_a: f64,
}

/// Unified monitor over the four hardware seams.
pub struct Monitor<V, I, L, R>
where
    V: AnalogInput,
    I: AnalogInput,
    L: SerialLink,
    R: Relay,
{
    vbat: AdcSampler<V>,
    sensor: AdcSampler<I>,
    link: L,
    relay: R,
    converter: ConverterCfg,
    pacing: PacingCfg,
    handshake: HandshakeCfg,
    filter: MovingAverage,
    debounce: CutoffDebounce,
    calibration: CalibrationState,
    integrator: CapacityIntegrator,
    log: Box<dyn CycleLog>,
    clock: Arc<dyn Clock + Send + Sync>,
    cancel: Arc<AtomicBool>,
    epoch: Instant,
    last_sample_ms: u64,
    cycles: u64,
    auto_scale: bool,
    scale_attempted: bool,
    relay_engaged: bool,
    pending: Option<PendingCycle>,
}

impl<V, I, L, R> core::fmt::Debug for Monitor<V, I, L, R>
where
    V: AnalogInput,
    I: AnalogInput,
    L: SerialLink,
    R: Relay,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Monitor")
            .field("cycles", &self.cycles)
            .field("capacity_mah", &self.integrator.consumed_mah())
            .field("scale_factor", &self.calibration.scale_factor)
            .field("tripped", &self.debounce.is_tripped())
            .finish()
    }
}

impl<V, I, L, R> Monitor<V, I, L, R>
where
    V: AnalogInput,
    I: AnalogInput,
    L: SerialLink,
    R: Relay,
{
    /// Reset the run epoch. Call once before the first step.
    pub fn begin(&mut self) {
        self.epoch = self.clock.now();
        self.last_sample_ms = 0;
    }

    /// One iteration of the sampling loop.
    pub fn step(&mut self) -> Result<CycleStatus> {
        if self.pending.is_some() {
            return Err(eyre::Report::new(MonitorError::State(
                "cycle awaiting operator input; call resume_with_reference".into(),
            )));
        }
        if self.cancel.load(Ordering::Relaxed) {
            tracing::info!("cancellation observed; ending sampling loop");
            return Ok(CycleStatus::Interrupted);
        }

        let now_ms = self.clock.ms_since(self.epoch);
        let dt_ms = now_ms.saturating_sub(self.last_sample_ms);
        self.last_sample_ms = now_ms;

        let vbat_v = undivide(
            self.vbat.sample_volts(&*self.clock)?,
            self.converter.vbat_ratio,
        );
        let sensor_v = undivide(
            self.sensor.sample_volts(&*self.clock)?,
            self.converter.sensor_ratio,
        );
        let filtered_v = self.filter.push(sensor_v);
        let raw_current_a = current_from_sensor_volts(
            filtered_v,
            self.calibration.zero_offset_volts,
            self.converter.sensitivity_v_per_a,
        );

        let cycle = PendingCycle {
            now_ms,
            dt_ms,
            vbat_v,
            raw_current_a,
        };

        // Opportunistic one-shot scale calibration: suspend the loop the
        // first time a usable load current shows up.
        if self.auto_scale && !self.scale_attempted && raw_current_a.abs() > SCALE_TRIGGER_A {
            self.pending = Some(cycle);
            tracing::info!(raw_current_a, "suspending for scale-calibration reference");
            return Ok(CycleStatus::AwaitingOperatorInput { raw_current_a });
        }

        self.finish_cycle(cycle)
    }

    /// Complete the cycle paused by `CycleStatus::AwaitingOperatorInput`.
    /// The attempt is consumed whatever the reading was.
    pub fn resume_with_reference(&mut self, reading: ReferenceReading) -> Result<CycleStatus> {
        let cycle = self.pending.take().ok_or_else(|| {
            eyre::Report::new(MonitorError::State(
                "no cycle awaiting operator input".into(),
            ))
        })?;
        self.scale_attempted = true;
        if self
            .calibration
            .apply_scale_reference(reading, cycle.raw_current_a)
        {
            tracing::info!(
                scale_factor = self.calibration.scale_factor,
                raw_current_a = cycle.raw_current_a,
                "scale factor calibrated"
            );
        } else {
            tracing::warn!(
                scale_factor = self.calibration.scale_factor,
                "reference unusable; keeping default scale factor"
            );
        }
        self.finish_cycle(cycle)
    }

    fn finish_cycle(&mut self, cycle: PendingCycle) -> Result<CycleStatus> {
        let current_a = clamp_dead_zone(cycle.raw_current_a * self.calibration.scale_factor);
        let capacity_mah = self.integrator.accumulate(current_a, cycle.dt_ms);

        let rec = MeasurementRecord {
            elapsed_s: seconds_from_ms(cycle.now_ms),
            vbat_v: cycle.vbat_v,
            current_raw_a: cycle.raw_current_a,
            current_a,
            capacity_mah,
            scale_factor: self.calibration.scale_factor,
        };
        self.log.record(&rec)?;
        self.cycles += 1;
        tracing::info!(
            elapsed_s = rec.elapsed_s,
            vbat_v = rec.vbat_v,
            current_a = rec.current_a,
            capacity_mah = rec.capacity_mah,
            scale_factor = rec.scale_factor,
            "cycle"
        );

        if self.debounce.observe(cycle.vbat_v) {
            tracing::warn!(
                vbat_v = cycle.vbat_v,
                low_count = self.debounce.consecutive_low(),
                "low battery confirmed; starting shutdown handshake"
            );
            let outcome =
                request_shutdown(&mut self.link, &self.handshake, &*self.clock, &self.cancel)?;
            if outcome == HandshakeOutcome::Acknowledged {
                self.relay
                    .engage()
                    .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
                    .wrap_err("relay engage")?;
                self.relay_engaged = true;
                tracing::info!("relay engaged; companion power cut");
            }
            return Ok(CycleStatus::Tripped(outcome));
        }

        self.clock
            .sleep(Duration::from_millis(self.pacing.sample_interval_ms));
        Ok(CycleStatus::Running)
    }

    pub fn capacity_mah(&self) -> f64 {
        self.integrator.consumed_mah()
    }

    pub fn scale_factor(&self) -> f64 {
        self.calibration.scale_factor
    }

    pub fn scale_calibrated(&self) -> bool {
        self.calibration.scale_calibrated
    }

    pub fn zero_offset_volts(&self) -> f64 {
        self.calibration.zero_offset_volts
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn relay_engaged(&self) -> bool {
        self.relay_engaged
    }
}

/// Validate configuration and assemble a `Monitor`.
#[allow(clippy::too_many_arguments)]
pub fn build_monitor<V, I, L, R>(
    vbat: AdcSampler<V>,
    sensor: AdcSampler<I>,
    link: L,
    relay: R,
    converter: ConverterCfg,
    filter: FilterCfg,
    pacing: PacingCfg,
    cutoff: CutoffCfg,
    handshake: HandshakeCfg,
    scale: ScaleCalCfg,
    zero_offset_volts: f64,
    log: Box<dyn CycleLog>,
    cancel: Arc<AtomicBool>,
    clock: Arc<dyn Clock + Send + Sync>,
) -> Result<Monitor<V, I, L, R>>
where
    V: AnalogInput,
    I: AnalogInput,
    L: SerialLink,
    R: Relay,
{
    if !(converter.vbat_ratio.is_finite() && converter.vbat_ratio > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "vbat divider ratio must be > 0",
        )));
    }
    if !(converter.sensor_ratio.is_finite() && converter.sensor_ratio > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "sensor divider ratio must be > 0",
        )));
    }
    if !(converter.sensitivity_v_per_a.is_finite() && converter.sensitivity_v_per_a > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "sensor sensitivity must be > 0",
        )));
    }
    if filter.ma_window == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "ma_window must be >= 1",
        )));
    }
    if pacing.sample_interval_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "sample_interval_ms must be >= 1",
        )));
    }
    if cutoff.required_count == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "required_count must be >= 1",
        )));
    }
    if handshake.poll_ms == 0 || handshake.timeout_ms < handshake.poll_ms {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "handshake timeout must be >= poll interval >= 1",
        )));
    }
    if handshake.notice.is_empty() || handshake.ack_token.is_empty() {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "handshake notice and ack token must not be empty",
        )));
    }
    if !(scale.default_scale.is_finite() && scale.default_scale > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "default scale factor must be > 0",
        )));
    }
    if !zero_offset_volts.is_finite() {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "zero offset must be finite",
        )));
    }

    let epoch = clock.now();

    Ok(Monitor {
        vbat,
        sensor,
        link,
        relay,
        converter,
        pacing,
        handshake,
        filter: MovingAverage::new(filter.ma_window),
        debounce: CutoffDebounce::new(&cutoff),
        calibration: CalibrationState::new(zero_offset_volts, scale.default_scale),
        integrator: CapacityIntegrator::new(),
        log,
        clock,
        cancel,
        epoch,
        last_sample_ms: 0,
        cycles: 0,
        auto_scale: scale.auto_scale,
        scale_attempted: false,
        relay_engaged: false,
        pending: None,
    })
}
