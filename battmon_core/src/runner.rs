//! Session orchestration: zero calibration, operator confirmation, the
//! sampling loop with prompt servicing, and the final report.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use battmon_traits::clock::{Clock, MonotonicClock};
use battmon_traits::{AnalogInput, Console, Relay, SerialLink};
use eyre::WrapErr;

use crate::calibration::{measure_zero_offset, parse_reference_current};
use crate::error::Result;
use crate::handshake::HandshakeOutcome;
use crate::hw_error::map_hw_error;
use crate::monitor::{CycleStatus, build_monitor};
use crate::sampler::AdcSampler;
use crate::telemetry::CycleLog;

/// How a monitoring session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Low battery confirmed, companion acknowledged, relay engaged.
    ShutdownAcknowledged,
    /// Low battery confirmed but no acknowledgment; relay left untouched.
    ShutdownTimedOut,
    /// Operator interrupt; the loop exited cleanly.
    Interrupted,
}

/// Final figures of a monitoring session.
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub capacity_mah: f64,
    pub scale_factor: f64,
    pub scale_calibrated: bool,
    pub zero_offset_volts: f64,
    pub cycles: u64,
}

fn outcome_of(h: HandshakeOutcome) -> RunOutcome {
    match h {
        HandshakeOutcome::Acknowledged => RunOutcome::ShutdownAcknowledged,
        HandshakeOutcome::TimedOut => RunOutcome::ShutdownTimedOut,
    }
}

/// Run a full monitoring session until trip or interrupt.
#[allow(clippy::too_many_arguments)]
pub fn run<V, I, L, R, C>(
    cfg: &battmon_config::Config,
    vbat_adc: V,
    sensor_adc: I,
    link: L,
    relay: R,
    console: &mut C,
    log: Box<dyn CycleLog>,
    cancel: Arc<AtomicBool>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<RunReport>
where
    V: AnalogInput,
    I: AnalogInput,
    L: SerialLink,
    R: Relay,
    C: Console,
{
    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };

    let adc_cfg: crate::config::AdcCfg = (&cfg.adc).into();
    let converter: crate::config::ConverterCfg = cfg.into();
    let zero_cfg: crate::config::ZeroCalCfg = (&cfg.zero_cal).into();

    let vbat = AdcSampler::new(vbat_adc, adc_cfg);
    let mut sensor = AdcSampler::new(sensor_adc, adc_cfg);

    // Stage one: zero-offset calibration with no load connected.
    let zero_offset_volts =
        measure_zero_offset(&mut sensor, converter.sensor_ratio, &zero_cfg, &*clock)?;

    let _ = console
        .prompt_line(&format!(
            "Zero calibration complete (offset = {zero_offset_volts:.4} V). \
             Connect the load and press Enter to start..."
        ))
        .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
        .wrap_err("operator confirmation")?;

    let mut monitor = build_monitor(
        vbat,
        sensor,
        link,
        relay,
        converter,
        (&cfg.filter).into(),
        (&cfg.pacing).into(),
        (&cfg.cutoff).into(),
        (&cfg.handshake).into(),
        (&cfg.sensor).into(),
        zero_offset_volts,
        log,
        cancel,
        clock,
    )?;
    monitor.begin();
    tracing::info!(
        cutoff_v = cfg.cutoff.vbat_cutoff_v,
        required_count = cfg.cutoff.required_count,
        "monitoring start"
    );

    let mut status = monitor.step()?;
    let outcome = loop {
        match status {
            CycleStatus::Running => status = monitor.step()?,
            CycleStatus::AwaitingOperatorInput { raw_current_a } => {
                let answer = console
                    .prompt_line(&format!(
                        "Reference current in A (raw reading {raw_current_a:.3} A): "
                    ))
                    .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
                    .wrap_err("operator reference prompt")?;
                status = monitor.resume_with_reference(parse_reference_current(&answer))?;
            }
            CycleStatus::Tripped(h) => break outcome_of(h),
            CycleStatus::Interrupted => break RunOutcome::Interrupted,
        }
    };

    let report = RunReport {
        outcome,
        capacity_mah: monitor.capacity_mah(),
        scale_factor: monitor.scale_factor(),
        scale_calibrated: monitor.scale_calibrated(),
        zero_offset_volts,
        cycles: monitor.cycles(),
    };
    tracing::info!(
        outcome = ?report.outcome,
        capacity_mah = report.capacity_mah,
        scale_factor = report.scale_factor,
        cycles = report.cycles,
        "monitoring session finished"
    );
    Ok(report)
}
