//! Two-stage current-sensor calibration.
//!
//! Zero-offset calibration averages idle sensor readings before any load is
//! connected (operator responsibility, not enforced here). Scale calibration
//! is a one-shot correction against an externally measured reference current;
//! it either succeeds once or the default factor persists for the run.

use std::time::Duration;

use battmon_traits::{AnalogInput, Clock};

use crate::config::ZeroCalCfg;
use crate::error::Result;
use crate::sampler::{AdcSampler, undivide};

/// Raw current magnitude that arms the interactive scale calibration (A).
pub const SCALE_TRIGGER_A: f64 = 0.01;
/// Minimum signal magnitude for a usable scale division.
pub const SIGNAL_EPSILON: f64 = 1e-6;

/// Calibration constants applied to every cycle.
#[derive(Debug, Clone)]
pub struct CalibrationState {
    pub zero_offset_volts: f64,
    pub scale_factor: f64,
    pub scale_calibrated: bool,
}

impl CalibrationState {
    pub fn new(zero_offset_volts: f64, default_scale: f64) -> Self {
        Self {
            zero_offset_volts,
            scale_factor: default_scale,
            scale_calibrated: false,
        }
    }

    /// Apply an operator-supplied reference reading against the raw computed
    /// current. Returns true when the scale factor was replaced.
    ///
    /// `scale_factor` is never mutated again once `scale_calibrated` is set.
    pub fn apply_scale_reference(&mut self, reading: ReferenceReading, raw_current_a: f64) -> bool {
        if self.scale_calibrated {
            return false;
        }
        if let ReferenceReading::Measured(reference_a) = reading
            && reference_a.abs() > SIGNAL_EPSILON
            && raw_current_a.abs() > SIGNAL_EPSILON
        {
            self.scale_factor = reference_a / raw_current_a;
            self.scale_calibrated = true;
            return true;
        }
        false
    }
}

/// Parsed operator input for the reference current.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceReading {
    Measured(f64),
    Invalid,
}

/// Parse a prompt answer into a reference reading. Anything that is not a
/// finite number keeps the existing default downstream.
pub fn parse_reference_current(input: &str) -> ReferenceReading {
    match input.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => ReferenceReading::Measured(v),
        _ => ReferenceReading::Invalid,
    }
}

/// Average `samples` idle sensor-voltage readings into the zero offset.
/// Plain arithmetic mean, no outlier rejection.
pub fn measure_zero_offset<A: AnalogInput>(
    sampler: &mut AdcSampler<A>,
    divider_ratio: f64,
    cfg: &ZeroCalCfg,
    clock: &dyn Clock,
) -> Result<f64> {
    tracing::info!(samples = cfg.samples, "zero-offset calibration start");
    let mut sum = 0.0;
    for _ in 0..cfg.samples {
        let sensor_v = undivide(sampler.sample_volts(clock)?, divider_ratio);
        sum += sensor_v;
        clock.sleep(Duration::from_millis(cfg.delay_ms));
    }
    let zero = sum / f64::from(cfg.samples);
    tracing::info!(zero_offset_v = zero, "zero-offset calibration done");
    Ok(zero)
}
