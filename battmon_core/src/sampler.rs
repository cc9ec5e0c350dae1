//! Settle-read ADC sampling and unit conversion.
//!
//! Each sample is a discard read, a settling sleep, then the read that is
//! returned; the discard removes transient artifacts from input multiplexing
//! or prior channel use. Any in-range code is accepted; an ADC that sticks
//! at a fixed code is a hardware fault outside this layer.

use std::time::Duration;

use battmon_traits::{AnalogInput, Clock};
use eyre::WrapErr;

use crate::config::AdcCfg;
use crate::error::Result;
use crate::hw_error::map_hw_error;

/// One analog channel with the settle-read discipline applied.
pub struct AdcSampler<A: AnalogInput> {
    adc: A,
    cfg: AdcCfg,
}

impl<A: AnalogInput> AdcSampler<A> {
    pub fn new(adc: A, cfg: AdcCfg) -> Self {
        Self { adc, cfg }
    }

    /// Discard read, settling delay, then the returned read.
    pub fn sample_raw(&mut self, clock: &dyn Clock) -> Result<u16> {
        let _ = self
            .adc
            .read_raw()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("adc discard read")?;
        if self.cfg.settle_ms > 0 {
            clock.sleep(Duration::from_millis(self.cfg.settle_ms));
        }
        self.adc
            .read_raw()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("adc read")
    }

    /// Sample and convert to volts at the ADC pin.
    pub fn sample_volts(&mut self, clock: &dyn Clock) -> Result<f64> {
        let raw = self.sample_raw(clock)?;
        Ok(raw_to_volts(raw, &self.cfg))
    }
}

/// `code / max_code * vref`.
#[inline]
pub fn raw_to_volts(raw: u16, cfg: &AdcCfg) -> f64 {
    (raw as f64 / cfg.max_code as f64) * cfg.vref
}

/// Undo a resistor-divider attenuation: volts at the source.
#[inline]
pub fn undivide(adc_volts: f64, ratio: f64) -> f64 {
    adc_volts / ratio
}

/// Zero-subtracted sensor voltage expressed in amps.
#[inline]
pub fn current_from_sensor_volts(sensor_volts: f64, zero_offset_volts: f64, sensitivity: f64) -> f64 {
    (sensor_volts - zero_offset_volts) / sensitivity
}
