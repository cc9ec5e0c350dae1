//! Core-side configuration structs.
//!
//! These mirror the `battmon_config` TOML sections but hold the values the
//! engine actually consumes (for the dividers: the precomputed attenuation
//! ratios). Constructed once at startup and never mutated.

/// ADC front-end parameters.
#[derive(Debug, Clone, Copy)]
pub struct AdcCfg {
    /// Full-scale raw code.
    pub max_code: u16,
    /// Reference voltage in volts.
    pub vref: f64,
    /// Settling delay between the discard read and the returned read (ms).
    pub settle_ms: u64,
}

impl Default for AdcCfg {
    fn default() -> Self {
        Self {
            max_code: 65535,
            vref: 3.3,
            settle_ms: 10,
        }
    }
}

/// Divider ratios and sensor sensitivity used to turn ADC volts into
/// battery volts and amps.
#[derive(Debug, Clone, Copy)]
pub struct ConverterCfg {
    /// Battery divider attenuation: r_bottom / (r_top + r_bottom).
    pub vbat_ratio: f64,
    /// Current-sensor output divider attenuation.
    pub sensor_ratio: f64,
    /// Sensor sensitivity in V/A.
    pub sensitivity_v_per_a: f64,
}

impl Default for ConverterCfg {
    fn default() -> Self {
        Self {
            vbat_ratio: 2_700.0 / (10_000.0 + 2_700.0),
            sensor_ratio: 10_000.0 / (1_680.0 + 10_000.0),
            sensitivity_v_per_a: 0.185,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FilterCfg {
    /// Moving-average window size over raw sensor-voltage samples.
    pub ma_window: usize,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self { ma_window: 20 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PacingCfg {
    /// Delay between measurement cycles (ms).
    pub sample_interval_ms: u64,
}

impl Default for PacingCfg {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CutoffCfg {
    /// Battery voltage below which a sample counts toward the trip.
    pub vbat_cutoff_v: f64,
    /// Consecutive below-cutoff samples required to trip.
    pub required_count: u32,
}

impl Default for CutoffCfg {
    fn default() -> Self {
        Self {
            vbat_cutoff_v: 3.0,
            required_count: 3,
        }
    }
}

/// Zero-offset calibration pass.
#[derive(Debug, Clone, Copy)]
pub struct ZeroCalCfg {
    pub samples: u32,
    pub delay_ms: u64,
}

impl Default for ZeroCalCfg {
    fn default() -> Self {
        Self {
            samples: 400,
            delay_ms: 8,
        }
    }
}

/// One-shot interactive scale calibration.
#[derive(Debug, Clone, Copy)]
pub struct ScaleCalCfg {
    /// Correction factor used until the operator supplies a reference.
    pub default_scale: f64,
    /// Whether the interactive calibration is armed at all.
    pub auto_scale: bool,
}

impl Default for ScaleCalCfg {
    fn default() -> Self {
        Self {
            default_scale: 0.1,
            auto_scale: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandshakeCfg {
    /// Outbound notice line sent on trip.
    pub notice: String,
    /// Substring accepted as acknowledgment on any inbound line.
    pub ack_token: String,
    pub timeout_ms: u64,
    pub poll_ms: u64,
}

impl Default for HandshakeCfg {
    fn default() -> Self {
        Self {
            notice: "LOW_BATT".to_string(),
            ack_token: "ACK".to_string(),
            timeout_ms: 5000,
            poll_ms: 100,
        }
    }
}
