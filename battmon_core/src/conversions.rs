//! `From` implementations bridging `battmon_config` types to `battmon_core`
//! types.
//!
//! These keep the field-by-field mapping out of the CLI.

use crate::config::{
    AdcCfg, ConverterCfg, CutoffCfg, FilterCfg, HandshakeCfg, PacingCfg, ScaleCalCfg, ZeroCalCfg,
};

impl From<&battmon_config::AdcCfg> for AdcCfg {
    fn from(c: &battmon_config::AdcCfg) -> Self {
        Self {
            max_code: c.max_code,
            vref: c.vref,
            settle_ms: c.settle_ms,
        }
    }
}

// The converter collapses both divider sections and the sensor sensitivity.
impl From<&battmon_config::Config> for ConverterCfg {
    fn from(c: &battmon_config::Config) -> Self {
        Self {
            vbat_ratio: c.battery_divider.ratio(),
            sensor_ratio: c.sensor_divider.ratio(),
            sensitivity_v_per_a: c.sensor.sensitivity_v_per_a,
        }
    }
}

impl From<&battmon_config::FilterCfg> for FilterCfg {
    fn from(c: &battmon_config::FilterCfg) -> Self {
        Self {
            ma_window: c.ma_window,
        }
    }
}

impl From<&battmon_config::PacingCfg> for PacingCfg {
    fn from(c: &battmon_config::PacingCfg) -> Self {
        Self {
            sample_interval_ms: c.sample_interval_ms,
        }
    }
}

impl From<&battmon_config::CutoffCfg> for CutoffCfg {
    fn from(c: &battmon_config::CutoffCfg) -> Self {
        Self {
            vbat_cutoff_v: c.vbat_cutoff_v,
            required_count: c.required_count,
        }
    }
}

impl From<&battmon_config::ZeroCalCfg> for ZeroCalCfg {
    fn from(c: &battmon_config::ZeroCalCfg) -> Self {
        Self {
            samples: c.samples,
            delay_ms: c.delay_ms,
        }
    }
}

impl From<&battmon_config::SensorCfg> for ScaleCalCfg {
    fn from(c: &battmon_config::SensorCfg) -> Self {
        Self {
            default_scale: c.default_scale,
            auto_scale: c.auto_scale,
        }
    }
}

impl From<&battmon_config::HandshakeCfg> for HandshakeCfg {
    fn from(c: &battmon_config::HandshakeCfg) -> Self {
        Self {
            notice: c.notice.clone(),
            ack_token: c.ack_token.clone(),
            timeout_ms: c.timeout_ms,
            poll_ms: c.poll_ms,
        }
    }
}
