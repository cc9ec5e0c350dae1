#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and validation for the battery monitor.
//!
//! `Config` and sub-structs are deserialized from TOML and validated once at
//! startup. Defaults match the reference deployment (16-bit ADC at 3.3 V,
//! ACS712-5A current sensor, 3.0 V cutoff) so an empty file is a runnable
//! configuration.
use serde::Deserialize;

/// ADC front-end parameters.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct AdcCfg {
    /// Full-scale raw code (2^bits - 1).
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

/// Resistor divider in front of an analog input.
/// Attenuation ratio = r_bottom / (r_top + r_bottom).
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct DividerCfg {
    pub r_top_ohms: f64,
    pub r_bottom_ohms: f64,
}

impl DividerCfg {
    pub fn ratio(&self) -> f64 {
        self.r_bottom_ohms / (self.r_top_ohms + self.r_bottom_ohms)
    }
}

/// Current sensor parameters.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SensorCfg {
    /// Sensor sensitivity in V/A (ACS712: 5 A = 0.185, 20 A = 0.100, 30 A = 0.066).
    pub sensitivity_v_per_a: f64,
    /// Scale correction factor used until (and unless) the operator supplies
    /// a reference measurement.
    pub default_scale: f64,
    /// Enable the one-shot interactive scale calibration against a reference meter.
    pub auto_scale: bool,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            sensitivity_v_per_a: 0.185,
            default_scale: 0.1,
            auto_scale: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct FilterCfg {
    /// Moving-average window over raw sensor-voltage samples.
    pub ma_window: usize,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self { ma_window: 20 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
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

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
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

/// Zero-offset calibration pass (run with no load connected).
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HandshakeCfg {
    /// Outbound notice line sent on trip.
    pub notice: String,
    /// Substring accepted as acknowledgment on any inbound line.
    pub ack_token: String,
    pub timeout_ms: u64,
    pub poll_ms: u64,
    /// Serial baud rate; consumed by the hardware backend.
    pub baud: u32,
}

impl Default for HandshakeCfg {
    fn default() -> Self {
        Self {
            notice: "LOW_BATT".to_string(),
            ack_token: "ACK".to_string(),
            timeout_ms: 5000,
            poll_ms: 100,
            baud: 9600,
        }
    }
}

/// Relay output polarity; which level cuts power is a deployment detail.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct RelayCfg {
    pub active_high: bool,
    /// GPIO pin driving the relay (hardware backend only).
    pub pin: u8,
}

impl Default for RelayCfg {
    fn default() -> Self {
        Self {
            active_high: true,
            pin: 15,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryCfg {
    /// Path of the per-cycle CSV record.
    pub file: String,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            file: "battery_log.csv".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub adc: AdcCfg,
    pub battery_divider: DividerCfg,
    pub sensor_divider: DividerCfg,
    pub sensor: SensorCfg,
    pub filter: FilterCfg,
    pub pacing: PacingCfg,
    pub cutoff: CutoffCfg,
    pub zero_cal: ZeroCalCfg,
    pub handshake: HandshakeCfg,
    pub relay: RelayCfg,
    pub telemetry: TelemetryCfg,
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adc: AdcCfg::default(),
            // VBAT divider: 10 kΩ over 2.7 kΩ
            battery_divider: DividerCfg {
                r_top_ohms: 10_000.0,
                r_bottom_ohms: 2_700.0,
            },
            // ACS OUT divider: 1.68 kΩ over 10 kΩ
            sensor_divider: DividerCfg {
                r_top_ohms: 1_680.0,
                r_bottom_ohms: 10_000.0,
            },
            sensor: SensorCfg::default(),
            filter: FilterCfg::default(),
            pacing: PacingCfg::default(),
            cutoff: CutoffCfg::default(),
            zero_cal: ZeroCalCfg::default(),
            handshake: HandshakeCfg::default(),
            relay: RelayCfg::default(),
            telemetry: TelemetryCfg::default(),
            logging: Logging::default(),
        }
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.adc.max_code == 0 {
            eyre::bail!("adc.max_code must be > 0");
        }
        if !(self.adc.vref.is_finite() && self.adc.vref > 0.0) {
            eyre::bail!("adc.vref must be > 0");
        }
        for (name, d) in [
            ("battery_divider", &self.battery_divider),
            ("sensor_divider", &self.sensor_divider),
        ] {
            if !(d.r_top_ohms.is_finite() && d.r_top_ohms > 0.0) {
                eyre::bail!("{name}.r_top_ohms must be > 0");
            }
            if !(d.r_bottom_ohms.is_finite() && d.r_bottom_ohms > 0.0) {
                eyre::bail!("{name}.r_bottom_ohms must be > 0");
            }
        }
        if !(self.sensor.sensitivity_v_per_a.is_finite() && self.sensor.sensitivity_v_per_a > 0.0) {
            eyre::bail!("sensor.sensitivity_v_per_a must be > 0");
        }
        if !(self.sensor.default_scale.is_finite() && self.sensor.default_scale > 0.0) {
            eyre::bail!("sensor.default_scale must be > 0");
        }
        if self.filter.ma_window == 0 {
            eyre::bail!("filter.ma_window must be >= 1");
        }
        if self.pacing.sample_interval_ms == 0 {
            eyre::bail!("pacing.sample_interval_ms must be >= 1");
        }
        if !self.cutoff.vbat_cutoff_v.is_finite() || self.cutoff.vbat_cutoff_v <= 0.0 {
            eyre::bail!("cutoff.vbat_cutoff_v must be > 0");
        }
        if self.cutoff.required_count == 0 {
            eyre::bail!("cutoff.required_count must be >= 1");
        }
        if self.zero_cal.samples == 0 {
            eyre::bail!("zero_cal.samples must be >= 1");
        }
        if self.handshake.poll_ms == 0 {
            eyre::bail!("handshake.poll_ms must be >= 1");
        }
        if self.handshake.timeout_ms < self.handshake.poll_ms {
            eyre::bail!("handshake.timeout_ms must be >= handshake.poll_ms");
        }
        if self.handshake.notice.is_empty() {
            eyre::bail!("handshake.notice must not be empty");
        }
        if self.handshake.ack_token.is_empty() {
            eyre::bail!("handshake.ack_token must not be empty");
        }
        if self.handshake.baud == 0 {
            eyre::bail!("handshake.baud must be > 0");
        }
        if self.telemetry.file.is_empty() {
            eyre::bail!("telemetry.file must not be empty");
        }
        Ok(())
    }
}
