#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core battery-monitoring logic (hardware-agnostic).
//!
//! This crate provides the hardware-independent measurement and protective
//! shutdown engine. All hardware interactions go through the
//! `battmon_traits` seams (`AnalogInput`, `SerialLink`, `Relay`, `Console`).
//!
//! ## Architecture
//!
//! - **Sampling**: settle-read ADC sampling and divider/current conversion
//!   (`sampler` module)
//! - **Calibration**: zero-offset measurement and one-shot interactive scale
//!   correction (`calibration` module)
//! - **Filtering**: moving average over sensor-voltage samples (`filter`)
//! - **Integration**: Coulomb-counting with an idle dead zone (`integrator`)
//! - **Cutoff**: debounced low-voltage trip (`debounce`)
//! - **Handshake**: serial request/acknowledge gating the relay (`handshake`)
//! - **Loop driver**: per-cycle pipeline and session orchestration
//!   (`monitor`, `runner`)
//!
//! All physical quantities are `f64`; conversions follow the divider
//! formulas exactly.

pub mod calibration;
pub mod config;
pub mod conversions;
pub mod debounce;
pub mod error;
pub mod filter;
pub mod handshake;
pub mod hw_error;
pub mod integrator;
pub mod mocks;
pub mod monitor;
pub mod runner;
pub mod sampler;
pub mod telemetry;
pub mod util;

pub use calibration::{CalibrationState, ReferenceReading, parse_reference_current};
pub use config::{
    AdcCfg, ConverterCfg, CutoffCfg, FilterCfg, HandshakeCfg, PacingCfg, ScaleCalCfg, ZeroCalCfg,
};
pub use debounce::CutoffDebounce;
pub use error::{BuildError, MonitorError};
pub use filter::MovingAverage;
pub use handshake::HandshakeOutcome;
pub use integrator::CapacityIntegrator;
pub use monitor::{CycleStatus, Monitor, build_monitor};
pub use runner::{RunOutcome, RunReport};
pub use sampler::AdcSampler;
pub use telemetry::{CsvCycleLog, CycleLog, MeasurementRecord, MemoryLog};
