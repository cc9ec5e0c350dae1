//! Full-session tests: zero calibration, operator prompts, monitoring loop,
//! and the final report.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use battmon_core::mocks::{
    ManualClock, RecordingRelay, ScriptedAdc, ScriptedConsole, ScriptedSerial, code_for_volts,
};
use battmon_core::runner::{self, RunOutcome};
use battmon_core::telemetry::MemoryLog;

fn fast_config() -> battmon_config::Config {
    let mut cfg = battmon_config::Config::default();
    cfg.adc.settle_ms = 0;
    cfg.zero_cal.samples = 2;
    cfg.zero_cal.delay_ms = 1;
    cfg.filter.ma_window = 1;
    cfg
}

fn vbat_codes(cfg: &battmon_config::Config, volts: &[f64]) -> Vec<u16> {
    let adc: battmon_core::config::AdcCfg = (&cfg.adc).into();
    volts
        .iter()
        .map(|v| code_for_volts(*v, cfg.battery_divider.ratio(), &adc))
        .collect()
}

#[test]
fn full_session_calibrates_and_shuts_down_on_ack() {
    let cfg = fast_config();
    let adc: battmon_core::config::AdcCfg = (&cfg.adc).into();
    let sensor_ratio = cfg.sensor_divider.ratio();

    let idle_code = code_for_volts(1.0, sensor_ratio, &adc);
    let idle_volts = (f64::from(idle_code) / f64::from(cfg.adc.max_code) * cfg.adc.vref)
        / sensor_ratio;
    let load_code = code_for_volts(
        idle_volts + 0.8 * cfg.sensor.sensitivity_v_per_a,
        sensor_ratio,
        &adc,
    );

    // Two zero-cal samples, then one idle cycle, then the load appears.
    let sensor = ScriptedAdc::new(vec![idle_code, idle_code, idle_code, load_code]);
    let vbat = ScriptedAdc::new(vbat_codes(&cfg, &[3.5, 3.5, 2.9, 2.8, 2.7]));
    let link = ScriptedSerial::ack_after(0, "ACK");
    let relay = RecordingRelay::new();
    let mut console = ScriptedConsole::new(["", "0.40"]);
    let log = MemoryLog::new();

    let report = runner::run(
        &cfg,
        vbat,
        sensor,
        link.clone(),
        relay.clone(),
        &mut console,
        Box::new(log.clone()),
        Arc::new(AtomicBool::new(false)),
        Some(Box::new(ManualClock::new())),
    )
    .expect("session ok");

    assert_eq!(report.outcome, RunOutcome::ShutdownAcknowledged);
    assert_eq!(report.cycles, 5);
    assert!(report.scale_calibrated);
    assert!((report.zero_offset_volts - idle_volts).abs() < 1e-9);
    assert_eq!(relay.engage_count(), 1);
    assert_eq!(link.sent_lines(), vec!["LOW_BATT".to_string()]);

    // Both prompts happened, in order.
    let prompts = console.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("Zero calibration complete"));
    assert!(prompts[1].contains("Reference current"));

    // Cycles 2-5 each integrate the calibrated 0.4 A over one second.
    let expected_mah = 4.0 * 0.4 * 1000.0 * (1.0 / 3600.0);
    assert!(
        (report.capacity_mah - expected_mah).abs() < 1e-9,
        "capacity {}",
        report.capacity_mah
    );
    assert_eq!(log.rows().len(), 5);
}

#[test]
fn unusable_reference_keeps_the_default_scale_for_the_run() {
    let cfg = fast_config();
    let adc: battmon_core::config::AdcCfg = (&cfg.adc).into();
    let sensor_ratio = cfg.sensor_divider.ratio();

    let idle_code = code_for_volts(1.0, sensor_ratio, &adc);
    let idle_volts = (f64::from(idle_code) / f64::from(cfg.adc.max_code) * cfg.adc.vref)
        / sensor_ratio;
    let load_code = code_for_volts(
        idle_volts + 0.8 * cfg.sensor.sensitivity_v_per_a,
        sensor_ratio,
        &adc,
    );

    let sensor = ScriptedAdc::new(vec![idle_code, idle_code, load_code]);
    let vbat = ScriptedAdc::new(vbat_codes(&cfg, &[2.9, 2.9, 2.9]));
    let relay = RecordingRelay::new();
    // Operator types something unparsable at the reference prompt.
    let mut console = ScriptedConsole::new(["", "zero point four"]);
    let log = MemoryLog::new();

    let report = runner::run(
        &cfg,
        vbat,
        sensor,
        ScriptedSerial::silent(),
        relay.clone(),
        &mut console,
        Box::new(log.clone()),
        Arc::new(AtomicBool::new(false)),
        Some(Box::new(ManualClock::new())),
    )
    .expect("session ok");

    assert_eq!(report.outcome, RunOutcome::ShutdownTimedOut);
    assert!(!report.scale_calibrated);
    assert_eq!(report.scale_factor, cfg.sensor.default_scale);
    assert_eq!(relay.engage_count(), 0);
}

#[test]
fn interrupt_produces_a_final_report() {
    let cfg = fast_config();
    let adc: battmon_core::config::AdcCfg = (&cfg.adc).into();
    let sensor_ratio = cfg.sensor_divider.ratio();
    let idle_code = code_for_volts(1.0, sensor_ratio, &adc);

    let cancel = Arc::new(AtomicBool::new(false));
    cancel.store(true, Ordering::Relaxed);

    let mut console = ScriptedConsole::new([""]);
    let log = MemoryLog::new();
    let report = runner::run(
        &cfg,
        ScriptedAdc::new(vbat_codes(&cfg, &[3.5])),
        ScriptedAdc::new(vec![idle_code]),
        ScriptedSerial::silent(),
        RecordingRelay::new(),
        &mut console,
        Box::new(log.clone()),
        cancel,
        Some(Box::new(ManualClock::new())),
    )
    .expect("session ok");

    assert_eq!(report.outcome, RunOutcome::Interrupted);
    assert_eq!(report.cycles, 0);
    assert_eq!(report.capacity_mah, 0.0);
    assert!(log.rows().is_empty());
}
