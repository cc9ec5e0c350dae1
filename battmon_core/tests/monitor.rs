use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use battmon_core::calibration::ReferenceReading;
use battmon_core::config::{
    AdcCfg, ConverterCfg, CutoffCfg, FilterCfg, HandshakeCfg, PacingCfg, ScaleCalCfg,
};
use battmon_core::handshake::HandshakeOutcome;
use battmon_core::mocks::{
    ManualClock, RecordingRelay, ScriptedAdc, ScriptedSerial, code_for_volts,
};
use battmon_core::monitor::{CycleStatus, Monitor, build_monitor};
use battmon_core::sampler::AdcSampler;
use battmon_core::telemetry::MemoryLog;

fn adc_cfg() -> AdcCfg {
    AdcCfg {
        max_code: 65535,
        vref: 3.3,
        settle_ms: 0,
    }
}

/// Zero offset exactly as the monitor will compute it from a sensor code.
fn offset_for_code(code: u16, conv: &ConverterCfg, adc: &AdcCfg) -> f64 {
    (f64::from(code) / f64::from(adc.max_code) * adc.vref) / conv.sensor_ratio
}

struct Fixture {
    monitor: Monitor<ScriptedAdc, ScriptedAdc, ScriptedSerial, RecordingRelay>,
    relay: RecordingRelay,
    link: ScriptedSerial,
    log: MemoryLog,
    cancel: Arc<AtomicBool>,
}

fn fixture(
    vbat_volts: &[f64],
    sensor_codes: Vec<u16>,
    zero_offset: f64,
    link: ScriptedSerial,
    scale: ScaleCalCfg,
    ma_window: usize,
) -> Fixture {
    let conv = ConverterCfg::default();
    let adc = adc_cfg();
    let vbat_codes: Vec<u16> = vbat_volts
        .iter()
        .map(|v| code_for_volts(*v, conv.vbat_ratio, &adc))
        .collect();
    let relay = RecordingRelay::new();
    let log = MemoryLog::new();
    let cancel = Arc::new(AtomicBool::new(false));
    let monitor = build_monitor(
        AdcSampler::new(ScriptedAdc::new(vbat_codes), adc),
        AdcSampler::new(ScriptedAdc::new(sensor_codes), adc),
        link.clone(),
        relay.clone(),
        conv,
        FilterCfg { ma_window },
        PacingCfg {
            sample_interval_ms: 1000,
        },
        CutoffCfg {
            vbat_cutoff_v: 3.0,
            required_count: 3,
        },
        HandshakeCfg::default(),
        scale,
        zero_offset,
        Box::new(log.clone()),
        cancel.clone(),
        Arc::new(ManualClock::new()),
    )
    .expect("build monitor");
    Fixture {
        monitor,
        relay,
        link,
        log,
        cancel,
    }
}

fn idle_scale() -> ScaleCalCfg {
    ScaleCalCfg {
        default_scale: 0.1,
        auto_scale: false,
    }
}

#[test]
fn trips_on_the_third_consecutive_low_sample() {
    let conv = ConverterCfg::default();
    let adc = adc_cfg();
    let sensor_code = code_for_volts(1.0, conv.sensor_ratio, &adc);
    let zero = offset_for_code(sensor_code, &conv, &adc);

    let mut f = fixture(
        &[3.5, 3.5, 2.9, 2.8, 2.7],
        vec![sensor_code],
        zero,
        ScriptedSerial::ack_after(0, "ACK"),
        idle_scale(),
        20,
    );
    f.monitor.begin();

    // Samples 1-4: two above cutoff, then two below -> still running.
    for i in 0..4 {
        match f.monitor.step().expect("step ok") {
            CycleStatus::Running => {}
            other => panic!("step {i}: expected Running, got {other:?}"),
        }
        assert_eq!(f.relay.engage_count(), 0);
    }

    // Sample 5 is the third consecutive low reading.
    match f.monitor.step().expect("step ok") {
        CycleStatus::Tripped(HandshakeOutcome::Acknowledged) => {}
        other => panic!("expected acknowledged trip, got {other:?}"),
    }
    assert_eq!(f.relay.engage_count(), 1);
    assert!(f.monitor.relay_engaged());
    assert_eq!(f.link.sent_lines(), vec!["LOW_BATT".to_string()]);

    let rows = f.log.rows();
    assert_eq!(rows.len(), 5);
    assert!((rows[0].vbat_v - 3.5).abs() < 0.01);
    assert!((rows[4].vbat_v - 2.7).abs() < 0.01);
    // Idle current sits in the dead zone: nothing integrates.
    assert_eq!(rows[4].capacity_mah, 0.0);
    // One-second pacing shows up in the elapsed column.
    assert!((rows[1].elapsed_s - 1.0).abs() < 1e-9);
    assert!((rows[4].elapsed_s - 4.0).abs() < 1e-9);
}

#[test]
fn a_recovered_sample_resets_the_low_count() {
    let conv = ConverterCfg::default();
    let adc = adc_cfg();
    let sensor_code = code_for_volts(1.0, conv.sensor_ratio, &adc);
    let zero = offset_for_code(sensor_code, &conv, &adc);

    // below, below, recovered, below, below, below
    let mut f = fixture(
        &[2.9, 2.9, 3.1, 2.9, 2.9, 2.9],
        vec![sensor_code],
        zero,
        ScriptedSerial::ack_after(0, "ACK"),
        idle_scale(),
        20,
    );
    f.monitor.begin();

    for i in 0..5 {
        match f.monitor.step().expect("step ok") {
            CycleStatus::Running => {}
            other => panic!("step {i}: expected Running, got {other:?}"),
        }
    }
    match f.monitor.step().expect("step ok") {
        CycleStatus::Tripped(_) => {}
        other => panic!("expected trip on sixth sample, got {other:?}"),
    }
}

#[test]
fn missing_ack_leaves_the_relay_untouched() {
    let conv = ConverterCfg::default();
    let adc = adc_cfg();
    let sensor_code = code_for_volts(1.0, conv.sensor_ratio, &adc);
    let zero = offset_for_code(sensor_code, &conv, &adc);

    let mut f = fixture(
        &[2.9, 2.9, 2.9],
        vec![sensor_code],
        zero,
        ScriptedSerial::silent(),
        idle_scale(),
        20,
    );
    f.monitor.begin();

    f.monitor.step().expect("step 1");
    f.monitor.step().expect("step 2");
    match f.monitor.step().expect("step 3") {
        CycleStatus::Tripped(HandshakeOutcome::TimedOut) => {}
        other => panic!("expected timed-out trip, got {other:?}"),
    }
    assert_eq!(f.relay.engage_count(), 0);
    assert!(!f.monitor.relay_engaged());
}

#[test]
fn cancellation_ends_the_loop_before_sampling() {
    let conv = ConverterCfg::default();
    let adc = adc_cfg();
    let sensor_code = code_for_volts(1.0, conv.sensor_ratio, &adc);
    let zero = offset_for_code(sensor_code, &conv, &adc);

    let mut f = fixture(
        &[3.5],
        vec![sensor_code],
        zero,
        ScriptedSerial::silent(),
        idle_scale(),
        20,
    );
    f.monitor.begin();
    assert!(matches!(
        f.monitor.step().expect("step ok"),
        CycleStatus::Running
    ));

    f.cancel.store(true, Ordering::Relaxed);
    assert!(matches!(
        f.monitor.step().expect("step ok"),
        CycleStatus::Interrupted
    ));
    // The interrupted cycle wrote nothing; the completed one persisted.
    assert_eq!(f.log.rows().len(), 1);
    assert_eq!(f.monitor.cycles(), 1);
}

#[test]
fn scale_calibration_suspends_once_and_applies_the_reference() {
    let conv = ConverterCfg::default();
    let adc = adc_cfg();
    let idle_code = code_for_volts(1.0, conv.sensor_ratio, &adc);
    let zero = offset_for_code(idle_code, &conv, &adc);
    // Sensor voltage for roughly 0.8 A of raw current.
    let load_code = code_for_volts(zero + 0.8 * conv.sensitivity_v_per_a, conv.sensor_ratio, &adc);

    let mut f = fixture(
        &[3.5],
        vec![idle_code, load_code],
        zero,
        ScriptedSerial::silent(),
        ScaleCalCfg {
            default_scale: 0.1,
            auto_scale: true,
        },
        1,
    );
    f.monitor.begin();

    assert!(matches!(
        f.monitor.step().expect("idle step"),
        CycleStatus::Running
    ));
    let raw = match f.monitor.step().expect("load step") {
        CycleStatus::AwaitingOperatorInput { raw_current_a } => raw_current_a,
        other => panic!("expected suspension, got {other:?}"),
    };
    assert!((raw - 0.8).abs() < 0.01);

    // Stepping while suspended is a state error.
    assert!(f.monitor.step().is_err());

    match f
        .monitor
        .resume_with_reference(ReferenceReading::Measured(0.4))
        .expect("resume ok")
    {
        CycleStatus::Running => {}
        other => panic!("expected Running after resume, got {other:?}"),
    }
    assert!(f.monitor.scale_calibrated());
    assert!((f.monitor.scale_factor() - 0.4 / raw).abs() < 1e-12);

    // The resumed cycle logged the corrected current.
    let rows = f.log.rows();
    assert_eq!(rows.len(), 2);
    assert!((rows[1].current_a - 0.4).abs() < 1e-9);
    assert!((rows[1].current_raw_a - raw).abs() < 1e-12);
}

#[test]
fn failed_reference_keeps_the_default_and_never_retries() {
    let conv = ConverterCfg::default();
    let adc = adc_cfg();
    let idle_code = code_for_volts(1.0, conv.sensor_ratio, &adc);
    let zero = offset_for_code(idle_code, &conv, &adc);
    let load_code = code_for_volts(zero + 0.8 * conv.sensitivity_v_per_a, conv.sensor_ratio, &adc);

    let mut f = fixture(
        &[3.5],
        vec![idle_code, load_code],
        zero,
        ScriptedSerial::silent(),
        ScaleCalCfg {
            default_scale: 0.1,
            auto_scale: true,
        },
        1,
    );
    f.monitor.begin();

    f.monitor.step().expect("idle step");
    assert!(matches!(
        f.monitor.step().expect("load step"),
        CycleStatus::AwaitingOperatorInput { .. }
    ));
    assert!(matches!(
        f.monitor
            .resume_with_reference(ReferenceReading::Invalid)
            .expect("resume ok"),
        CycleStatus::Running
    ));
    assert!(!f.monitor.scale_calibrated());
    assert_eq!(f.monitor.scale_factor(), 0.1);

    // The load persists but the one-shot attempt is spent.
    for _ in 0..3 {
        assert!(matches!(
            f.monitor.step().expect("step ok"),
            CycleStatus::Running
        ));
    }
}

#[test]
fn resume_without_a_pending_cycle_is_a_state_error() {
    let conv = ConverterCfg::default();
    let adc = adc_cfg();
    let sensor_code = code_for_volts(1.0, conv.sensor_ratio, &adc);
    let zero = offset_for_code(sensor_code, &conv, &adc);

    let mut f = fixture(
        &[3.5],
        vec![sensor_code],
        zero,
        ScriptedSerial::silent(),
        idle_scale(),
        20,
    );
    f.monitor.begin();
    assert!(
        f.monitor
            .resume_with_reference(ReferenceReading::Measured(0.4))
            .is_err()
    );
}
