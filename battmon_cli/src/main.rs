//! battmon CLI: config loading, logging init, hardware assembly, and the
//! monitoring session entry point.

mod cli;
mod error_fmt;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

use battmon_core::runner::{RunOutcome, RunReport};
use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};

fn main() {
    let args = Cli::parse();
    let _ = JSON_MODE.set(args.json);
    let _ = color_eyre::install();

    let code = match dispatch(&args) {
        Ok(code) => code,
        Err(err) => {
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", error_fmt::format_error_json(&err));
            } else {
                eprintln!("{}", error_fmt::humanize(&err));
            }
            error_fmt::exit_code_for_error(&err)
        }
    };
    std::process::exit(code);
}

fn dispatch(args: &Cli) -> eyre::Result<i32> {
    match args.cmd {
        Commands::Run => run_monitor(args),
        Commands::SelfCheck => self_check(args),
    }
}

fn load_config(path: &Path) -> eyre::Result<(battmon_config::Config, bool)> {
    if !path.exists() {
        return Ok((battmon_config::Config::default(), true));
    }
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg: battmon_config::Config = toml::from_str(&text).wrap_err("parse config TOML")?;
    cfg.validate()?;
    Ok((cfg, false))
}

fn init_tracing(args: &Cli, logging: &battmon_config::Logging) {
    let level = logging.level.as_deref().unwrap_or(&args.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(file) = &logging.file {
        let path = Path::new(file);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let name = path.file_name().unwrap_or_else(|| "battmon.log".as_ref());
        let appender =
            tracing_appender::rolling::never(dir.unwrap_or_else(|| Path::new(".")), name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .json()
            .init();
    } else if args.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn run_monitor(args: &Cli) -> eyre::Result<i32> {
    let (cfg, used_defaults) = load_config(&args.config)?;
    init_tracing(args, &cfg.logging);
    if used_defaults {
        tracing::warn!(
            path = %args.config.display(),
            "config file missing; using reference defaults"
        );
    }

    // Explicit cancellation token, checked once per cycle and per handshake
    // poll tick.
    let cancel = Arc::new(AtomicBool::new(false));
    let token = cancel.clone();
    ctrlc::set_handler(move || token.store(true, Ordering::Relaxed))
        .wrap_err("install interrupt handler")?;

    let log = Box::new(battmon_core::CsvCycleLog::new(&cfg.telemetry.file));
    let mut console = battmon_hardware::StdinConsole::new();

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    let report = {
        let adc =
            battmon_hardware::mcp3008::Mcp3008::open(1_350_000).wrap_err("open MCP3008")?;
        let link = battmon_hardware::UartLink::open("/dev/serial0", cfg.handshake.baud)
            .wrap_err("open UART")?;
        let relay = battmon_hardware::GpioRelay::new(cfg.relay.pin, cfg.relay.active_high)
            .wrap_err("open relay pin")?;
        // CH0 carries the battery divider, CH1 the sensor divider.
        battmon_core::runner::run(
            &cfg,
            adc.channel(0),
            adc.channel(1),
            link,
            relay,
            &mut console,
            log,
            cancel,
            None,
        )?
    };

    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    let report = {
        let vbat = battmon_hardware::SimulatedBatteryAdc::new(
            env_f64("BATTMON_SIM_START_V", 3.6),
            env_f64("BATTMON_SIM_DROOP_V", 0.05),
            cfg.battery_divider.ratio(),
            cfg.adc.vref,
            cfg.adc.max_code,
        );
        let sensor = battmon_hardware::SimulatedSensorAdc::new(
            env_f64("BATTMON_SIM_SENSOR_V", 0.5),
            cfg.sensor_divider.ratio(),
            cfg.adc.vref,
            cfg.adc.max_code,
        );
        battmon_core::runner::run(
            &cfg,
            vbat,
            sensor,
            battmon_hardware::SimulatedSerial::new(),
            battmon_hardware::SimulatedRelay::new(),
            &mut console,
            log,
            cancel,
            None,
        )?
    };

    print_summary(&report);
    Ok(match report.outcome {
        RunOutcome::ShutdownAcknowledged | RunOutcome::Interrupted => 0,
        RunOutcome::ShutdownTimedOut => 1,
    })
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn print_summary(report: &RunReport) {
    match report.outcome {
        RunOutcome::ShutdownAcknowledged => {
            println!("Companion acknowledged; relay engaged to cut power.");
        }
        RunOutcome::ShutdownTimedOut => {
            println!("No acknowledgment from companion; relay NOT engaged.");
        }
        RunOutcome::Interrupted => {
            println!("Monitoring interrupted by operator.");
        }
    }
    println!(
        "Final capacity: {:.2} mAh over {} cycles (scale factor {:.6})",
        report.capacity_mah, report.cycles, report.scale_factor
    );
    if JSON_MODE.get().copied().unwrap_or(false) {
        let outcome = match report.outcome {
            RunOutcome::ShutdownAcknowledged => "acknowledged",
            RunOutcome::ShutdownTimedOut => "timed_out",
            RunOutcome::Interrupted => "interrupted",
        };
        println!(
            "{}",
            serde_json::json!({
                "outcome": outcome,
                "capacity_mah": report.capacity_mah,
                "scale_factor": report.scale_factor,
                "scale_calibrated": report.scale_calibrated,
                "zero_offset_volts": report.zero_offset_volts,
                "cycles": report.cycles,
            })
        );
    }
}

fn self_check(args: &Cli) -> eyre::Result<i32> {
    let (cfg, _) = load_config(&args.config)?;
    init_tracing(args, &cfg.logging);

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        battmon_hardware::mcp3008::Mcp3008::open(1_350_000).wrap_err("open MCP3008")?;
        battmon_hardware::UartLink::open("/dev/serial0", cfg.handshake.baud)
            .wrap_err("open UART")?;
        battmon_hardware::GpioRelay::new(cfg.relay.pin, cfg.relay.active_high)
            .wrap_err("open relay pin")?;
    }

    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        use battmon_traits::{AnalogInput, Relay, SerialLink};
        let mut vbat = battmon_hardware::SimulatedBatteryAdc::new(
            3.6,
            0.0,
            cfg.battery_divider.ratio(),
            cfg.adc.vref,
            cfg.adc.max_code,
        );
        let _ = vbat.read_raw().map_err(|e| eyre::eyre!("{e}"))?;
        let mut link = battmon_hardware::SimulatedSerial::new();
        link.write_line(&cfg.handshake.notice)
            .map_err(|e| eyre::eyre!("{e}"))?;
        let _ = link.poll_line().map_err(|e| eyre::eyre!("{e}"))?;
        let mut relay = battmon_hardware::SimulatedRelay::new();
        relay.engage().map_err(|e| eyre::eyre!("{e}"))?;
    }

    println!("self-check ok");
    Ok(0)
}
