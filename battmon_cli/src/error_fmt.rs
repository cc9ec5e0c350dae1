//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use battmon_core::error::{BuildError, MonitorError};

    // Typed matches first
    if let Some(BuildError::InvalidConfig(msg)) = err.downcast_ref::<BuildError>() {
        return format!(
            "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
        );
    }

    if let Some(me) = err.downcast_ref::<MonitorError>() {
        if matches!(me, MonitorError::Timeout) {
            return "What happened: A sensor or serial read timed out.\nLikely causes: ADC or UART not wired correctly, no power/ground, or the companion device is down.\nHow to fix: Verify SPI/UART wiring and power, then rerun.".to_string();
        }
        return format!(
            "What happened: {me}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("invalid configuration") || lower.contains("must be") {
        return "What happened: Configuration is invalid or incomplete.\nLikely causes: Out-of-range values in a section ([adc], [cutoff], [handshake], ...).\nHow to fix: Edit the TOML config and try again.".to_string();
    }

    if lower.contains("telemetry log") {
        return "What happened: The telemetry CSV could not be written.\nLikely causes: Unwritable directory or disk full.\nHow to fix: Check telemetry.file in the config and directory permissions.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit code for hard failures (config/hardware/io). The run
/// outcomes map their own codes in main.
pub fn exit_code_for_error(_err: &eyre::Report) -> i32 {
    2
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({ "reason": "Error", "message": humanize(err) }).to_string()
}
