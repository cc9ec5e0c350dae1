//! Serial request/acknowledge handshake gating the relay action.
//!
//! One shot, no retransmission, no sequence numbers: send the notice line,
//! then poll the link until a line containing the acknowledgment token
//! arrives or the timeout elapses. The cancellation token is observed once
//! per poll tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use battmon_traits::{Clock, SerialLink};
use eyre::WrapErr;

use crate::config::HandshakeCfg;
use crate::error::Result;
use crate::hw_error::map_hw_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Acknowledged,
    TimedOut,
}

/// Send the low-battery notice and wait for acknowledgment.
pub fn request_shutdown<L: SerialLink>(
    link: &mut L,
    cfg: &HandshakeCfg,
    clock: &dyn Clock,
    cancel: &AtomicBool,
) -> Result<HandshakeOutcome> {
    link.write_line(&cfg.notice)
        .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
        .wrap_err("serial notice")?;
    tracing::info!(notice = %cfg.notice, "low-battery notice sent; awaiting acknowledgment");

    let start = clock.now();
    while clock.ms_since(start) < cfg.timeout_ms {
        if cancel.load(Ordering::Relaxed) {
            tracing::warn!("interrupted while awaiting acknowledgment");
            break;
        }
        if let Some(line) = link
            .poll_line()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("serial poll")?
            && line.contains(&cfg.ack_token)
        {
            tracing::info!(line = %line.trim_end(), "acknowledgment received");
            return Ok(HandshakeOutcome::Acknowledged);
        }
        clock.sleep(Duration::from_millis(cfg.poll_ms));
    }

    tracing::warn!(timeout_ms = cfg.timeout_ms, "no acknowledgment; relay will stay untouched");
    Ok(HandshakeOutcome::TimedOut)
}
