//! Test and simulation mocks for battmon_core.
//!
//! Shared by the crate's integration tests and the simulated CLI backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use battmon_traits::{AnalogInput, Clock, Console, Relay, SerialLink};

use crate::config::AdcCfg;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// ADC fed by a fixed code sequence; the last code repeats forever.
///
/// Codes advance every second read to match the sampler's discard-then-read
/// discipline, so one scripted code corresponds to one logical sample.
pub struct ScriptedAdc {
    codes: Vec<u16>,
    reads: usize,
}

impl ScriptedAdc {
    pub fn new(codes: impl Into<Vec<u16>>) -> Self {
        Self {
            codes: codes.into(),
            reads: 0,
        }
    }
}

impl AnalogInput for ScriptedAdc {
    fn read_raw(&mut self) -> Result<u16, BoxError> {
        let idx = (self.reads / 2).min(self.codes.len().saturating_sub(1));
        self.reads += 1;
        Ok(self.codes.get(idx).copied().unwrap_or(0))
    }
}

/// The ADC code a given source voltage produces behind a divider.
pub fn code_for_volts(volts: f64, divider_ratio: f64, adc: &AdcCfg) -> u16 {
    let adc_volts = volts * divider_ratio;
    ((adc_volts / adc.vref) * f64::from(adc.max_code)).round() as u16
}

/// Serial link that records outbound lines and replays a scripted inbound
/// poll sequence (`None` = no line pending this tick).
#[derive(Clone, Default)]
pub struct ScriptedSerial {
    sent: Arc<Mutex<Vec<String>>>,
    replies: Arc<Mutex<VecDeque<Option<String>>>>,
}

impl ScriptedSerial {
    pub fn new(replies: impl IntoIterator<Item = Option<String>>) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
        }
    }

    /// Reply with a line containing the token after `silent_polls` empty polls.
    pub fn ack_after(silent_polls: usize, line: &str) -> Self {
        let mut replies: VecDeque<Option<String>> = (0..silent_polls).map(|_| None).collect();
        replies.push_back(Some(line.to_string()));
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            replies: Arc::new(Mutex::new(replies)),
        }
    }

    /// Never produces an inbound line.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn sent_lines(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl SerialLink for ScriptedSerial {
    fn write_line(&mut self, line: &str) -> Result<(), BoxError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(line.to_string());
        }
        Ok(())
    }

    fn poll_line(&mut self) -> Result<Option<String>, BoxError> {
        Ok(self
            .replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .flatten())
    }
}

/// Relay that counts engagements; clones share the counter.
#[derive(Clone, Default)]
pub struct RecordingRelay {
    engaged: Arc<AtomicU32>,
}

impl RecordingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engage_count(&self) -> u32 {
        self.engaged.load(Ordering::Relaxed)
    }
}

impl Relay for RecordingRelay {
    fn engage(&mut self) -> Result<(), BoxError> {
        self.engaged.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Console that answers prompts from a script and records what was asked.
#[derive(Clone, Default)]
pub struct ScriptedConsole {
    answers: Arc<Mutex<VecDeque<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConsole {
    pub fn new(answers: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            answers: Arc::new(Mutex::new(
                answers.into_iter().map(str::to_string).collect(),
            )),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Console for ScriptedConsole {
    fn prompt_line(&mut self, prompt: &str) -> Result<String, BoxError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        Ok(self
            .answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .unwrap_or_default())
    }
}

/// Deterministic clock: `sleep` advances time without actually sleeping.
/// Clones share the same timeline.
#[derive(Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = off.saturating_add(d);
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.offset
            .lock()
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let off = self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO);
        self.origin + off
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}
