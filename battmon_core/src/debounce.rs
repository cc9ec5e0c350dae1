//! Debounced low-voltage trip detection.
//!
//! Two states: normal and tripped (terminal). A sample at or above the
//! cutoff fully resets the accumulated low count; there is no further
//! hysteresis above the cutoff.

use crate::config::CutoffCfg;

#[derive(Debug)]
pub struct CutoffDebounce {
    cutoff_v: f64,
    required: u32,
    consecutive_low: u32,
    tripped: bool,
}

impl CutoffDebounce {
    pub fn new(cfg: &CutoffCfg) -> Self {
        Self {
            cutoff_v: cfg.vbat_cutoff_v,
            required: cfg.required_count.max(1),
            consecutive_low: 0,
            tripped: false,
        }
    }

    /// Feed one battery-voltage observation; returns true once tripped.
    pub fn observe(&mut self, vbat_v: f64) -> bool {
        if self.tripped {
            return true;
        }
        if vbat_v < self.cutoff_v {
            self.consecutive_low += 1;
        } else {
            self.consecutive_low = 0;
        }
        if self.consecutive_low >= self.required {
            self.tripped = true;
        }
        self.tripped
    }

    pub fn consecutive_low(&self) -> u32 {
        self.consecutive_low
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }
}

#[cfg(test)]
mod tests {
    use super::CutoffDebounce;
    use crate::config::CutoffCfg;

    fn debounce() -> CutoffDebounce {
        CutoffDebounce::new(&CutoffCfg {
            vbat_cutoff_v: 3.0,
            required_count: 3,
        })
    }

    #[test]
    fn an_in_range_sample_clears_accumulated_history() {
        let mut d = debounce();
        assert!(!d.observe(2.9));
        assert!(!d.observe(2.8));
        assert!(!d.observe(3.1));
        assert_eq!(d.consecutive_low(), 0);
        assert!(!d.observe(2.9));
        assert!(!d.observe(2.8));
        assert!(d.observe(2.7));
    }

    #[test]
    fn exactly_at_cutoff_counts_as_recovered() {
        let mut d = debounce();
        d.observe(2.9);
        d.observe(2.9);
        assert!(!d.observe(3.0));
        assert_eq!(d.consecutive_low(), 0);
    }

    #[test]
    fn tripped_is_terminal() {
        let mut d = debounce();
        d.observe(2.9);
        d.observe(2.9);
        assert!(d.observe(2.9));
        // Recovery after the trip does not matter.
        assert!(d.observe(4.2));
        assert!(d.is_tripped());
    }
}
