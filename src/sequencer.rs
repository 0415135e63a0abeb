//! Debounced charge/discharge/rest classification.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Charging,
    Discharging,
    Relaxed,
}

impl Mode {
    /// Mode suggested by a single current reading.
    ///
    /// ```rust
    /// # use palmas_fg::sequencer::Mode;
    /// assert_eq!(Mode::classify(150, 10), Mode::Charging);
    /// assert_eq!(Mode::classify(-150, 10), Mode::Discharging);
    /// assert_eq!(Mode::classify(-10, 10), Mode::Relaxed);
    /// ```
    pub fn classify(current_ma: i32, deadband_ma: u16) -> Self {
        let deadband = deadband_ma as i32;

        if current_ma > deadband {
            Mode::Charging
        } else if current_ma < -deadband {
            Mode::Discharging
        } else {
            Mode::Relaxed
        }
    }
}

/// Commits a mode change only after a number of consecutive samples agree on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSequencer {
    mode: Mode,
    candidate: Mode,
    agreeing: u8,
}

impl Default for ModeSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeSequencer {
    pub const fn new() -> Self {
        Self {
            mode: Mode::Relaxed,
            candidate: Mode::Relaxed,
            agreeing: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Number of samples so far that agree on a pending mode change.
    pub fn pending_samples(&self) -> u8 {
        self.agreeing
    }

    /// Feeds one classified sample. Returns the previous mode if the mode changed.
    pub fn update(&mut self, candidate: Mode, required: u8) -> Option<Mode> {
        if candidate == self.mode {
            self.candidate = candidate;
            self.agreeing = 0;
            return None;
        }

        if candidate == self.candidate {
            self.agreeing = self.agreeing.saturating_add(1);
        } else {
            self.candidate = candidate;
            self.agreeing = 1;
        }

        if self.agreeing < required.max(1) {
            return None;
        }

        self.agreeing = 0;
        Some(core::mem::replace(&mut self.mode, candidate))
    }
}

#[cfg(test)]
mod test {
    use super::{Mode, ModeSequencer};

    #[test]
    fn starts_relaxed() {
        assert_eq!(ModeSequencer::new().mode(), Mode::Relaxed);
    }

    #[test]
    fn commits_after_enough_agreeing_samples() {
        let mut sequencer = ModeSequencer::new();

        assert_eq!(sequencer.update(Mode::Discharging, 3), None);
        assert_eq!(sequencer.update(Mode::Discharging, 3), None);
        assert_eq!(sequencer.pending_samples(), 2);
        assert_eq!(
            sequencer.update(Mode::Discharging, 3),
            Some(Mode::Relaxed)
        );
        assert_eq!(sequencer.mode(), Mode::Discharging);
        assert_eq!(sequencer.pending_samples(), 0);
    }

    #[test]
    fn spikes_do_not_cause_chatter() {
        let mut sequencer = ModeSequencer::new();

        for _ in 0..10 {
            assert_eq!(sequencer.update(Mode::Charging, 3), None);
            assert_eq!(sequencer.update(Mode::Relaxed, 3), None);
            assert_eq!(sequencer.update(Mode::Discharging, 3), None);
        }

        assert_eq!(sequencer.mode(), Mode::Relaxed);
    }

    #[test]
    fn zero_debounce_behaves_like_one() {
        let mut sequencer = ModeSequencer::new();

        assert_eq!(sequencer.update(Mode::Charging, 0), Some(Mode::Relaxed));
        assert_eq!(sequencer.mode(), Mode::Charging);
    }
}
