//! End of discharge voltage tracking.

use serde::{Deserialize, Serialize};

use crate::config::EdvConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EdvState {
    /// Voltage of the point last latched, mV. 0 if none is latched.
    pub voltage: u16,
    pub percent: u8,
    /// `nac` is held at or above this while discharging, until the next deeper point
    /// latches. mAh
    pub min_capacity: f32,
    /// Comparator armed: discharging and not overloaded.
    pub edv_cmp: bool,
}

/// Latches EDV points as the cell voltage drops below them. Index 0 is the deepest point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EdvTracker {
    state: EdvState,
    latched: Option<usize>,
    candidate: Option<usize>,
    seq_edvs: u8,
}

impl EdvTracker {
    pub fn new(config: &EdvConfig, fcc: f32) -> Self {
        let mut tracker = Self::default();
        tracker.reinit(config, fcc);
        tracker
    }

    pub fn state(&self) -> &EdvState {
        &self.state
    }

    /// Deepest latched point.
    pub fn latched(&self) -> Option<usize> {
        self.latched
    }

    pub fn seq_edvs(&self) -> u8 {
        self.seq_edvs
    }

    fn next_point(&self, config: &EdvConfig) -> Option<usize> {
        match self.latched {
            None => config.points.len().checked_sub(1),
            Some(index) => index.checked_sub(1),
        }
    }

    /// Resets the tracking data, keeping the latched point.
    pub fn reinit(&mut self, config: &EdvConfig, fcc: f32) {
        let latched = self.latched.and_then(|index| config.points.get(index));

        self.state = EdvState {
            voltage: latched.map_or(0, |point| point.voltage),
            percent: latched.map_or(0, |point| point.percent),
            min_capacity: 0.0,
            edv_cmp: false,
        };
        self.candidate = None;
        self.seq_edvs = 0;

        self.refresh_floor(config, fcc);
    }

    /// Recomputes the capacity floor, for when FCC changed.
    pub fn refresh_floor(&mut self, config: &EdvConfig, fcc: f32) {
        self.state.min_capacity = self
            .next_point(config)
            .and_then(|index| config.points.get(index))
            .map_or(0.0, |point| point.capacity(fcc));
    }

    /// Releases all latches.
    pub fn release(&mut self, config: &EdvConfig, fcc: f32) {
        self.latched = None;
        self.reinit(config, fcc);
    }

    pub fn arm(&mut self, armed: bool) {
        self.state.edv_cmp = armed;

        if !armed {
            self.candidate = None;
            self.seq_edvs = 0;
        }
    }

    pub fn latch(&mut self, config: &EdvConfig, index: usize, fcc: f32) {
        let Some(point) = config.points.get(index) else {
            return;
        };

        self.latched = Some(index);
        self.state.voltage = point.voltage;
        self.state.percent = point.percent;
        self.candidate = None;
        self.seq_edvs = 0;

        self.refresh_floor(config, fcc);
    }

    /// Compares one voltage against the points. Returns the index of a newly latched point.
    ///
    /// A point latches once the voltage stayed below it for `seq_edv` consecutive samples.
    pub fn observe(&mut self, config: &EdvConfig, voltage_mv: f32, fcc: f32) -> Option<usize> {
        if !self.state.edv_cmp {
            return None;
        }

        let crossed = config
            .points
            .iter()
            .position(|point| voltage_mv < point.voltage as f32)
            .filter(|&index| self.latched.map_or(true, |latched| index < latched));

        let Some(crossed) = crossed else {
            self.candidate = None;
            self.seq_edvs = 0;
            return None;
        };

        // All samples of the run were below the shallowest point crossed in it.
        let candidate = self.candidate.map_or(crossed, |candidate| candidate.max(crossed));
        self.candidate = Some(candidate);
        self.seq_edvs = self.seq_edvs.saturating_add(1);

        if self.seq_edvs < config.seq_edv.max(1) {
            return None;
        }

        self.latch(config, candidate, fcc);
        Some(candidate)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const FCC: f32 = 2000.0;

    fn armed() -> (EdvConfig, EdvTracker) {
        let config = EdvConfig::default();
        let mut tracker = EdvTracker::new(&config, FCC);
        tracker.arm(true);

        (config, tracker)
    }

    #[test]
    fn floor_starts_at_the_shallowest_point() {
        let config = EdvConfig::default();
        let tracker = EdvTracker::new(&config, FCC);

        assert_eq!(tracker.state().min_capacity, 140.0);
        assert_eq!(tracker.latched(), None);
    }

    #[test]
    fn latches_after_consecutive_samples() {
        let (config, mut tracker) = armed();

        assert_eq!(tracker.observe(&config, 3590.0, FCC), None);
        assert_eq!(tracker.observe(&config, 3590.0, FCC), None);
        assert_eq!(tracker.observe(&config, 3590.0, FCC), Some(2));

        assert_eq!(tracker.latched(), Some(2));
        assert_eq!(tracker.state().voltage, 3600);
        assert_eq!(tracker.state().percent, 7);
        assert_eq!(tracker.state().min_capacity, 60.0);
    }

    #[test]
    fn recovery_interrupts_the_run() {
        let (config, mut tracker) = armed();

        tracker.observe(&config, 3590.0, FCC);
        tracker.observe(&config, 3590.0, FCC);
        assert_eq!(tracker.observe(&config, 3650.0, FCC), None);
        assert_eq!(tracker.seq_edvs(), 0);
        assert_eq!(tracker.observe(&config, 3590.0, FCC), None);
        assert_eq!(tracker.latched(), None);
    }

    #[test]
    fn a_run_across_points_latches_the_shallowest_crossed() {
        let (config, mut tracker) = armed();

        tracker.observe(&config, 3590.0, FCC);
        tracker.observe(&config, 3200.0, FCC);
        assert_eq!(tracker.observe(&config, 3200.0, FCC), Some(2));

        tracker.observe(&config, 3200.0, FCC);
        tracker.observe(&config, 3200.0, FCC);
        assert_eq!(tracker.observe(&config, 3200.0, FCC), Some(0));
        assert_eq!(tracker.state().min_capacity, 0.0);
    }

    #[test]
    fn latches_do_not_flap() {
        let (config, mut tracker) = armed();

        for _ in 0..3 {
            tracker.observe(&config, 3450.0, FCC);
        }
        assert_eq!(tracker.latched(), Some(1));

        for _ in 0..10 {
            assert_eq!(tracker.observe(&config, 3900.0, FCC), None);
        }
        assert_eq!(tracker.latched(), Some(1));

        tracker.reinit(&config, FCC);
        assert_eq!(tracker.latched(), Some(1));
        assert_eq!(tracker.state().percent, 3);
        assert_eq!(tracker.state().min_capacity, 0.0);
    }

    #[test]
    fn disarmed_comparator_ignores_voltage() {
        let (config, mut tracker) = armed();

        tracker.observe(&config, 3450.0, FCC);
        tracker.arm(false);
        for _ in 0..5 {
            assert_eq!(tracker.observe(&config, 3450.0, FCC), None);
        }
        assert_eq!(tracker.seq_edvs(), 0);
    }

    #[test]
    fn release_restores_the_initial_floor() {
        let (config, mut tracker) = armed();

        tracker.latch(&config, 0, FCC);
        tracker.release(&config, FCC);

        assert_eq!(tracker.latched(), None);
        assert_eq!(tracker.state().min_capacity, 140.0);
    }
}
