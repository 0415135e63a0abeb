//! Cycle counting and FCC/QMAX learning.

#[allow(unused_imports)]
use micromath::F32Ext;
use serde::{Deserialize, Serialize};

/// Capacity parameters worth persisting across power loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LearnedParams {
    /// mAh
    pub fcc: u16,
    /// mAh
    pub qmax: u16,
    pub cycle_count: u16,
    /// Cycle count at the last capacity adjustment.
    pub learned_cycle: u16,
}

/// Capacity observed at the end of a qualified learning discharge.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Observation {
    pub fcc: f32,
    pub qmax: f32,
}

/// Moves `current` toward `observed` if they differ by more than `tolerance_percent`.
///
/// ```rust
/// # use palmas_fg::learning::nudge;
/// // Within tolerance
/// assert_eq!(nudge(2000.0, 1980.0, 2, 150, 150), 2000.0);
/// // Limited step
/// assert_eq!(nudge(2000.0, 1700.0, 2, 150, 100), 1900.0);
/// assert_eq!(nudge(2000.0, 2100.0, 2, 150, 100), 2100.0);
/// ```
pub fn nudge(
    current: f32,
    observed: f32,
    tolerance_percent: u8,
    max_increment: u16,
    max_decrement: u16,
) -> f32 {
    let difference = observed - current;

    if difference.abs() * 100.0 <= current * tolerance_percent as f32 {
        return current;
    }

    current + difference.clamp(-(max_decrement as f32), max_increment as f32)
}

/// Charge bookkeeping of the current cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Learning {
    /// Discharge since the learning discharge started at full, mAh.
    pub learn_q: f32,
    /// Charge in the current charge phase, mAh.
    pub charge_cycle_q: f32,
    /// Discharge not yet counted as a cycle, mAh.
    pub discharge_cycle_q: f32,
    /// Estimated, not measured, discharge of the learning cycle, mAh.
    pub cycle_dsg_estimate: f32,
    pub learned_cycle: u16,
    pending: Option<Observation>,
}

impl Learning {
    pub fn pending(&self) -> Option<Observation> {
        self.pending
    }

    /// Starts a learning discharge.
    pub fn start(&mut self) {
        self.learn_q = 0.0;
        self.cycle_dsg_estimate = 0.0;
    }

    /// Records discharged charge. `estimated` is charge that did not pass the sense resistor.
    pub fn discharge(&mut self, q: f32, estimated: bool) {
        self.learn_q += q;
        self.discharge_cycle_q += q;

        if estimated {
            self.cycle_dsg_estimate += q;
        }
    }

    /// Records the capacity seen when an EDV point latched during a learning discharge.
    pub fn observe(&mut self, percent: u8, fcc: f32, qmax: f32) -> Observation {
        let observation = Observation {
            fcc: self.learn_q + percent as f32 * fcc / 100.0,
            qmax: self.learn_q + percent as f32 * qmax / 100.0,
        };

        self.pending = Some(observation);
        observation
    }

    /// Takes whole cycles out of the discharge accumulator.
    pub fn count_cycles(&mut self, cycle_threshold: u16) -> u16 {
        if cycle_threshold == 0 {
            return 0;
        }

        let threshold = cycle_threshold as f32;
        let cycles = (self.discharge_cycle_q / threshold).floor();
        self.discharge_cycle_q -= cycles * threshold;

        cycles as u16
    }

    pub fn take_pending(&mut self) -> Option<Observation> {
        self.pending.take()
    }
}
