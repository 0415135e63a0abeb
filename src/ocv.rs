//! Open circuit voltage reference and rest detection.

use core::time::Duration;

use signal_processing::lerp::piecewise;

use crate::config::{OcvConfig, OcvPoint};

/// State of charge in % for a rest voltage. Clamped to the ends of the table, `None` for an
/// empty table.
///
/// ```rust
/// # use palmas_fg::{config::OcvPoint, ocv::reference_soc};
/// let table = [
///     OcvPoint { voltage: 3500, percent: 0 },
///     OcvPoint { voltage: 3700, percent: 50 },
///     OcvPoint { voltage: 4200, percent: 100 },
/// ];
///
/// assert_eq!(reference_soc(&table, 3000.0), Some(0.0));
/// assert_eq!(reference_soc(&table, 3600.0), Some(25.0));
/// assert_eq!(reference_soc(&table, 4200.0), Some(100.0));
/// assert_eq!(reference_soc(&[], 3600.0), None);
/// ```
pub fn reference_soc(table: &[OcvPoint], voltage_mv: f32) -> Option<f32> {
    piecewise(table, voltage_mv, |point| {
        (point.voltage as f32, point.percent as f32)
    })
}

/// Trust in an OCV reading after resting for `rest`.
pub fn weight(rest: Duration, ocv_period: u32) -> f32 {
    if ocv_period == 0 {
        return 1.0;
    }

    (rest.as_secs_f32() / ocv_period as f32).min(1.0)
}

/// Moves `nac` toward the capacity the OCV reference stands for.
///
/// `max_step` bounds the size of the correction, in mAh.
pub fn blend(nac: f32, fcc: f32, reference_percent: f32, weight: f32, max_step: Option<f32>) -> f32 {
    let target = reference_percent * fcc / 100.0;
    let mut step = (target - nac) * weight;

    if let Some(limit) = max_step {
        step = step.clamp(-limit, limit);
    }

    nac + step
}

/// Tracks one continuous rest interval and whether it has been used for a correction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RestTracker {
    start: Option<Duration>,
    stable_samples: u8,
    consumed: bool,
    last: Option<(i32, i32)>,
}

impl RestTracker {
    pub fn start(&mut self, at: Duration) {
        *self = Self {
            start: Some(at),
            ..Self::default()
        };
    }

    pub fn stop(&mut self) {
        *self = Self::default();
    }

    pub fn is_resting(&self) -> bool {
        self.start.is_some()
    }

    pub fn stable_samples(&self) -> u8 {
        self.stable_samples
    }

    pub fn duration(&self, now: Duration) -> Duration {
        self.start
            .map_or(Duration::ZERO, |start| now.saturating_sub(start))
    }

    /// Counts consecutive samples that moved less than the configured differences.
    pub fn observe(&mut self, voltage_mv: i32, current_ma: i32, config: &OcvConfig) {
        if !self.is_resting() {
            return;
        }

        if let Some((voltage, current)) = self.last {
            let stable = voltage_mv.abs_diff(voltage) <= config.voltage_diff as u32
                && current_ma.abs_diff(current) <= config.current_diff as u32;

            self.stable_samples = if stable {
                self.stable_samples.saturating_add(1)
            } else {
                0
            };
        }

        self.last = Some((voltage_mv, current_ma));
    }

    /// Returns the rest duration if a correction may be attempted now. At most once per rest
    /// interval, see [`RestTracker::consume`].
    pub fn due(&self, now: Duration, config: &OcvConfig) -> Option<Duration> {
        if self.consumed || !self.is_resting() {
            return None;
        }

        let rest = self.duration(now);
        let rested = rest >= Duration::from_secs(config.relax_period as u64);
        let stable = self.stable_samples >= config.sleep_enter_samples;

        (rested && stable).then_some(rest)
    }

    pub fn consume(&mut self) {
        self.consumed = true;
    }
}
