//! First-order (exponential) low-pass filter.

use crate::filter::Filter;

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Exponential {
    alpha: f32,
    output: Option<f32>,
}

impl Exponential {
    /// Creates a filter that moves `alpha` of the way towards each new sample.
    pub const fn new(alpha: f32) -> Self {
        Self {
            alpha,
            output: None,
        }
    }

    /// Creates a filter with time constant `tau`, updated every `dt`. Both must use the same
    /// unit.
    pub fn with_time_constant(tau: f32, dt: f32) -> Self {
        Self::new(Self::alpha_for(tau, dt))
    }

    /// Smoothing weight of a discretized RC filter.
    ///
    /// ```rust
    /// # use signal_processing::filter::exponential::Exponential;
    /// assert_eq!(Exponential::alpha_for(0.0, 1.0), 1.0);
    /// assert_eq!(Exponential::alpha_for(3.0, 1.0), 0.25);
    /// assert_eq!(Exponential::alpha_for(3.0, 0.0), 0.0);
    /// ```
    pub fn alpha_for(tau: f32, dt: f32) -> f32 {
        if tau <= 0.0 {
            1.0
        } else if dt <= 0.0 {
            0.0
        } else {
            dt / (tau + dt)
        }
    }

    /// Changes the time constant without discarding the filter state. Used when the sampling
    /// interval or the desired smoothing changes between samples.
    pub fn set_time_constant(&mut self, tau: f32, dt: f32) {
        self.alpha = Self::alpha_for(tau, dt);
    }

    pub fn output(&self) -> Option<f32> {
        self.output
    }
}

impl Filter for Exponential {
    fn update(&mut self, sample: f32) -> Option<f32> {
        let output = match self.output {
            None => sample,
            Some(previous) => previous + self.alpha * (sample - previous),
        };

        self.output = Some(output);
        Some(output)
    }

    fn clear(&mut self) {
        self.output = None;
    }
}

#[cfg(test)]
mod test {
    use super::Exponential;
    use crate::filter::Filter;

    #[test]
    fn first_sample_seeds_the_output() {
        let mut filter = Exponential::new(0.1);

        assert_eq!(filter.output(), None);
        assert_eq!(filter.update(4000.0), Some(4000.0));
    }

    #[test]
    fn converges_towards_a_step() {
        let mut filter = Exponential::with_time_constant(1.0, 1.0);

        filter.update(0.0);
        assert_eq!(filter.update(100.0), Some(50.0));
        assert_eq!(filter.update(100.0), Some(75.0));
        assert_eq!(filter.update(100.0), Some(87.5));
    }

    #[test]
    fn zero_time_constant_passes_samples_through() {
        let mut filter = Exponential::with_time_constant(0.0, 1.0);

        filter.update(10.0);
        assert_eq!(filter.update(-20.0), Some(-20.0));
    }

    #[test]
    fn clear_reseeds() {
        let mut filter = Exponential::new(0.5);

        filter.update(10.0);
        filter.clear();
        assert_eq!(filter.update(-10.0), Some(-10.0));
    }

    #[test]
    fn retuning_keeps_state() {
        let mut filter = Exponential::with_time_constant(1.0, 1.0);

        filter.update(0.0);
        filter.set_time_constant(3.0, 1.0);
        assert_eq!(filter.update(100.0), Some(25.0));
    }
}
