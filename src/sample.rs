use core::ops::RangeInclusive;

/// One reading of the sampling collaborator, already in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    pub voltage_mv: i32,
    /// Positive while charging.
    pub current_ma: i32,
    /// LSB = 0.1°C
    pub temperature_dc: i32,
}

impl RawSample {
    pub const VOLTAGE_RANGE: RangeInclusive<i32> = 1..=6000;
    pub const CURRENT_RANGE: RangeInclusive<i32> = -32767..=32767;
    pub const TEMPERATURE_RANGE: RangeInclusive<i32> = -550..=1250;

    /// ```rust
    /// # use palmas_fg::RawSample;
    /// let sample = RawSample {
    ///     voltage_mv: 3800,
    ///     current_ma: -200,
    ///     temperature_dc: 250,
    /// };
    /// assert!(sample.is_plausible());
    ///
    /// assert!(!RawSample { voltage_mv: -5, ..sample }.is_plausible());
    /// assert!(!RawSample { temperature_dc: 1500, ..sample }.is_plausible());
    /// ```
    pub fn is_plausible(&self) -> bool {
        Self::VOLTAGE_RANGE.contains(&self.voltage_mv)
            && Self::CURRENT_RANGE.contains(&self.current_ma)
            && Self::TEMPERATURE_RANGE.contains(&self.temperature_dc)
    }
}

impl From<palmas::Measurement> for RawSample {
    fn from(measurement: palmas::Measurement) -> Self {
        Self {
            voltage_mv: measurement.voltage_mv,
            current_ma: measurement.current_ma,
            temperature_dc: measurement.temperature_dc,
        }
    }
}
