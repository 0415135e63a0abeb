/// Rejected cell configuration. Fatal: the gauge cannot be initialized until the
/// configuration is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    ZeroCapacity,
    ZeroSenseResistor,
    ZeroCallPeriod,
    QmaxBelowCapacity,
    EmptyOcvTable,
    /// OCV voltages must be strictly ascending and percents must not decrease.
    UnorderedOcvTable,
    /// EDV voltages and percents must both be strictly ascending, deepest point first.
    UnorderedEdvPoints,
    InvalidPercent,
    InvalidFlatZone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EstimatorError {
    /// The sample is physically implausible or `dt` is zero. The state is left untouched and
    /// the next sample may be fed normally.
    InvalidSample,
    /// `update` was called before `initialize`.
    Uninitialized,
}
