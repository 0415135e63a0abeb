use core::time::Duration;

use crate::{
    config::CellConfig,
    error::{ConfigError, EstimatorError},
    learning::LearnedParams,
    sample::RawSample,
    state::CellState,
};

/// Snapshot for the power supply consumers: UI, charger throttling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GaugeStatus {
    pub soc: u8,
    /// `soc` changed with the last accepted sample.
    pub updated: bool,
    /// mAh
    pub nac: u16,
    /// mAh
    pub fcc: u16,
    /// mAh
    pub qmax: u16,
    pub cycle_count: u16,
    pub edv0: bool,
    pub edv1: bool,
    pub edv2: bool,
    pub full: bool,
    pub charging: bool,
    pub discharging: bool,
    /// `soc` has been anchored to a measurement since power-up.
    pub initialized: bool,
    /// mV
    pub voltage: i32,
    /// mA
    pub current: i32,
    /// 0.1°C
    pub temperature: i32,
}

impl GaugeStatus {
    pub fn is_low(&self) -> bool {
        self.edv1
    }
}

impl From<&CellState> for GaugeStatus {
    fn from(state: &CellState) -> Self {
        let flags = state.flags();

        Self {
            soc: state.soc(),
            updated: state.updated(),
            nac: state.nac(),
            fcc: state.fcc(),
            qmax: state.qmax(),
            cycle_count: state.cycle_count(),
            edv0: flags.edv0,
            edv1: flags.edv1,
            edv2: flags.edv2,
            full: flags.full,
            charging: flags.chg,
            discharging: flags.dsg,
            initialized: flags.init,
            voltage: state.voltage(),
            current: state.current(),
            temperature: state.temperature(),
        }
    }
}

/// Holds the state of one cell from power-up on, before a configuration is available.
#[derive(Debug, Clone, Default)]
pub struct FuelGauge {
    state: Option<CellState>,
}

impl FuelGauge {
    pub const fn new() -> Self {
        Self { state: None }
    }

    /// (Re)starts estimation with `config`. A previous state is discarded; on error the gauge
    /// is left unchanged.
    pub fn initialize(&mut self, config: CellConfig) -> Result<(), ConfigError> {
        let state = CellState::initialize(config)?;
        self.state = Some(state);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn update(&mut self, sample: RawSample, dt: Duration) -> Result<(), EstimatorError> {
        let Some(state) = self.state.as_mut() else {
            error!("Fuel gauge updated before initialization");
            return Err(EstimatorError::Uninitialized);
        };

        state.update(sample, dt)
    }

    pub fn state(&self) -> Option<&CellState> {
        self.state.as_ref()
    }

    pub fn status(&self) -> Option<GaugeStatus> {
        self.state.as_ref().map(GaugeStatus::from)
    }

    pub fn learned(&self) -> Option<LearnedParams> {
        self.state.as_ref().map(CellState::learned)
    }

    pub fn restore(&mut self, learned: LearnedParams) -> Result<(), EstimatorError> {
        let state = self.state.as_mut().ok_or(EstimatorError::Uninitialized)?;
        state.restore(learned);
        Ok(())
    }
}
