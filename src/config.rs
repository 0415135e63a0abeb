//! Static cell parameters, owned by the board integration.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of cycles counted before FCC and QMAX learning is applied.
pub const NO_LEARNING_CYCLES: u16 = 25;

pub const OCV_TABLE_SIZE: usize = 21;
pub const EDV_POINT_COUNT: usize = 3;

/// Rest voltage of the cell at a given state of charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OcvPoint {
    /// mV
    pub voltage: u16,
    pub percent: u8,
}

/// End of discharge calibration point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EdvPoint {
    /// mV
    pub voltage: u16,
    pub percent: u8,
}

impl EdvPoint {
    /// Remaining capacity this point stands for, in mAh.
    pub fn capacity(&self, fcc: f32) -> f32 {
        self.percent as f32 * fcc / 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OcvConfig {
    /// Largest sample to sample voltage change of a stable rest sample, mV.
    pub voltage_diff: u16,
    /// Largest sample to sample current change of a stable rest sample, mA.
    pub current_diff: u16,

    pub sleep_enter_current: u16,
    pub sleep_enter_samples: u8,

    pub sleep_exit_current: u16,
    pub sleep_exit_samples: u8,

    /// The electronics load is only accounted for while sleeping below this current, mA.
    pub long_sleep_current: u16,

    /// Rest time after which an OCV reading is fully trusted, s.
    pub ocv_period: u32,
    /// Continuous rest required before any correction, s.
    pub relax_period: u32,

    pub flat_zone_low: u8,
    pub flat_zone_high: u8,

    /// Largest single correction once the gauge is initialized, mAh. 0 means unbounded.
    pub max_ocv_discharge: u16,

    pub table: Vec<OcvPoint, OCV_TABLE_SIZE>,
}

impl OcvConfig {
    /// Builds a table from rest voltages at 0%, 5%, ..., 100%.
    ///
    /// ```rust
    /// # use palmas_fg::config::{OcvConfig, OcvPoint};
    /// let table = OcvConfig::uniform([
    ///     3270, 3610, 3690, 3710, 3730, 3750, 3770, 3790, 3800, 3820, 3840, 3850, 3870, 3910,
    ///     3950, 3980, 4020, 4080, 4110, 4150, 4200,
    /// ]);
    ///
    /// assert_eq!(table.len(), 21);
    /// assert_eq!(table[1], OcvPoint { voltage: 3610, percent: 5 });
    /// assert_eq!(table[20], OcvPoint { voltage: 4200, percent: 100 });
    /// ```
    pub fn uniform(voltages: [u16; OCV_TABLE_SIZE]) -> Vec<OcvPoint, OCV_TABLE_SIZE> {
        voltages
            .iter()
            .enumerate()
            .map(|(i, &voltage)| OcvPoint {
                voltage,
                percent: (i * 100 / (OCV_TABLE_SIZE - 1)) as u8,
            })
            .collect()
    }

    pub fn in_flat_zone(&self, percent: f32) -> bool {
        (self.flat_zone_low as f32..=self.flat_zone_high as f32).contains(&percent)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table.is_empty() {
            return Err(ConfigError::EmptyOcvTable);
        }

        if self.table.iter().any(|point| point.percent > 100) {
            return Err(ConfigError::InvalidPercent);
        }

        let ordered = self
            .table
            .windows(2)
            .all(|pair| pair[0].voltage < pair[1].voltage && pair[0].percent <= pair[1].percent);
        if !ordered {
            return Err(ConfigError::UnorderedOcvTable);
        }

        if self.flat_zone_low > self.flat_zone_high || self.flat_zone_high > 100 {
            return Err(ConfigError::InvalidFlatZone);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EdvConfig {
    /// Compare the filtered voltage instead of the raw one.
    pub averaging: bool,

    /// Consecutive samples below a point before it latches.
    pub seq_edv: u8,

    /// Filter time constants, s.
    pub filter_light: u16,
    pub filter_heavy: u16,

    /// Above this discharge current the EDV comparator is suspended, mA.
    pub overload_current: u16,

    /// Deepest point (EDV0) first.
    pub points: Vec<EdvPoint, EDV_POINT_COUNT>,
}

impl EdvConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.points.iter().any(|point| point.percent > 100) {
            return Err(ConfigError::InvalidPercent);
        }

        let ordered = self
            .points
            .windows(2)
            .all(|pair| pair[0].voltage < pair[1].voltage && pair[0].percent < pair[1].percent);
        if !ordered {
            return Err(ConfigError::UnorderedEdvPoints);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CellConfig {
    /// The sense resistor is wired so that discharge reads positive.
    pub cc_polarity: bool,
    /// Allow OCV corrections after EDV1 has latched.
    pub ocv_below_edv1: bool,

    /// Charge completion: voltage at or above `cc_voltage` (mV) with the charge current
    /// tapered to `cc_current` (mA) for `seq_cc` samples.
    pub cc_voltage: u16,
    pub cc_current: u16,
    /// Also the number of agreeing samples needed to change mode.
    pub seq_cc: u8,
    /// Currents with a magnitude at or below this count as rest, mA.
    pub deadband_current: u16,

    /// mAh
    pub design_capacity: u16,
    /// mAh
    pub design_qmax: u16,

    /// LSB = 1mOhm
    pub r_sense: u16,

    /// Learning tolerances, %.
    pub qmax_adjust: u8,
    pub fcc_adjust: u8,

    /// mAh
    pub max_overcharge: u16,
    /// Load not seen by the sense resistor.
    /// LSB = 10μA
    pub electronics_load: u16,

    /// Learning step limits, mAh.
    pub max_increment: u16,
    pub max_decrement: u16,

    /// No capacity learning below this temperature.
    /// LSB = 0.1°C
    pub low_temp: i16,
    /// mV
    pub deep_dsg_voltage: u16,
    /// Estimated (not measured) discharge allowed in a learning cycle, mAh.
    pub max_dsg_estimate: u16,
    /// mA
    pub light_load: u16,
    /// mAh below FCC where EDV latches are released while charging.
    pub near_full: u16,
    /// mAh below FCC where the full flag is released.
    pub recharge: u16,
    /// Discharge that counts as one cycle, mAh.
    pub cycle_threshold: u16,
    pub no_learning_cycles: u16,

    /// Sampling period of the monitor loop, s.
    pub call_period: u16,

    pub ocv: OcvConfig,
    pub edv: EdvConfig,
}

impl CellConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.design_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        if self.r_sense == 0 {
            return Err(ConfigError::ZeroSenseResistor);
        }

        if self.call_period == 0 {
            return Err(ConfigError::ZeroCallPeriod);
        }

        if self.design_qmax < self.design_capacity {
            return Err(ConfigError::QmaxBelowCapacity);
        }

        self.ocv.validate()?;
        self.edv.validate()
    }
}

impl Default for OcvConfig {
    fn default() -> Self {
        Self {
            voltage_diff: 10,
            current_diff: 5,
            sleep_enter_current: 20,
            sleep_enter_samples: 3,
            sleep_exit_current: 40,
            sleep_exit_samples: 3,
            long_sleep_current: 10,
            ocv_period: 1800,
            relax_period: 600,
            flat_zone_low: 35,
            flat_zone_high: 65,
            max_ocv_discharge: 400,
            table: Self::uniform([
                3270, 3610, 3690, 3710, 3730, 3750, 3770, 3790, 3800, 3820, 3840, 3850, 3870,
                3910, 3950, 3980, 4020, 4080, 4110, 4150, 4200,
            ]),
        }
    }
}

impl Default for EdvConfig {
    fn default() -> Self {
        Self {
            averaging: true,
            seq_edv: 3,
            filter_light: 30,
            filter_heavy: 120,
            overload_current: 1500,
            points: Vec::from_slice(&[
                EdvPoint {
                    voltage: 3300,
                    percent: 0,
                },
                EdvPoint {
                    voltage: 3500,
                    percent: 3,
                },
                EdvPoint {
                    voltage: 3600,
                    percent: 7,
                },
            ])
            .unwrap_or_default(),
        }
    }
}

/// Reference single cell 2000 mAh Li-ion pack.
impl Default for CellConfig {
    fn default() -> Self {
        Self {
            cc_polarity: false,
            ocv_below_edv1: false,
            cc_voltage: 4175,
            cc_current: 100,
            seq_cc: 3,
            deadband_current: 10,
            design_capacity: 2000,
            design_qmax: 2200,
            r_sense: 10,
            qmax_adjust: 1,
            fcc_adjust: 2,
            max_overcharge: 100,
            electronics_load: 200,
            max_increment: 150,
            max_decrement: 150,
            low_temp: 100,
            deep_dsg_voltage: 3000,
            max_dsg_estimate: 300,
            light_load: 100,
            near_full: 200,
            recharge: 150,
            cycle_threshold: 1600,
            no_learning_cycles: NO_LEARNING_CYCLES,
            call_period: 10,
            ocv: OcvConfig::default(),
            edv: EdvConfig::default(),
        }
    }
}
