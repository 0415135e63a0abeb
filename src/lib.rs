//! Coulomb counting fuel gauge for batteries measured by a Palmas PMIC.
//!
//! [`CellState`] turns periodic voltage, current and temperature samples into a state of charge
//! and capacity estimate. Drift is corrected from rest voltage (OCV) readings and end of
//! discharge voltage (EDV) points, and the full charge capacity is learned over cycles.
//! [`monitor`] drives a [`FuelGauge`] from any [`SampleSource`], such as
//! [`palmas::Palmas`].
//!
//! ```rust
//! # use core::time::Duration;
//! # use palmas_fg::{CellConfig, FuelGauge, RawSample};
//! let mut gauge = FuelGauge::new();
//! gauge.initialize(CellConfig::default()).unwrap();
//!
//! let sample = RawSample {
//!     voltage_mv: 3800,
//!     current_ma: -200,
//!     temperature_dc: 250,
//! };
//! gauge.update(sample, Duration::from_secs(3600)).unwrap();
//!
//! let status = gauge.status().unwrap();
//! assert_eq!(status.nac, 1800);
//! assert_eq!(status.soc, 90);
//! ```

#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

#[macro_use]
extern crate logger;

pub mod config;
pub mod edv;
pub mod error;
pub mod gauge;
pub mod learning;
pub mod monitor;
pub mod ocv;
pub mod sample;
pub mod sequencer;
pub mod state;

pub use config::{CellConfig, EdvConfig, EdvPoint, OcvConfig, OcvPoint};
pub use error::{ConfigError, EstimatorError};
pub use gauge::{FuelGauge, GaugeStatus};
pub use learning::LearnedParams;
pub use monitor::{monitor, run_monitor, SampleSource, SharedGauge};
pub use sample::RawSample;
pub use sequencer::Mode;
pub use state::{CellState, Flags};
