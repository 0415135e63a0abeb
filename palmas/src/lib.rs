#![no_std]

#[macro_use]
extern crate logger;

use device_descriptor::{Bit, Register};
use embedded_hal_async::{delay::DelayNs as AsyncDelayNs, i2c::I2c as AsyncI2c};
#[allow(unused_imports)]
use micromath::F32Ext;
use register_access::{AsyncRegisterAccess, AsyncRegisterReader, AsyncRegisterWriter};
use signal_processing::lerp::piecewise;

use crate::descriptors::*;

pub mod descriptors;
pub mod ll;

const GPADC_POLL_ATTEMPTS: usize = 20;
const GPADC_POLL_INTERVAL_US: u32 = 100;
const GPADC_FULL_SCALE_CODE: u32 = 4095;

/// Used when the thermistor chart is empty.
pub const NOMINAL_TEMPERATURE_DC: i32 = 250;

/// Reference chart of a 10 kΩ NTC divider on the thermistor channel. Ascending code, so
/// descending temperature.
pub const DEFAULT_THERMISTOR: &[(u16, i16)] = &[
    (600, 600),
    (1000, 450),
    (1600, 250),
    (2400, 50),
    (3000, -100),
    (3400, -200),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    Transfer(E),
    /// The GPADC did not signal end of conversion in time.
    Timeout,
}

#[derive(Clone, Copy, Debug)]
pub struct SenseConfig {
    /// LSB = 1mOhm
    pub r_sense: u32,
    pub vbat_channel: u8,
    pub temperature_channel: u8,
    /// Battery voltage at GPADC code 4095.
    /// LSB = 1mV
    pub vbat_full_scale_mv: u32,
    /// `(GPADC code, temperature in 0.1°C)` pairs, ascending code.
    pub thermistor: &'static [(u16, i16)],
}

impl Default for SenseConfig {
    fn default() -> Self {
        Self {
            r_sense: 10,
            vbat_channel: 6,
            temperature_channel: 1,
            vbat_full_scale_mv: 6000,
            thermistor: DEFAULT_THERMISTOR,
        }
    }
}

impl SenseConfig {
    /// Converts an averaged coulomb counter reading to a current in mA.
    ///
    /// ```rust
    /// # use palmas::SenseConfig;
    /// let config = SenseConfig {
    ///     r_sense: 10,
    ///     ..Default::default()
    /// };
    ///
    /// assert_eq!(config.raw_current_to_ma(0), 0);
    /// assert_eq!(config.raw_current_to_ma(8192), 6200);
    /// assert_eq!(config.raw_current_to_ma(-8192), -6200);
    /// assert_eq!(config.raw_current_to_ma(1321), 999);
    ///
    /// let config = SenseConfig {
    ///     r_sense: 20,
    ///     ..Default::default()
    /// };
    ///
    /// assert_eq!(config.raw_current_to_ma(8192), 3100);
    /// ```
    #[inline]
    pub fn raw_current_to_ma(&self, raw: i32) -> i32 {
        let rsense = self.r_sense.max(1) as i64;

        (raw as i64 * 62_000 / (8192 * rsense)) as i32
    }

    /// Converts a VBAT channel GPADC code to mV.
    ///
    /// ```rust
    /// # use palmas::SenseConfig;
    /// let config = SenseConfig::default();
    ///
    /// assert_eq!(config.raw_vbat_to_mv(0), 0);
    /// assert_eq!(config.raw_vbat_to_mv(2730), 4000);
    /// assert_eq!(config.raw_vbat_to_mv(4095), 6000);
    /// ```
    #[inline]
    pub fn raw_vbat_to_mv(&self, raw: u16) -> i32 {
        (raw as u32 * self.vbat_full_scale_mv / GPADC_FULL_SCALE_CODE) as i32
    }

    /// Looks up a thermistor channel GPADC code in the chart. Codes outside the chart read as
    /// the nearest end.
    ///
    /// ```rust
    /// # use palmas::SenseConfig;
    /// let config = SenseConfig::default();
    ///
    /// assert_eq!(config.raw_to_temperature_dc(1600), Some(250));
    /// assert_eq!(config.raw_to_temperature_dc(1300), Some(350));
    /// assert_eq!(config.raw_to_temperature_dc(100), Some(600));
    /// assert_eq!(config.raw_to_temperature_dc(4000), Some(-200));
    /// ```
    pub fn raw_to_temperature_dc(&self, raw: u16) -> Option<i32> {
        piecewise(self.thermistor, raw as f32, |&(code, temperature)| {
            (code as f32, temperature as f32)
        })
        .map(|temperature| temperature.round() as i32)
    }
}

/// Snapshot of the coulomb counter registers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CoulombCounter {
    /// 24 bit
    pub samples: u32,
    pub accumulator: i32,
    /// 10 bit signed, per sample
    pub offset: i16,
    /// 14 bit signed, last conversion
    pub integrator: i16,
}

impl CoulombCounter {
    pub const REGISTER_COUNT: usize = 11;

    /// Decodes FG_REG_01 to FG_REG_11 as read in one transfer.
    pub fn from_bytes(bytes: &[u8; Self::REGISTER_COUNT]) -> Self {
        let offset = u16::from_le_bytes([bytes[7], bytes[8] & 0x03]);
        let integrator = u16::from_le_bytes([bytes[9], bytes[10] & 0x3F]);

        Self {
            samples: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]),
            accumulator: i32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]),
            offset: ((offset << 6) as i16) >> 6,
            integrator: ((integrator << 2) as i16) >> 2,
        }
    }

    /// Offset compensated average of the raw current since `previous`. Falls back to the last
    /// integrator value if no samples were taken in between.
    pub fn average_since(&self, previous: &Self) -> i32 {
        let samples = self.samples.wrapping_sub(previous.samples) & 0x00FF_FFFF;
        if samples == 0 {
            return self.integrator as i32;
        }

        let samples = samples as i64;
        let charge = self.accumulator.wrapping_sub(previous.accumulator) as i64
            - self.offset as i64 * samples;

        (charge / samples) as i32
    }
}

/// Physical quantities sampled in one read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    pub voltage_mv: i32,
    /// Average since the previous measurement. Positive when charging.
    pub current_ma: i32,
    pub temperature_dc: i32,
}

pub struct Palmas<I, D> {
    interface: ll::PalmasI2cInterface<I>,
    delay: D,
    config: SenseConfig,
    last_counter: Option<CoulombCounter>,
}

impl<I, D> Palmas<I, D> {
    pub const fn new(i2c: I, delay: D, config: SenseConfig) -> Self {
        Self {
            interface: ll::PalmasI2cInterface::new(i2c),
            delay,
            config,
            last_counter: None,
        }
    }

    pub fn with_primary_address(mut self, address: u8) -> Self {
        self.interface.primary_address = address;
        self
    }

    pub fn config(&self) -> &SenseConfig {
        &self.config
    }

    /// LSB = 1mOhm
    pub fn set_r_sense(&mut self, r_sense: u32) {
        self.config.r_sense = r_sense;
    }

    pub fn into_inner(self) -> I {
        self.interface.i2c
    }
}

impl<I, D> Palmas<I, D>
where
    I: AsyncI2c,
    D: AsyncDelayNs,
{
    /// Starts the coulomb counter and forgets the previous reading.
    pub async fn enable_coulomb_counter(&mut self) -> Result<(), Error<I::Error>> {
        self.interface
            .modify_register_async::<FgControl>(|w| {
                w.fg_en()
                    .write(Bit::Set)
                    .autoclear()
                    .write(Bit::Cleared)
                    .pause()
                    .write(Bit::Cleared)
            })
            .await
            .map(|_| ())
            .map_err(Error::Transfer)?;

        self.last_counter = None;
        debug!("Coulomb counter enabled");

        Ok(())
    }

    async fn set_paused(&mut self, paused: bool) -> Result<(), I::Error> {
        self.interface
            .modify_register_async::<FgControl>(|w| w.pause().write(paused.into()))
            .await
            .map(|_| ())
    }

    /// Reads the counter registers in one transfer while the counter is paused.
    pub async fn read_coulomb_counter(&mut self) -> Result<CoulombCounter, Error<I::Error>> {
        self.set_paused(true).await.map_err(Error::Transfer)?;

        let mut bytes = [0; CoulombCounter::REGISTER_COUNT];
        let read = self
            .interface
            .read_sequential_async::<FgSampleCounter>(&mut bytes)
            .await;

        self.set_paused(false).await.map_err(Error::Transfer)?;
        read.map_err(Error::Transfer)?;

        let counter = CoulombCounter::from_bytes(&bytes);
        trace!(
            "Coulomb counter: {} samples, accumulator {}, offset {}",
            counter.samples,
            counter.accumulator,
            counter.offset
        );

        Ok(counter)
    }

    pub async fn read_sleep_status(&mut self) -> Result<bool, Error<I::Error>> {
        let reg = FgSleep::read_async(&mut self.interface)
            .await
            .map_err(Error::Transfer)?;

        Ok(reg.bat_sleep_status().read() == Some(Bit::Set))
    }

    /// Runs a software GPADC conversion and returns the 12 bit code.
    pub async fn read_gpadc(&mut self, channel: u8) -> Result<u16, Error<I::Error>> {
        let conversion = self.convert(channel & 0x0F).await;
        let release = self.release_gpadc().await;

        let code = conversion?;
        release.map_err(Error::Transfer)?;

        trace!("GPADC channel {}: {}", channel, code);

        Ok(code)
    }

    async fn convert(&mut self, channel: u8) -> Result<u16, Error<I::Error>> {
        self.interface
            .modify_register_async::<GpadcCtrl1>(|w| w.gpadc_force().write(Bit::Set))
            .await
            .map(|_| ())
            .map_err(Error::Transfer)?;

        // Clears a stale end of conversion flag.
        Int3Status::read_async(&mut self.interface)
            .await
            .map(|_| ())
            .map_err(Error::Transfer)?;

        GpadcSwSelect::new(|w| w.sw_conv_en().write(Bit::Set).channel().write(channel))
            .write_async(&mut self.interface)
            .await
            .map_err(Error::Transfer)?;
        GpadcSwSelect::new(|w| {
            w.sw_conv_en()
                .write(Bit::Set)
                .sw_start_conv0()
                .write(Bit::Set)
                .channel()
                .write(channel)
        })
        .write_async(&mut self.interface)
        .await
        .map_err(Error::Transfer)?;

        for _ in 0..GPADC_POLL_ATTEMPTS {
            self.delay.delay_us(GPADC_POLL_INTERVAL_US).await;

            let status = Int3Status::read_async(&mut self.interface)
                .await
                .map_err(Error::Transfer)?;

            if status.gpadc_eoc_sw().read() == Some(Bit::Set) {
                let mut bytes = [0; 2];
                self.interface
                    .read_sequential_async::<GpadcSwConv0Lsb>(&mut bytes)
                    .await
                    .map_err(Error::Transfer)?;

                return Ok(u16::from_le_bytes([bytes[0], bytes[1] & 0x0F]));
            }
        }

        warn!("GPADC conversion on channel {} timed out", channel);
        Err(Error::Timeout)
    }

    async fn release_gpadc(&mut self) -> Result<(), I::Error> {
        GpadcSwSelect::default()
            .write_async(&mut self.interface)
            .await?;
        self.interface
            .modify_register_async::<GpadcCtrl1>(|w| w.gpadc_force().write(Bit::Cleared))
            .await
            .map(|_| ())
    }

    /// Samples the battery: average current since the previous successful measurement, battery
    /// voltage and thermistor temperature.
    pub async fn read_measurement(&mut self) -> Result<Measurement, Error<I::Error>> {
        let counter = self.read_coulomb_counter().await?;
        let vbat = self.read_gpadc(self.config.vbat_channel).await?;
        let thermistor = self.read_gpadc(self.config.temperature_channel).await?;

        let previous = self.last_counter.replace(counter).unwrap_or_default();
        let raw_current = counter.average_since(&previous);

        Ok(Measurement {
            voltage_mv: self.config.raw_vbat_to_mv(vbat),
            current_ma: self.config.raw_current_to_ma(raw_current),
            temperature_dc: self
                .config
                .raw_to_temperature_dc(thermistor)
                .unwrap_or(NOMINAL_TEMPERATURE_DC),
        })
    }
}
