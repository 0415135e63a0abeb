//! Periodic sampling task glue.

use embassy_futures::select::select;
use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    mutex::{Mutex, MutexGuard},
    signal::Signal,
};
use embassy_time::{Duration, Instant, Ticker};
use embedded_hal_async::{delay::DelayNs, i2c::I2c};
use palmas::Palmas;

use crate::{
    config::CellConfig,
    error::{ConfigError, EstimatorError},
    gauge::{FuelGauge, GaugeStatus},
    learning::LearnedParams,
    sample::RawSample,
};

/// Something that can measure the battery.
pub trait SampleSource {
    type Error;

    /// Applies the board parameters of the cell before sampling starts.
    fn configure(&mut self, _config: &CellConfig) {}

    async fn read_sample(&mut self) -> Result<RawSample, Self::Error>;
}

impl<I, D> SampleSource for Palmas<I, D>
where
    I: I2c,
    D: DelayNs,
{
    type Error = palmas::Error<I::Error>;

    fn configure(&mut self, config: &CellConfig) {
        self.set_r_sense(u32::from(config.r_sense));
    }

    async fn read_sample(&mut self) -> Result<RawSample, Self::Error> {
        self.read_measurement().await.map(RawSample::from)
    }
}

/// A fuel gauge shared between the sampling task and its consumers. Updates are serialized by
/// the mutex.
pub struct SharedGauge<M: RawMutex> {
    gauge: Mutex<M, FuelGauge>,
}

impl<M: RawMutex> Default for SharedGauge<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> SharedGauge<M> {
    pub const fn new() -> Self {
        Self {
            gauge: Mutex::new(FuelGauge::new()),
        }
    }

    pub async fn initialize(&self, config: CellConfig) -> Result<(), ConfigError> {
        self.gauge.lock().await.initialize(config)
    }

    pub async fn update(
        &self,
        sample: RawSample,
        dt: core::time::Duration,
    ) -> Result<(), EstimatorError> {
        self.gauge.lock().await.update(sample, dt)
    }

    pub async fn status(&self) -> Option<GaugeStatus> {
        self.gauge.lock().await.status()
    }

    /// Returns `None` if the gauge is busy or not initialized.
    pub fn try_status(&self) -> Option<GaugeStatus> {
        self.gauge.try_lock().ok()?.status()
    }

    pub async fn learned(&self) -> Option<LearnedParams> {
        self.gauge.lock().await.learned()
    }

    pub async fn restore(&self, learned: LearnedParams) -> Result<(), EstimatorError> {
        self.gauge.lock().await.restore(learned)
    }

    pub async fn lock(&self) -> MutexGuard<'_, M, FuelGauge> {
        self.gauge.lock().await
    }
}

fn elapsed(since: Option<Instant>, now: Instant, period: Duration) -> core::time::Duration {
    let dt = since.map_or(period, |previous| now.saturating_duration_since(previous));
    core::time::Duration::from_micros(dt.as_micros())
}

/// Feeds `gauge` with a sample from `source` every `period` until `stop` is signaled.
///
/// The first sample is assumed to cover one `period`. Failed reads and rejected samples are
/// logged and skipped, their interval is attributed to the next accepted sample.
pub async fn monitor<M, S>(
    source: &mut S,
    gauge: &SharedGauge<M>,
    period: Duration,
    stop: &Signal<M, ()>,
) where
    M: RawMutex,
    S: SampleSource,
{
    info!("Fuel gauge monitor started");

    let sampling = async {
        let mut ticker = Ticker::every(period);
        let mut last_sample = None;

        loop {
            match source.read_sample().await {
                Ok(sample) => {
                    let now = Instant::now();
                    let dt = elapsed(last_sample, now, period);

                    let mut gauge = gauge.lock().await;
                    match gauge.update(sample, dt) {
                        Ok(()) => {
                            last_sample = Some(now);

                            if let Some(status) = gauge.status() {
                                if status.updated {
                                    debug!("State of charge: {}%", status.soc);
                                }
                                trace!("Battery status: {:?}", status);
                            }
                        }
                        Err(EstimatorError::InvalidSample) => {
                            warn!("Discarded battery sample: {:?}", sample);
                        }
                        Err(EstimatorError::Uninitialized) => {
                            error!("Fuel gauge is not initialized");
                        }
                    }
                }
                Err(_) => {
                    error!("Failed to read battery data");
                }
            }

            ticker.next().await;
        }
    };

    select(sampling, stop.wait()).await;

    info!("Fuel gauge monitor exited");
}

/// Runs [`monitor`] with the sampling period and sense resistor of the initialized gauge.
pub async fn run_monitor<M, S>(
    source: &mut S,
    gauge: &SharedGauge<M>,
    stop: &Signal<M, ()>,
) -> Result<(), EstimatorError>
where
    M: RawMutex,
    S: SampleSource,
{
    let period = {
        let gauge = gauge.lock().await;
        let config = gauge.state().ok_or(EstimatorError::Uninitialized)?.config();

        source.configure(config);
        Duration::from_secs(u64::from(config.call_period.max(1)))
    };

    monitor(source, gauge, period, stop).await;

    Ok(())
}
