//! Per-cell estimator state.

use core::time::Duration;

#[allow(unused_imports)]
use micromath::F32Ext;
use signal_processing::filter::{exponential::Exponential, Filter};

use crate::{
    config::{CellConfig, EDV_POINT_COUNT},
    edv::{EdvState, EdvTracker},
    error::{ConfigError, EstimatorError},
    learning::{nudge, LearnedParams, Learning},
    ocv::{self, RestTracker},
    sample::RawSample,
    sequencer::{Mode, ModeSequencer},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Flags {
    pub sleep: bool,
    pub relax: bool,
    pub chg: bool,
    pub dsg: bool,
    pub edv0: bool,
    pub edv1: bool,
    pub edv2: bool,
    /// The gauge is sitting on an OCV correction of the current rest interval.
    pub ocv: bool,
    /// Charge complete
    pub cc: bool,
    pub full: bool,
    /// Discharge qualified for learning: started from a full cell.
    pub vdq: bool,
    /// `nac` has been anchored to a measurement at least once.
    pub init: bool,
}

impl Flags {
    /// Latches the flags for EDV point `index` of a table with `points` entries.
    ///
    /// Tables are aligned to the shallow end: the last point is always EDV2, so a
    /// two-point table has EDV1 and EDV2 and a single point only drives EDV2.
    fn set_edv_from(&mut self, index: usize, points: usize) {
        let depth = (index + EDV_POINT_COUNT).saturating_sub(points);

        self.edv0 |= depth == 0;
        self.edv1 |= depth <= 1;
        self.edv2 = true;
    }

    fn clear_edv(&mut self) {
        self.edv0 = false;
        self.edv1 = false;
        self.edv2 = false;
    }
}

/// Charge that did not fit the `[0, fcc]` range of `nac`, mAh.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulators {
    pub overcharge_q: f32,
    pub negative_q: f32,
    /// Charge taken in while above the charge completion voltage.
    pub top_off_q: f32,
    /// `nac` when the current rest interval began.
    pub ocv_enter_q: f32,
}

fn round_mah(value: f32) -> u16 {
    value.max(0.0).round() as u16
}

/// Mutable state of one cell. Created by [`CellState::initialize`], advanced by
/// [`CellState::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct CellState {
    config: CellConfig,

    soc: u8,
    prev_soc: u8,
    updated: bool,
    nac: f32,
    fcc: f32,
    qmax: f32,

    voltage: i32,
    current: i32,
    temperature: i32,
    av_voltage: Exponential,
    av_current: Exponential,

    cycle_count: u16,
    flags: Flags,

    sequencer: ModeSequencer,
    rest: RestTracker,
    edv: EdvTracker,
    learning: Learning,
    accumulators: Accumulators,

    seq_cc_voltage: u8,
    sleep_samples: u8,

    uptime: Duration,
    last_correction: Option<Duration>,
    last_ocv: Option<Duration>,
    sleep_timer: Option<Duration>,
    cumulative_sleep: Duration,
}

impl CellState {
    pub fn initialize(config: CellConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let fcc = config.design_capacity as f32;
        let edv = EdvTracker::new(&config.edv, fcc);

        let mut state = Self {
            soc: 0,
            prev_soc: 0,
            updated: false,
            nac: fcc,
            fcc,
            qmax: config.design_qmax as f32,

            voltage: 0,
            current: 0,
            temperature: 0,
            av_voltage: Exponential::new(1.0),
            av_current: Exponential::new(1.0),

            cycle_count: 0,
            flags: Flags {
                relax: true,
                ..Flags::default()
            },

            sequencer: ModeSequencer::new(),
            rest: RestTracker::default(),
            edv,
            learning: Learning::default(),
            accumulators: Accumulators::default(),

            seq_cc_voltage: 0,
            sleep_samples: 0,

            uptime: Duration::ZERO,
            last_correction: None,
            last_ocv: None,
            sleep_timer: None,
            cumulative_sleep: Duration::ZERO,

            config,
        };

        state.rest.start(Duration::ZERO);
        state.update_soc();
        state.prev_soc = state.soc;

        info!(
            "Fuel gauge initialized: {} mAh design capacity, {} mAh qmax",
            state.config.design_capacity,
            state.config.design_qmax
        );

        Ok(state)
    }

    /// Feeds one sample covering the last `dt`.
    ///
    /// Implausible samples and a zero `dt` are rejected with [`EstimatorError::InvalidSample`]
    /// and leave the state untouched.
    pub fn update(&mut self, sample: RawSample, dt: Duration) -> Result<(), EstimatorError> {
        if dt.is_zero() || !sample.is_plausible() {
            warn!(
                "Rejected sample: {} mV, {} mA, {} dC",
                sample.voltage_mv,
                sample.current_ma,
                sample.temperature_dc
            );
            return Err(EstimatorError::InvalidSample);
        }

        let current = if self.config.cc_polarity {
            -sample.current_ma
        } else {
            sample.current_ma
        };
        let seconds = dt.as_secs_f32();
        let interval_start = self.uptime;

        self.uptime = self.uptime.saturating_add(dt);
        self.voltage = sample.voltage_mv;
        self.current = current;
        self.temperature = sample.temperature_dc;

        self.filter(seconds);
        self.classify(interval_start);
        self.track_sleep(dt);
        self.integrate(seconds);
        self.track_charge_completion();
        self.correct_ocv();
        self.track_edv();
        self.track_learning();
        self.count_cycles();

        self.prev_soc = self.soc;
        self.enforce_invariants();
        self.updated = self.soc != self.prev_soc;

        Ok(())
    }

    fn filter(&mut self, seconds: f32) {
        let light_load = self.config.light_load as f32;
        let heavy = self
            .av_current
            .output()
            .is_some_and(|current| current.abs() < light_load);

        let tau = f32::from(if heavy {
            self.config.edv.filter_heavy
        } else {
            self.config.edv.filter_light
        });

        self.av_current.set_time_constant(tau, seconds);
        self.av_voltage.set_time_constant(tau, seconds);
        self.av_current.update(self.current as f32);
        self.av_voltage.update(self.voltage as f32);
    }

    fn classify(&mut self, interval_start: Duration) {
        let candidate = Mode::classify(self.current, self.config.deadband_current);

        if let Some(previous) = self.sequencer.update(candidate, self.config.seq_cc) {
            let mode = self.sequencer.mode();
            debug!("Mode change: {:?} -> {:?}", previous, mode);

            self.on_mode_change(previous, mode, interval_start);
        }

        let mode = self.sequencer.mode();
        self.flags.chg = mode == Mode::Charging;
        self.flags.dsg = mode == Mode::Discharging;
        self.flags.relax = mode == Mode::Relaxed;

        let overloaded = self.av_current().abs() > self.config.edv.overload_current as f32;
        self.edv.arm(self.flags.dsg && !overloaded);
    }

    fn on_mode_change(&mut self, previous: Mode, mode: Mode, interval_start: Duration) {
        if previous == Mode::Relaxed {
            self.rest.stop();
            self.flags.ocv = false;
        }

        if previous == Mode::Charging {
            self.flags.cc = false;
            self.seq_cc_voltage = 0;
        }

        match mode {
            Mode::Relaxed => {
                self.rest.start(interval_start);
                self.accumulators.ocv_enter_q = self.nac;
            }
            Mode::Charging => {
                self.flags.vdq = false;
                self.learning.charge_cycle_q = 0.0;
                self.accumulators.top_off_q = 0.0;
            }
            Mode::Discharging => {
                if previous == Mode::Charging {
                    self.edv.reinit(&self.config.edv, self.fcc);
                }

                if self.flags.full && !self.flags.vdq {
                    debug!("Learning discharge started");
                    self.flags.vdq = true;
                    self.learning.start();
                }
            }
        }
    }

    fn track_sleep(&mut self, dt: Duration) {
        let magnitude = self.current.unsigned_abs();
        let ocv = &self.config.ocv;

        if self.flags.sleep {
            self.cumulative_sleep = self.cumulative_sleep.saturating_add(dt);

            if magnitude > ocv.sleep_exit_current as u32 {
                self.sleep_samples = self.sleep_samples.saturating_add(1);
                if self.sleep_samples >= ocv.sleep_exit_samples.max(1) {
                    debug!("Leaving sleep");
                    self.flags.sleep = false;
                    self.sleep_timer = None;
                    self.sleep_samples = 0;
                }
            } else {
                self.sleep_samples = 0;
            }
        } else if magnitude < ocv.sleep_enter_current as u32 {
            self.sleep_samples = self.sleep_samples.saturating_add(1);
            if self.sleep_samples >= ocv.sleep_enter_samples.max(1) {
                debug!("Entering sleep");
                self.flags.sleep = true;
                self.sleep_timer = Some(self.uptime);
                self.sleep_samples = 0;
            }
        } else {
            self.sleep_samples = 0;
        }
    }

    fn integrate(&mut self, seconds: f32) {
        let q = self.current as f32 * seconds / 3600.0;

        if q > 0.0 {
            self.charge(q);
        } else if q < 0.0 {
            self.discharge(-q, false);
        }

        let long_sleep = self.current.unsigned_abs() < self.config.ocv.long_sleep_current as u32;
        if self.flags.sleep && long_sleep {
            // 10 μA units
            let load_ma = self.config.electronics_load as f32 / 100.0;
            self.discharge(load_ma * seconds / 3600.0, true);
        }

        self.nac = self.nac.clamp(0.0, self.fcc);

        let floor = self.edv.state().min_capacity.min(self.fcc);
        if self.flags.dsg && self.edv.state().edv_cmp && self.nac < floor {
            self.nac = floor;
        }

        if self.flags.full && self.nac < self.fcc - self.config.recharge as f32 {
            debug!("Full flag released");
            self.flags.full = false;
        }

        if self.flags.chg && self.nac >= self.fcc - self.config.near_full as f32 {
            self.release_edv();
        }
    }

    fn charge(&mut self, q: f32) {
        self.learning.charge_cycle_q += q;
        if self.voltage >= self.config.cc_voltage as i32 {
            self.accumulators.top_off_q += q;
        }

        // Refill up to FCC first, even while the full flag is still held.
        let stored = q.min((self.fcc - self.nac).max(0.0));
        self.nac += stored;

        let excess = q - stored;
        if excess > 0.0 {
            let limit = self.config.max_overcharge as f32;
            self.accumulators.overcharge_q = (self.accumulators.overcharge_q + excess).min(limit);
        }
    }

    fn discharge(&mut self, q: f32, estimated: bool) {
        let from_overcharge = q.min(self.accumulators.overcharge_q);
        self.accumulators.overcharge_q -= from_overcharge;

        self.nac -= q - from_overcharge;
        if self.nac < 0.0 {
            self.accumulators.negative_q += -self.nac;
            self.nac = 0.0;
        }

        self.learning.discharge(q, estimated);
    }

    fn release_edv(&mut self) {
        if self.flags.edv2 {
            debug!("EDV latches released");
        }

        self.flags.clear_edv();
        self.edv.release(&self.config.edv, self.fcc);
    }

    fn track_charge_completion(&mut self) {
        let tapered = self.current.unsigned_abs() <= self.config.cc_current as u32;
        let topped = self.voltage >= self.config.cc_voltage as i32;

        if !(self.flags.chg && tapered && topped) {
            self.seq_cc_voltage = 0;
            return;
        }

        self.seq_cc_voltage = self.seq_cc_voltage.saturating_add(1);
        if self.flags.cc || self.seq_cc_voltage < self.config.seq_cc.max(1) {
            return;
        }

        info!(
            "Charge complete at {} mV, {} mAh overcharge",
            self.voltage,
            self.accumulators.overcharge_q
        );

        self.flags.cc = true;
        self.flags.full = true;
        self.flags.init = true;
        self.nac = self.fcc;
        self.last_correction = Some(self.uptime);
        self.release_edv();
    }

    fn correct_ocv(&mut self) {
        if !self.flags.relax {
            return;
        }

        let ocv = &self.config.ocv;
        self.rest.observe(self.voltage, self.current, ocv);

        // A load spike that the sequencer has not committed yet is not rest.
        if Mode::classify(self.current, self.config.deadband_current) != Mode::Relaxed {
            return;
        }

        let Some(rest) = self.rest.due(self.uptime, ocv) else {
            return;
        };
        self.rest.consume();

        let Some(reference) = ocv::reference_soc(&ocv.table, self.voltage as f32) else {
            return;
        };

        if self.flags.init && ocv.in_flat_zone(reference) {
            debug!("OCV reference {}% is in the flat zone", reference);
            return;
        }

        if self.flags.edv1 && !self.config.ocv_below_edv1 {
            debug!("OCV correction skipped below EDV1");
            return;
        }

        let (weight, max_step) = if self.flags.init {
            let max_step = (ocv.max_ocv_discharge > 0).then_some(ocv.max_ocv_discharge as f32);
            (ocv::weight(rest, ocv.ocv_period), max_step)
        } else {
            (1.0, None)
        };

        let previous = self.nac;
        self.nac = ocv::blend(self.nac, self.fcc, reference, weight, max_step).clamp(0.0, self.fcc);

        info!(
            "OCV correction at {} mV: {} mAh -> {} mAh (reference {}%)",
            self.voltage,
            previous,
            self.nac,
            reference
        );

        self.flags.init = true;
        self.flags.ocv = true;
        self.last_ocv = Some(self.uptime);
        self.last_correction = Some(self.uptime);
    }

    fn track_edv(&mut self) {
        if !self.flags.dsg || !self.edv.state().edv_cmp {
            return;
        }

        let voltage = if self.config.edv.averaging {
            self.av_voltage()
        } else {
            self.voltage as f32
        };

        if voltage < self.config.deep_dsg_voltage as f32 {
            if !self.flags.edv0 || self.nac > 0.0 {
                info!("Deep discharge at {} mV, cell empty", voltage);
            }

            self.nac = 0.0;
            self.flags.edv0 = true;
            self.flags.edv1 = true;
            self.flags.edv2 = true;
            self.edv.latch(&self.config.edv, 0, self.fcc);
            self.last_correction = Some(self.uptime);
            return;
        }

        let Some(index) = self.edv.observe(&self.config.edv, voltage, self.fcc) else {
            return;
        };
        let Some(point) = self.config.edv.points.get(index).copied() else {
            return;
        };

        info!("EDV{} latched at {} mV", index, voltage);
        self.flags.set_edv_from(index, self.config.edv.points.len());

        let capacity = point.capacity(self.fcc);
        if self.nac > capacity {
            self.nac = capacity;
            self.last_correction = Some(self.uptime);
        }

        if self.flags.vdq {
            let observation = self.learning.observe(point.percent, self.fcc, self.qmax);
            self.flags.vdq = false;

            info!(
                "Learning discharge finished: {} mAh capacity, {} mAh qmax",
                observation.fcc,
                observation.qmax
            );
        }
    }

    fn track_learning(&mut self) {
        if !self.flags.vdq {
            return;
        }

        if self.temperature < self.config.low_temp as i32 {
            debug!("Learning disqualified: {} dC is too cold", self.temperature);
            self.flags.vdq = false;
        } else if self.learning.cycle_dsg_estimate > self.config.max_dsg_estimate as f32 {
            debug!("Learning disqualified: too much estimated discharge");
            self.flags.vdq = false;
        }
    }

    fn count_cycles(&mut self) {
        let cycles = self.learning.count_cycles(self.config.cycle_threshold);
        if cycles == 0 {
            return;
        }

        self.cycle_count = self.cycle_count.saturating_add(cycles);
        info!("Cycle count: {}", self.cycle_count);

        if self.cycle_count <= self.config.no_learning_cycles {
            return;
        }

        let Some(observation) = self.learning.take_pending() else {
            return;
        };

        let config = &self.config;
        let qmax = nudge(
            self.qmax,
            observation.qmax,
            config.qmax_adjust,
            config.max_increment,
            config.max_decrement,
        );
        let fcc = nudge(
            self.fcc,
            observation.fcc,
            config.fcc_adjust,
            config.max_increment,
            config.max_decrement,
        );

        if fcc != self.fcc || qmax != self.qmax {
            info!(
                "Capacity learned: fcc {} -> {} mAh, qmax {} -> {} mAh",
                self.fcc,
                fcc,
                self.qmax,
                qmax
            );
        }

        self.qmax = qmax.max(self.min_capacity());
        self.fcc = fcc.clamp(self.min_capacity(), self.qmax);
        self.learning.learned_cycle = self.cycle_count;
        self.edv.refresh_floor(&self.config.edv, self.fcc);
    }

    fn min_capacity(&self) -> f32 {
        (self.config.design_capacity / 4).max(1) as f32
    }

    fn enforce_invariants(&mut self) {
        self.fcc = self.fcc.min(self.qmax);
        self.nac = self.nac.clamp(0.0, self.fcc);
        self.update_soc();
    }

    fn update_soc(&mut self) {
        self.soc = if self.fcc > 0.0 {
            (100.0 * self.nac / self.fcc).round().clamp(0.0, 100.0) as u8
        } else {
            0
        };
    }

    /// Restores capacity parameters learned before a power loss.
    pub fn restore(&mut self, learned: LearnedParams) {
        let min_capacity = self.min_capacity();

        self.qmax = (learned.qmax as f32).max(min_capacity);
        self.fcc = (learned.fcc as f32).clamp(min_capacity, self.qmax);
        self.cycle_count = learned.cycle_count;
        self.learning.learned_cycle = learned.learned_cycle.min(learned.cycle_count);
        self.edv.refresh_floor(&self.config.edv, self.fcc);
        self.enforce_invariants();

        info!(
            "Restored fcc {} mAh, qmax {} mAh, {} cycles",
            self.fcc,
            self.qmax,
            self.cycle_count
        );
    }

    pub fn learned(&self) -> LearnedParams {
        LearnedParams {
            fcc: round_mah(self.fcc),
            qmax: round_mah(self.qmax),
            cycle_count: self.cycle_count,
            learned_cycle: self.learning.learned_cycle,
        }
    }

    pub fn config(&self) -> &CellConfig {
        &self.config
    }

    pub fn soc(&self) -> u8 {
        self.soc
    }

    /// State of charge before the last accepted sample.
    pub fn prev_soc(&self) -> u8 {
        self.prev_soc
    }

    /// The last accepted sample changed the state of charge.
    pub fn updated(&self) -> bool {
        self.updated
    }

    /// Remaining capacity, mAh.
    pub fn nac(&self) -> u16 {
        round_mah(self.nac)
    }

    pub fn fcc(&self) -> u16 {
        round_mah(self.fcc)
    }

    pub fn qmax(&self) -> u16 {
        round_mah(self.qmax)
    }

    pub fn remaining_capacity(&self) -> f32 {
        self.nac
    }

    pub fn full_charge_capacity(&self) -> f32 {
        self.fcc
    }

    pub fn max_capacity(&self) -> f32 {
        self.qmax
    }

    pub fn voltage(&self) -> i32 {
        self.voltage
    }

    pub fn current(&self) -> i32 {
        self.current
    }

    pub fn temperature(&self) -> i32 {
        self.temperature
    }

    pub fn av_voltage(&self) -> f32 {
        self.av_voltage.output().unwrap_or(self.voltage as f32)
    }

    pub fn av_current(&self) -> f32 {
        self.av_current.output().unwrap_or(self.current as f32)
    }

    pub fn cycle_count(&self) -> u16 {
        self.cycle_count
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn mode(&self) -> Mode {
        self.sequencer.mode()
    }

    /// Samples agreeing on a pending mode change.
    pub fn seq_cc_current(&self) -> u8 {
        self.sequencer.pending_samples()
    }

    /// Samples satisfying the charge completion condition.
    pub fn seq_cc_voltage(&self) -> u8 {
        self.seq_cc_voltage
    }

    pub fn edv_state(&self) -> &EdvState {
        self.edv.state()
    }

    pub fn learning(&self) -> &Learning {
        &self.learning
    }

    pub fn accumulators(&self) -> &Accumulators {
        &self.accumulators
    }

    /// Time since initialization, as the sum of accepted sample intervals.
    pub fn uptime(&self) -> Duration {
        self.uptime
    }

    pub fn last_ocv(&self) -> Option<Duration> {
        self.last_ocv
    }

    pub fn last_correction(&self) -> Option<Duration> {
        self.last_correction
    }

    pub fn sleep_timer(&self) -> Option<Duration> {
        self.sleep_timer
    }

    pub fn cumulative_sleep(&self) -> Duration {
        self.cumulative_sleep
    }
}

#[cfg(test)]
mod test {
    use core::time::Duration;

    use super::*;

    fn sample(voltage_mv: i32, current_ma: i32) -> RawSample {
        RawSample {
            voltage_mv,
            current_ma,
            temperature_dc: 250,
        }
    }

    fn feed(state: &mut CellState, sample: RawSample, dt: u64, count: usize) {
        for _ in 0..count {
            state.update(sample, Duration::from_secs(dt)).unwrap();
        }
    }

    /// OCV corrections disabled
    fn no_ocv() -> CellConfig {
        let mut config = CellConfig::default();
        config.ocv.relax_period = u32::MAX;
        config
    }

    #[test]
    fn initial_state() {
        let state = CellState::initialize(CellConfig::default()).unwrap();

        assert_eq!(state.nac(), 2000);
        assert_eq!(state.fcc(), 2000);
        assert_eq!(state.qmax(), 2200);
        assert_eq!(state.soc(), 100);
        assert_eq!(state.cycle_count(), 0);
        assert_eq!(state.mode(), Mode::Relaxed);

        let flags = state.flags();
        assert!(flags.relax);
        assert!(!flags.init);
        assert!(!flags.edv0 && !flags.edv1 && !flags.edv2);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let config = CellConfig {
            design_capacity: 0,
            ..Default::default()
        };

        assert_eq!(
            CellState::initialize(config).unwrap_err(),
            ConfigError::ZeroCapacity
        );
    }

    #[test]
    fn one_hour_discharge() {
        let mut state = CellState::initialize(CellConfig::default()).unwrap();

        state
            .update(sample(3800, -200), Duration::from_secs(3600))
            .unwrap();

        assert_eq!(state.nac(), 1800);
        assert_eq!(state.soc(), 90);
        assert_eq!(state.prev_soc(), 100);
        assert!(state.updated());
        assert_eq!(state.uptime(), Duration::from_secs(3600));
    }

    #[test]
    fn idle_sample_leaves_the_soc_unchanged() {
        let mut state = CellState::initialize(no_ocv()).unwrap();

        state.update(sample(3800, 0), Duration::from_secs(10)).unwrap();

        assert_eq!(state.soc(), 100);
        assert_eq!(state.prev_soc(), 100);
        assert!(!state.updated());
    }

    #[test]
    fn invalid_samples_leave_the_state_untouched() {
        let mut state = CellState::initialize(CellConfig::default()).unwrap();
        feed(&mut state, sample(3900, -500), 10, 5);
        let before = state.clone();

        assert_eq!(
            state.update(sample(-5, -500), Duration::from_secs(10)),
            Err(EstimatorError::InvalidSample)
        );
        assert_eq!(
            state.update(sample(3900, -500), Duration::ZERO),
            Err(EstimatorError::InvalidSample)
        );
        assert_eq!(
            state.update(
                RawSample {
                    temperature_dc: -1000,
                    ..sample(3900, -500)
                },
                Duration::from_secs(10)
            ),
            Err(EstimatorError::InvalidSample)
        );

        assert_eq!(state, before);
    }

    #[test]
    fn coulomb_counting_round_trip() {
        let mut state = CellState::initialize(no_ocv()).unwrap();

        feed(&mut state, sample(3900, -1000), 36, 50);
        assert!((state.remaining_capacity() - 1500.0).abs() < 0.5);

        feed(&mut state, sample(3900, 1000), 36, 30);
        feed(&mut state, sample(3900, -1000), 36, 30);
        assert!((state.remaining_capacity() - 1500.0).abs() < 0.5);
    }

    #[test]
    fn round_trip_after_partial_use_of_a_full_charge() {
        let mut state = CellState::initialize(no_ocv()).unwrap();
        feed(&mut state, sample(4200, 50), 36, 5);
        assert!(state.flags().full);

        feed(&mut state, sample(3900, -1000), 36, 14);
        assert!(state.flags().full);
        let start = state.remaining_capacity();

        feed(&mut state, sample(3900, 1000), 36, 14);
        assert!(state.remaining_capacity() > start + 100.0);

        feed(&mut state, sample(3900, -1000), 36, 14);
        assert!((state.remaining_capacity() - start).abs() < 0.5);
    }

    #[test]
    fn reversed_sense_polarity() {
        let config = CellConfig {
            cc_polarity: true,
            ..no_ocv()
        };
        let mut state = CellState::initialize(config).unwrap();

        feed(&mut state, sample(3900, 1000), 36, 5);

        assert_eq!(state.current(), -1000);
        assert_eq!(state.mode(), Mode::Discharging);
        assert_eq!(state.nac(), 1950);
    }

    #[test]
    fn mode_changes_are_debounced() {
        let mut state = CellState::initialize(no_ocv()).unwrap();

        feed(&mut state, sample(3900, -500), 10, 2);
        assert!(state.flags().relax);
        assert_eq!(state.seq_cc_current(), 2);

        feed(&mut state, sample(3900, -500), 10, 1);
        assert!(state.flags().dsg);
        assert!(!state.flags().relax);
        assert!(state.edv_state().edv_cmp);

        feed(&mut state, sample(3900, 500), 10, 3);
        assert!(state.flags().chg);
        assert!(!state.flags().dsg);
        assert!(!state.edv_state().edv_cmp);
    }

    #[test]
    fn full_ocv_correction_before_initialization() {
        let mut state = CellState::initialize(CellConfig::default()).unwrap();

        feed(&mut state, sample(3800, 0), 60, 9);
        assert_eq!(state.last_ocv(), None);

        feed(&mut state, sample(3800, 0), 60, 1);
        assert_eq!(state.last_ocv(), Some(Duration::from_secs(600)));
        assert_eq!(state.nac(), 800);
        assert_eq!(state.soc(), 40);
        assert!(state.flags().init);
        assert!(state.flags().ocv);
    }

    #[test]
    fn one_correction_per_rest_interval() {
        let mut state = CellState::initialize(CellConfig::default()).unwrap();

        feed(&mut state, sample(3800, 0), 60, 10);
        let corrected = state.last_ocv();
        assert!(corrected.is_some());

        feed(&mut state, sample(4110, 0), 60, 100);
        assert_eq!(state.last_ocv(), corrected);
        assert!(state.nac() < 801);
    }

    #[test]
    fn load_spikes_delay_the_correction() {
        let mut state = CellState::initialize(CellConfig::default()).unwrap();

        feed(&mut state, sample(3800, 0), 60, 9);
        feed(&mut state, sample(3800, -300), 60, 1);
        feed(&mut state, sample(3800, 0), 60, 1);

        assert_eq!(state.last_ocv(), None);
        assert!(state.flags().relax);
    }

    #[test]
    fn later_corrections_are_partial_and_bounded() {
        let mut state = CellState::initialize(CellConfig::default()).unwrap();
        feed(&mut state, sample(3800, 0), 60, 10);

        feed(&mut state, sample(3800, -500), 60, 5);
        assert!(state.flags().dsg);
        let before = state.remaining_capacity();

        feed(&mut state, sample(3270, 0), 60, 20);
        let after = state.remaining_capacity();

        assert!(after < before - 200.0);
        assert!(after > before - 401.0);
    }

    #[test]
    fn no_correction_in_the_flat_zone_once_initialized() {
        let mut state = CellState::initialize(CellConfig::default()).unwrap();
        feed(&mut state, sample(3800, 0), 60, 10);
        let corrected = state.last_ocv();

        feed(&mut state, sample(3800, -500), 60, 5);
        feed(&mut state, sample(3850, 0), 60, 40);

        assert_eq!(state.last_ocv(), corrected);
    }

    #[test]
    fn edv_latch_calibrates_and_holds() {
        let mut state = CellState::initialize(no_ocv()).unwrap();

        feed(&mut state, sample(3550, -500), 10, 4);
        assert!(!state.flags().edv2);

        feed(&mut state, sample(3550, -500), 10, 1);
        let flags = state.flags();
        assert!(flags.edv2);
        assert!(!flags.edv1 && !flags.edv0);
        assert_eq!(state.nac(), 140);
        assert_eq!(state.soc(), 7);
        assert_eq!(state.edv_state().percent, 7);
        assert_eq!(state.edv_state().min_capacity, 60.0);

        feed(&mut state, sample(3900, -500), 10, 20);
        assert!(state.flags().edv2);
        assert!(state.remaining_capacity() >= 60.0);
    }

    #[test]
    fn edv_latches_survive_a_partial_charge() {
        let mut state = CellState::initialize(no_ocv()).unwrap();
        feed(&mut state, sample(3550, -500), 10, 5);
        assert!(state.flags().edv2);
        assert_eq!(state.nac(), 140);

        feed(&mut state, sample(3900, 1000), 36, 100);
        assert!(state.flags().chg);
        assert!(state.remaining_capacity() < 1800.0);
        assert!(state.flags().edv2);

        feed(&mut state, sample(3900, -500), 10, 10);
        let flags = state.flags();
        assert!(flags.dsg);
        assert!(flags.edv2);
        assert!(!flags.edv1);
        assert_eq!(state.edv_state().min_capacity, 60.0);
    }

    #[test]
    fn short_edv_tables_map_to_the_shallow_flags() {
        let mut config = no_ocv();
        config.edv.points.remove(0);
        let mut state = CellState::initialize(config).unwrap();

        feed(&mut state, sample(3550, -500), 10, 5);
        let flags = state.flags();
        assert!(flags.edv2);
        assert!(!flags.edv1 && !flags.edv0);

        feed(&mut state, sample(3400, -500), 10, 20);
        let flags = state.flags();
        assert!(flags.edv2 && flags.edv1);
        assert!(!flags.edv0);
    }

    #[test]
    fn deep_discharge_empties_the_cell() {
        let mut state = CellState::initialize(no_ocv()).unwrap();

        feed(&mut state, sample(2900, -500), 10, 3);

        let flags = state.flags();
        assert!(flags.edv0 && flags.edv1 && flags.edv2);
        assert_eq!(state.nac(), 0);
        assert_eq!(state.soc(), 0);
    }

    #[test]
    fn overload_disarms_the_comparator() {
        let mut state = CellState::initialize(no_ocv()).unwrap();

        feed(&mut state, sample(3550, -3000), 10, 10);

        assert!(state.flags().dsg);
        assert!(!state.edv_state().edv_cmp);
        assert!(!state.flags().edv2);
    }

    #[test]
    fn charge_completion() {
        let mut state = CellState::initialize(no_ocv()).unwrap();
        feed(&mut state, sample(3900, -1000), 36, 50);

        feed(&mut state, sample(4200, 50), 36, 4);
        assert!(!state.flags().full);
        assert_eq!(state.seq_cc_voltage(), 2);

        feed(&mut state, sample(4200, 50), 36, 1);
        let flags = state.flags();
        assert!(flags.cc && flags.full && flags.init);
        assert_eq!(state.nac(), 2000);
        assert_eq!(state.soc(), 100);

        feed(&mut state, sample(4200, 50), 36, 10);
        assert_eq!(state.nac(), 2000);
        assert!(state.accumulators().overcharge_q > 0.0);

        feed(&mut state, sample(3900, -1000), 36, 20);
        assert!(!state.flags().full);
        assert!(!state.flags().cc);
    }

    #[test]
    fn charging_near_full_releases_edv_latches() {
        let mut state = CellState::initialize(no_ocv()).unwrap();
        feed(&mut state, sample(3550, -500), 10, 5);
        assert!(state.flags().edv2);

        feed(&mut state, sample(4000, 1000), 36, 190);

        assert!(!state.flags().edv2);
        assert_eq!(state.edv_state().min_capacity, 140.0);
    }

    #[test]
    fn sleep_tracking() {
        let mut state = CellState::initialize(no_ocv()).unwrap();

        feed(&mut state, sample(3800, 0), 10, 2);
        assert!(!state.flags().sleep);

        feed(&mut state, sample(3800, 0), 10, 1);
        assert!(state.flags().sleep);
        assert_eq!(state.sleep_timer(), Some(Duration::from_secs(30)));

        feed(&mut state, sample(3800, 0), 10, 5);
        assert_eq!(state.cumulative_sleep(), Duration::from_secs(50));

        feed(&mut state, sample(3800, -100), 10, 3);
        assert!(!state.flags().sleep);
        assert_eq!(state.sleep_timer(), None);
        assert_eq!(state.cumulative_sleep(), Duration::from_secs(80));
    }

    #[test]
    fn electronics_load_drains_while_asleep() {
        let mut state = CellState::initialize(no_ocv()).unwrap();

        feed(&mut state, sample(3800, 0), 3600, 5);

        assert_eq!(state.nac(), 1994);
        assert_eq!(state.learning().cycle_dsg_estimate, 6.0);
    }

    #[test]
    fn capacity_is_learned_from_a_qualified_discharge() {
        let config = CellConfig {
            cycle_threshold: 500,
            no_learning_cycles: 0,
            ..no_ocv()
        };
        let mut state = CellState::initialize(config).unwrap();

        feed(&mut state, sample(4200, 50), 36, 5);
        assert!(state.flags().full);

        feed(&mut state, sample(3900, -1000), 36, 3);
        assert!(state.flags().vdq);

        // The cell only delivers about 1000 mAh before reaching EDV2
        feed(&mut state, sample(3900, -1000), 36, 97);
        feed(&mut state, sample(3550, -1000), 36, 60);

        assert!(state.flags().edv2);
        assert!(!state.flags().vdq);
        assert_eq!(state.cycle_count(), 3);

        let learned = state.learned();
        assert_eq!(learned.fcc, 1850);
        assert_eq!(learned.qmax, 2050);
        assert_eq!(learned.learned_cycle, 3);
        assert_eq!(state.learning().pending(), None);
    }

    #[test]
    fn cold_discharge_does_not_qualify() {
        let mut state = CellState::initialize(no_ocv()).unwrap();

        feed(&mut state, sample(4200, 50), 36, 5);
        feed(&mut state, sample(3900, -1000), 36, 3);
        assert!(state.flags().vdq);

        feed(
            &mut state,
            RawSample {
                temperature_dc: 50,
                ..sample(3900, -1000)
            },
            36,
            1,
        );
        assert!(!state.flags().vdq);
    }

    #[test]
    fn restore_clamps_learned_parameters() {
        let mut state = CellState::initialize(CellConfig::default()).unwrap();

        state.restore(LearnedParams {
            fcc: 100,
            qmax: 5000,
            cycle_count: 30,
            learned_cycle: 40,
        });
        assert_eq!(state.fcc(), 500);
        assert_eq!(state.qmax(), 5000);
        assert_eq!(state.nac(), 500);
        assert_eq!(state.soc(), 100);
        assert_eq!(state.learned().learned_cycle, 30);

        state.restore(LearnedParams {
            fcc: 3000,
            qmax: 2100,
            cycle_count: 30,
            learned_cycle: 12,
        });
        assert_eq!(
            state.learned(),
            LearnedParams {
                fcc: 2100,
                qmax: 2100,
                cycle_count: 30,
                learned_cycle: 12,
            }
        );
    }

    #[test]
    fn invariants_hold_for_arbitrary_samples() {
        let mut state = CellState::initialize(CellConfig::default()).unwrap();
        let mut seed = 0x2545_f491_u32;
        let mut next = move |range: u32| {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (seed >> 8) % range
        };

        for _ in 0..5000 {
            let sample = RawSample {
                voltage_mv: 2800 + next(1500) as i32,
                current_ma: next(6000) as i32 - 3000,
                temperature_dc: next(500) as i32 - 100,
            };
            let dt = Duration::from_secs(1 + next(600) as u64);

            state.update(sample, dt).unwrap();

            let flags = state.flags();
            assert!(state.soc() <= 100);
            assert!(state.remaining_capacity() >= 0.0);
            assert!(state.remaining_capacity() <= state.full_charge_capacity());
            assert!(state.full_charge_capacity() <= state.max_capacity());
            assert!(!(flags.chg && flags.dsg));
            assert_eq!(flags.relax, !flags.chg && !flags.dsg);
            assert!(!flags.edv0 || flags.edv1);
            assert!(!flags.edv1 || flags.edv2);
        }
    }
}
