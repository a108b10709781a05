//!
//! Drive supervisor
//!
//! Owns the motor state machine and sequences everything else: hall samples
//! flow through the decoder into the commutation table and the bridge,
//! ticks run the speed loop into the output stage, and every fault path
//! forces the bridge off before any bookkeeping happens. The two entry
//! points ([`Drive::on_hall_edge`] and [`Drive::on_tick`]) are meant to be
//! called from the host's edge and timer interrupts and run to completion.
//!

use bdrv::{Bdrv, BridgeChannel, BridgeRegisters, ChannelInterrupt, STATUS_ALL};

use crate::commutation::{commutate, standby};
use crate::config::DriveConfig;
use crate::error::{Fault, StartError};
use crate::hall::{HallDecoder, HallPattern, HallStep};
use crate::pwm::{OutputStage, PwmTimer};
use crate::speed::SpeedPi;
use crate::Direction;

/// Overall drive state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorState {
    /// Bridge off, nothing scheduled
    Off,
    /// Bridge in standby, waiting for the first valid hall sample
    Starting,
    /// Commutating and speed-controlled
    Running,
    /// Latched fault, bridge off; cleared only by an explicit stop
    Fault,
}

/// Snapshot of the drive for a host or telemetry collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriveStatus {
    pub state: MotorState,
    pub fault: Option<Fault>,
    pub sector: Option<u8>,
    pub ref_speed: i32,
    pub measured_speed: i32,
    pub duty: u16,
}

/// The closed-loop BLDC drive.
///
/// Generic over the bridge register block and the PWM timer so the whole
/// engine runs against fakes on the host.
pub struct Drive<R, T> {
    config: DriveConfig,
    bdrv: Bdrv<R>,
    pwm: T,
    hall: HallDecoder,
    pi: SpeedPi,
    output: OutputStage,
    state: MotorState,
    fault: Option<Fault>,
    /// Reference speed in rpm, sign selects the direction
    ref_speed: i32,
    commanded: Direction,
    /// Direction of the last committed commutation
    applied: Option<Direction>,
    /// Measured speed in rpm, signed by the measured direction
    measured_speed: i32,
    last_step_us: Option<u64>,
    ms_since_step: u32,
    duty: u16,
}

impl<R: BridgeRegisters, T: PwmTimer> Drive<R, T> {
    /// Take ownership of the hardware seams; the bridge is forced off
    pub fn new(config: DriveConfig, regs: R, pwm: T) -> Self {
        let output = OutputStage::new(config.speed_imin.max(0) as u16, config.speed_imax.max(0) as u16);
        Self {
            pi: SpeedPi::new(&config),
            config,
            bdrv: Bdrv::new(regs),
            pwm,
            hall: HallDecoder::new(),
            output,
            state: MotorState::Off,
            fault: None,
            ref_speed: 0,
            commanded: Direction::Forward,
            applied: None,
            measured_speed: 0,
            last_step_us: None,
            ms_since_step: 0,
            duty: 0,
        }
    }

    pub fn state(&self) -> MotorState {
        self.state
    }

    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    /// The last established rotor sector
    pub fn sector(&self) -> Option<u8> {
        self.hall.sector()
    }

    /// Measured speed in rpm, signed by the measured direction
    pub fn measured_speed(&self) -> i32 {
        self.measured_speed
    }

    pub fn status(&self) -> DriveStatus {
        DriveStatus {
            state: self.state,
            fault: self.fault,
            sector: self.hall.sector(),
            ref_speed: self.ref_speed,
            measured_speed: self.measured_speed,
            duty: self.duty,
        }
    }

    pub fn bridge(&self) -> &Bdrv<R> {
        &self.bdrv
    }

    pub fn bridge_mut(&mut self) -> &mut Bdrv<R> {
        &mut self.bdrv
    }

    pub fn pwm(&self) -> &T {
        &self.pwm
    }

    /// Set the reference speed in rpm; the sign selects the direction.
    ///
    /// A direction change takes effect at the next hall edge or tick,
    /// whichever comes first.
    pub fn set_ref_speed(&mut self, rpm: i32) {
        self.ref_speed = rpm;
        if rpm > 0 {
            self.commanded = Direction::Forward;
        } else if rpm < 0 {
            self.commanded = Direction::Reverse;
        }
        debug!("reference speed {} rpm", rpm);
    }

    /// Run the pre-start diagnosis and bring the bridge into standby.
    ///
    /// Only valid from `Off`. A failed off-diagnosis latches `Fault`; an
    /// open load refuses the start but leaves the drive in `Off` so the
    /// start can simply be retried. Commutation begins with the first valid
    /// hall sample after a successful start.
    pub fn start_motor(&mut self) -> Result<(), StartError> {
        if self.state != MotorState::Off {
            return Err(StartError::NotOff);
        }

        self.bdrv.clear_status(STATUS_ALL);
        let diag = self.bdrv.off_diagnosis()?;
        if diag.global_fail {
            let fault = Fault::BridgeDiagnosis(diag);
            self.enter_fault(fault);
            return Err(fault.into());
        }
        if self.bdrv.diag_open_load()? {
            return Err(StartError::OpenLoad);
        }

        self.pi.reset();
        self.hall.reset();
        self.duty = self.output.clamp(self.config.init_duty);
        self.measured_speed = 0;
        self.last_step_us = None;
        self.ms_since_step = 0;
        self.applied = None;

        for channel in BridgeChannel::ALL {
            self.bdrv.set_int_channel(channel, ChannelInterrupt::Both);
        }
        self.bdrv.set_bridge(standby())?;
        self.state = MotorState::Starting;
        info!("motor starting, waiting for the first hall sample");
        Ok(())
    }

    /// Disable the bridge and return to `Off`, clearing any latched fault
    pub fn stop_motor(&mut self) {
        self.bdrv.shutdown();
        self.output.disarm();
        self.state = MotorState::Off;
        self.fault = None;
        self.duty = 0;
        self.measured_speed = 0;
        self.last_step_us = None;
        info!("motor stopped");
    }

    /// Feed one hall sample, normally from the hall edge interrupt.
    ///
    /// `timestamp_us` is the capture time of the edge on a monotonic
    /// microsecond clock; step intervals between valid transitions yield
    /// the measured speed.
    pub fn on_hall_edge(&mut self, pattern: HallPattern, timestamp_us: u64) {
        if !matches!(self.state, MotorState::Starting | MotorState::Running) {
            return;
        }

        let step = match self.hall.feed(pattern) {
            Ok(step) => step,
            Err(fault) => {
                self.enter_fault(fault);
                return;
            }
        };

        match step {
            HallStep::None => {}
            HallStep::Step { sector, direction } => {
                if let Some(last) = self.last_step_us.replace(timestamp_us) {
                    let delta = timestamp_us.saturating_sub(last);
                    if delta > 0 {
                        let rpm = 60_000_000
                            / (delta * 6 * u64::from(self.config.pole_pairs.max(1)));
                        self.measured_speed = match direction {
                            Direction::Forward => rpm as i32,
                            Direction::Reverse => -(rpm as i32),
                        };
                    }
                }
                self.ms_since_step = 0;
                self.commutate_at(sector);
            }
            HallStep::Resync { sector } => {
                self.last_step_us = Some(timestamp_us);
                self.ms_since_step = 0;
                self.commutate_at(sector);
            }
        }
    }

    /// One 1 ms control tick: stall supervision plus, when running, a speed
    /// loop step feeding the output stage
    pub fn on_tick(&mut self) {
        if !matches!(self.state, MotorState::Starting | MotorState::Running) {
            return;
        }

        self.ms_since_step = self.ms_since_step.saturating_add(1);
        if self.ms_since_step >= self.config.min_speed_delay_ms {
            self.measured_speed = 0;
        }
        if self.ms_since_step >= self.config.stall_timeout_ms {
            self.enter_fault(Fault::Stall);
            return;
        }

        if self.state != MotorState::Running {
            return;
        }

        // a commanded direction change re-commutates at the current sector
        if self.applied != Some(self.commanded) {
            if let Some(sector) = self.hall.sector() {
                self.commutate_at(sector);
                if self.state != MotorState::Running {
                    return;
                }
            }
        }

        let error = match self.commanded {
            Direction::Forward => self.ref_speed - self.measured_speed,
            Direction::Reverse => self.measured_speed - self.ref_speed,
        };
        self.duty = self.pi.update(error).max(0) as u16;
        self.output.apply(&mut self.pwm, self.duty);
    }

    /// Ingest a bridge diagnosis interrupt.
    ///
    /// Any asserted over-current or drain-source flag while the bridge is
    /// driven is a hardware trip and latches `Fault`.
    pub fn on_bridge_interrupt(&mut self) {
        let tripped = self.bdrv.status() & STATUS_ALL;
        if tripped == 0 {
            return;
        }
        self.bdrv.clear_status(tripped);
        if matches!(self.state, MotorState::Starting | MotorState::Running) {
            warn!("bridge trip, status {:x}", tripped);
            self.enter_fault(Fault::BridgeTrip);
        }
    }

    /// Commit the commutation step for a sector, advancing `Starting` to
    /// `Running` on the first one
    fn commutate_at(&mut self, sector: u8) {
        let lookup = if self.config.sixty_degree_offset {
            (sector + 1) % 6
        } else {
            sector
        };
        let (bridge, phase) = commutate(lookup, self.commanded);
        if self.bdrv.set_bridge(bridge).is_err() {
            // a rejected table entry means corrupted state, shut down hard
            self.enter_fault(Fault::BridgeTrip);
            return;
        }
        self.applied = Some(self.commanded);

        if self.state == MotorState::Starting {
            self.state = MotorState::Running;
            self.output.arm();
            info!("first hall sample, commutation engaged");
        }
        self.output.set_phase(&mut self.pwm, phase);
        self.output.apply(&mut self.pwm, self.duty);
    }

    /// Force the bridge off and latch the fault.
    ///
    /// The shutdown is a single register write performed before any state
    /// bookkeeping, so it cannot be reordered behind a pending PWM write.
    fn enter_fault(&mut self, fault: Fault) {
        self.bdrv.shutdown();
        self.output.disarm();
        self.state = MotorState::Fault;
        self.fault = Some(fault);
        self.duty = 0;
        error!("fault latched: {}", fault);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use bdrv::mock::MockBridge;
    use bdrv::{oc_mask, BridgeConfig, PhaseDiag};

    use super::*;
    use crate::pwm::tests::MockPwm;

    /// The hall pattern seen in each rotor sector
    const SECTOR_PATTERNS: [u8; 6] = [1, 3, 2, 6, 4, 5];

    fn drive() -> Drive<MockBridge, MockPwm> {
        let config = DriveConfig::default();
        let pwm = MockPwm::new(config.pwm_period);
        Drive::new(config, MockBridge::new(), pwm)
    }

    fn pattern(sector: u8) -> HallPattern {
        HallPattern::from_raw(SECTOR_PATTERNS[sector as usize])
    }

    /// Every control word the fake ever saw must decode to a safe image
    fn assert_history_safe(drive: &mut Drive<MockBridge, MockPwm>) {
        let history: std::vec::Vec<u32> =
            drive.bridge_mut().regs_mut().write_history().to_vec();
        for word in history {
            BridgeConfig::from_word(word).unwrap().check().unwrap();
        }
    }

    #[test]
    fn test_start_only_from_off() {
        let mut drive = drive();
        drive.start_motor().unwrap();
        assert_eq!(drive.state(), MotorState::Starting);
        assert_eq!(drive.start_motor(), Err(StartError::NotOff));
    }

    #[test]
    fn test_no_pwm_until_first_hall_sample() {
        let mut drive = drive();
        drive.set_ref_speed(1_000);
        drive.start_motor().unwrap();
        for _ in 0..10 {
            drive.on_tick();
        }
        assert_eq!(drive.state(), MotorState::Starting);
        assert_eq!(drive.pwm().writes, 0);

        drive.on_hall_edge(pattern(0), 1_000);
        assert_eq!(drive.state(), MotorState::Running);
        // the initial duty goes out with the first commutation
        assert!(drive.pwm().writes > 0);
        assert_eq!(drive.status().duty, 5);
    }

    #[test]
    fn test_off_state_ignores_edges_and_ticks() {
        let mut drive = drive();
        drive.on_hall_edge(pattern(0), 1_000);
        drive.on_tick();
        assert_eq!(drive.state(), MotorState::Off);
        assert_eq!(drive.pwm().writes, 0);
        assert_eq!(drive.bridge_mut().regs_mut().read_control(), 0);
    }

    #[test]
    fn test_sensor_fault_while_running_shuts_down() {
        let mut drive = drive();
        drive.set_ref_speed(1_000);
        drive.start_motor().unwrap();
        drive.on_hall_edge(pattern(0), 1_000);
        assert_eq!(drive.state(), MotorState::Running);
        assert_ne!(drive.bridge_mut().regs_mut().read_control(), 0);

        drive.on_hall_edge(HallPattern::from_raw(0b000), 2_000);
        assert_eq!(drive.state(), MotorState::Fault);
        assert_eq!(drive.fault(), Some(Fault::Sensor));
        assert_eq!(drive.bridge_mut().regs_mut().read_control(), 0);

        // nothing reaches the PWM timer once faulted
        let writes = drive.pwm().writes;
        drive.on_tick();
        drive.on_hall_edge(pattern(1), 3_000);
        assert_eq!(drive.pwm().writes, writes);
    }

    #[test]
    fn test_sensor_fault_while_starting_shuts_down() {
        let mut drive = drive();
        drive.start_motor().unwrap();
        drive.on_hall_edge(HallPattern::from_raw(0b111), 1_000);
        assert_eq!(drive.state(), MotorState::Fault);
        assert_eq!(drive.fault(), Some(Fault::Sensor));
        assert_eq!(drive.bridge_mut().regs_mut().read_control(), 0);
    }

    #[test]
    fn test_stall_timeout_while_starting_latches_fault() {
        let mut drive = drive();
        drive.set_ref_speed(1_000);
        drive.start_motor().unwrap();
        // no hall sample ever arrives
        for _ in 0..500 {
            drive.on_tick();
        }
        assert_eq!(drive.state(), MotorState::Fault);
        assert_eq!(drive.fault(), Some(Fault::Stall));
        assert_eq!(drive.bridge_mut().regs_mut().read_control(), 0);
        assert_eq!(drive.pwm().writes, 0);
    }

    #[test]
    fn test_bridge_interrupt_trips_while_starting() {
        let mut drive = drive();
        drive.start_motor().unwrap();
        assert_eq!(drive.state(), MotorState::Starting);

        drive.bridge_mut().regs_mut().latched |= oc_mask(BridgeChannel::Hs3);
        drive.on_bridge_interrupt();
        assert_eq!(drive.state(), MotorState::Fault);
        assert_eq!(drive.fault(), Some(Fault::BridgeTrip));
        assert_eq!(drive.bridge_mut().regs_mut().read_control(), 0);
    }

    #[test]
    fn test_stall_timeout_latches_fault() {
        let mut drive = drive();
        drive.set_ref_speed(1_000);
        drive.start_motor().unwrap();
        drive.on_hall_edge(pattern(0), 1_000);
        assert_eq!(drive.state(), MotorState::Running);

        for _ in 0..499 {
            drive.on_tick();
        }
        assert_eq!(drive.state(), MotorState::Running);
        drive.on_tick();
        assert_eq!(drive.state(), MotorState::Fault);
        assert_eq!(drive.fault(), Some(Fault::Stall));
        assert_eq!(drive.bridge_mut().regs_mut().read_control(), 0);
    }

    #[test]
    fn test_measured_speed_decays_without_steps() {
        let mut config = DriveConfig::default();
        config.stall_timeout_ms = 10_000;
        let pwm = MockPwm::new(config.pwm_period);
        let mut drive = Drive::new(config, MockBridge::new(), pwm);

        drive.set_ref_speed(1_000);
        drive.start_motor().unwrap();
        drive.on_hall_edge(pattern(0), 10_000);
        drive.on_hall_edge(pattern(1), 20_000);
        assert_eq!(drive.measured_speed(), 1_000);

        for _ in 0..500 {
            drive.on_tick();
        }
        assert_eq!(drive.measured_speed(), 0);
        assert_eq!(drive.state(), MotorState::Running);
    }

    #[test]
    fn test_diagnosis_failure_blocks_start() {
        let mut drive = drive();
        drive.bridge_mut().regs_mut().short_to_gnd[1] = true;

        let err = drive.start_motor().unwrap_err();
        match err {
            StartError::Fault(Fault::BridgeDiagnosis(diag)) => {
                assert!(diag.global_fail);
                assert_eq!(diag.phases[1], PhaseDiag::ShortToGnd);
            }
            other => panic!("unexpected start error {other:?}"),
        }
        assert_eq!(drive.state(), MotorState::Fault);
        assert_eq!(drive.bridge_mut().regs_mut().read_control(), 0);
    }

    #[test]
    fn test_open_load_refuses_start_but_stays_off() {
        let mut drive = drive();
        drive.bridge_mut().regs_mut().connected = false;

        assert_eq!(drive.start_motor(), Err(StartError::OpenLoad));
        assert_eq!(drive.state(), MotorState::Off);
        assert_eq!(drive.fault(), None);

        // reconnecting the motor makes a plain retry succeed
        drive.bridge_mut().regs_mut().connected = true;
        drive.start_motor().unwrap();
        assert_eq!(drive.state(), MotorState::Starting);
    }

    #[test]
    fn test_bridge_interrupt_trips_drive() {
        let mut drive = drive();
        drive.set_ref_speed(1_000);
        drive.start_motor().unwrap();
        drive.on_hall_edge(pattern(0), 1_000);
        assert_eq!(drive.state(), MotorState::Running);

        drive.bridge_mut().regs_mut().latched |= oc_mask(BridgeChannel::Ls2);
        drive.on_bridge_interrupt();
        assert_eq!(drive.state(), MotorState::Fault);
        assert_eq!(drive.fault(), Some(Fault::BridgeTrip));
        assert_eq!(drive.bridge_mut().regs_mut().read_control(), 0);
        // the flag was acknowledged
        assert_eq!(drive.bridge_mut().regs_mut().latched, 0);
    }

    #[test]
    fn test_spurious_bridge_interrupt_is_ignored() {
        let mut drive = drive();
        drive.set_ref_speed(1_000);
        drive.start_motor().unwrap();
        drive.on_hall_edge(pattern(0), 1_000);

        drive.on_bridge_interrupt();
        assert_eq!(drive.state(), MotorState::Running);
    }

    #[test]
    fn test_stop_clears_fault_and_allows_restart() {
        let mut drive = drive();
        drive.start_motor().unwrap();
        drive.on_hall_edge(HallPattern::from_raw(0b000), 1_000);
        assert_eq!(drive.state(), MotorState::Fault);

        drive.stop_motor();
        assert_eq!(drive.state(), MotorState::Off);
        assert_eq!(drive.fault(), None);

        drive.start_motor().unwrap();
        assert_eq!(drive.state(), MotorState::Starting);
    }

    #[test]
    fn test_closed_loop_forward_run() {
        let mut drive = drive();
        drive.set_ref_speed(1_000);
        drive.start_motor().unwrap();

        // one electrical revolution and a bit at 1000 rpm: a hall step every
        // 10 ms, control ticks in between
        let mut now_us = 10_000u64;
        for sector in [0u8, 1, 2, 3, 4, 5, 0, 1, 2] {
            drive.on_hall_edge(pattern(sector), now_us);
            for _ in 0..10 {
                drive.on_tick();
            }
            now_us += 10_000;
        }

        let status = drive.status();
        assert_eq!(status.state, MotorState::Running);
        assert_eq!(status.measured_speed, 1_000);
        assert_eq!(status.sector, Some(2));
        assert!(status.duty <= 75);
        assert_history_safe(&mut drive);
    }

    #[test]
    fn test_duty_settles_under_constant_reference() {
        let mut drive = drive();
        drive.set_ref_speed(1_000);
        drive.start_motor().unwrap();

        // 40 electrical revolutions at 1000 rpm, duty sampled every tick
        // over the last 10 of them
        let mut now_us = 10_000u64;
        let mut settled = std::vec::Vec::new();
        for step in 0..240u32 {
            drive.on_hall_edge(pattern((step % 6) as u8), now_us);
            for _ in 0..10 {
                drive.on_tick();
                if step >= 180 {
                    settled.push(drive.status().duty);
                }
            }
            now_us += 10_000;
        }

        assert_eq!(drive.state(), MotorState::Running);
        assert_eq!(drive.measured_speed(), 1_000);
        let held = settled[0];
        assert!(settled.iter().all(|duty| *duty == held));
    }

    #[test]
    fn test_reference_reversal_recommutates_and_tracks() {
        let mut drive = drive();
        drive.set_ref_speed(1_000);
        drive.start_motor().unwrap();

        let mut now_us = 10_000u64;
        for sector in [0u8, 1, 2, 3, 4, 5, 0] {
            drive.on_hall_edge(pattern(sector), now_us);
            for _ in 0..10 {
                drive.on_tick();
            }
            now_us += 10_000;
        }
        assert_eq!(drive.measured_speed(), 1_000);

        // the direction change reaches the bridge on the very next tick
        drive.set_ref_speed(-2_000);
        drive.on_tick();
        let (expected, _) = commutate(1, Direction::Reverse);
        assert_eq!(*drive.bridge().image(), expected);

        // the rotor turns around: a hall step every 5 ms is 2000 rpm
        for sector in [5u8, 4, 3, 2, 1, 0, 5, 4] {
            drive.on_hall_edge(pattern(sector), now_us);
            for _ in 0..5 {
                drive.on_tick();
            }
            now_us += 5_000;
        }

        let status = drive.status();
        assert_eq!(status.state, MotorState::Running);
        assert_eq!(status.measured_speed, -2_000);
        assert!(status.duty <= 75);
        assert_history_safe(&mut drive);
    }
}
