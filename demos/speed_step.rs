//!
//! Host-side demonstration of the drive against a toy motor model.
//!
//! Replays the classic commissioning sequence: spin up to 1000 rpm, then
//! step the reference to -2000 rpm and watch the drive re-commutate and
//! track. The "motor" is a first-order lag whose no-load speed follows the
//! applied duty; its rotor angle generates the hall edges.
//!
//! Run with `cargo run --example speed_step`.
//!

use bdrv::mock::MockBridge;
use bldc_controller::{Drive, DriveConfig, HallPattern, MotorState, Phase, PwmTimer};

/// Hall pattern seen in each rotor sector.
const SECTOR_PATTERNS: [u8; 6] = [1, 3, 2, 6, 4, 5];

/// PWM timer stand-in that just remembers the loaded duty.
struct SimPwm {
    period: u16,
    duty: [u16; 3],
}

impl PwmTimer for SimPwm {
    fn set_duty(&mut self, phase: Phase, duty: u16) {
        self.duty[phase.leg() as usize] = duty;
    }

    fn period(&self) -> u16 {
        self.period
    }
}

fn main() {
    let config = DriveConfig::default();
    let mut drive = Drive::new(
        config,
        MockBridge::new(),
        SimPwm {
            period: config.pwm_period,
            duty: [0; 3],
        },
    );

    drive.set_ref_speed(1_000);
    if let Err(err) = drive.start_motor() {
        eprintln!("start refused: {err}");
        return;
    }

    // toy motor: no-load speed of 40 rpm per duty count, 50 ms time
    // constant, rotor angle in electrical degrees
    let mut speed_rpm = 0.0f32;
    let mut angle_deg = 0.0f32;
    let mut sector = 0u8;

    // prime the drive with the rotor's resting position
    drive.on_hall_edge(HallPattern::from_raw(SECTOR_PATTERNS[0]), 0);

    for t_ms in 1u64..4_000 {
        if t_ms == 2_000 {
            println!("--- reference step to -2000 rpm ---");
            drive.set_ref_speed(-2_000);
        }

        let sign = if drive.status().ref_speed < 0 { -1.0 } else { 1.0 };
        let target = sign * 40.0 * f32::from(drive.status().duty);
        speed_rpm += (target - speed_rpm) * 0.02;

        // 1 rpm is 0.006 electrical degrees per millisecond per pole pair
        angle_deg = (angle_deg + speed_rpm * 0.006 + 360.0) % 360.0;
        let new_sector = (angle_deg / 60.0) as u8 % 6;
        if new_sector != sector {
            sector = new_sector;
            drive.on_hall_edge(
                HallPattern::from_raw(SECTOR_PATTERNS[sector as usize]),
                t_ms * 1_000,
            );
        }

        drive.on_tick();

        if t_ms % 250 == 0 {
            let status = drive.status();
            println!(
                "t={:4} ms  state={:?}  ref={:5} rpm  measured={:5} rpm  duty={:2}",
                t_ms, status.state, status.ref_speed, status.measured_speed, status.duty
            );
        }

        if drive.state() == MotorState::Fault {
            println!("fault: {:?}", drive.fault());
            break;
        }
    }

    println!("final compare values: {:?}", drive.pwm().duty);
    drive.stop_motor();
    println!("done, motor stopped");
}
