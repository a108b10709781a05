//!
//! PI speed controller
//!
//! Runs once per millisecond tick. Arithmetic is integer fixed point: the
//! configured gains are Q12 (gain / 4096), errors are in rpm and outputs in
//! duty counts. The integrator accumulates at full Q12 resolution so small
//! errors still integrate, and is clamped in output units (anti-windup)
//! before the proportional part is added.
//!

use crate::config::DriveConfig;

/// Fixed-point scale of the configured gains.
pub const GAIN_SHIFT: u32 = 12;

/// PI controller state for the speed loop.
#[derive(Debug)]
pub struct SpeedPi {
    kp: i32,
    ki: i32,
    integrator_min: i64,
    integrator_max: i64,
    output_min: i32,
    output_max: i32,
    /// Accumulated integral term, Q12
    integrator: i64,
    last_output: i32,
}

impl SpeedPi {
    pub fn new(config: &DriveConfig) -> Self {
        Self {
            kp: config.speed_kp,
            ki: config.speed_ki,
            integrator_min: (config.speed_imin as i64) << GAIN_SHIFT,
            integrator_max: (config.speed_imax as i64) << GAIN_SHIFT,
            output_min: config.speed_pimin,
            output_max: config.speed_pimax,
            integrator: 0,
            last_output: 0,
        }
    }

    /// Zero the accumulated state (done on every motor start)
    pub fn reset(&mut self) {
        self.integrator = 0;
        self.last_output = 0;
    }

    /// The output of the last update
    pub fn last_output(&self) -> i32 {
        self.last_output
    }

    /// The integral term in output units
    pub fn integrator(&self) -> i32 {
        (self.integrator >> GAIN_SHIFT) as i32
    }

    /// One controller step for the given speed error (rpm)
    pub fn update(&mut self, error: i32) -> i32 {
        self.integrator += (self.ki as i64) * (error as i64);
        self.integrator = self
            .integrator
            .clamp(self.integrator_min, self.integrator_max);

        let raw = ((self.kp as i64) * (error as i64) + self.integrator) >> GAIN_SHIFT;
        let output = (raw.clamp(self.output_min as i64, self.output_max as i64)) as i32;
        self.last_output = output;
        output
    }
}
