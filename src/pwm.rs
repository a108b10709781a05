//!
//! Duty-cycle output stage in front of the PWM timer
//!

/// A motor phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    A,
    B,
    C,
}

impl Phase {
    /// The phase leg index (0-2) on the bridge
    pub fn leg(self) -> u8 {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
        }
    }

    /// The phase switching a given bridge leg (0-2)
    pub fn from_leg(leg: u8) -> Self {
        match leg {
            0 => Self::A,
            1 => Self::B,
            _ => Self::C,
        }
    }
}

/// Compare-register seam to the PWM timer.
///
/// One compare channel per phase; duty values are in compare counts and a
/// loaded value takes effect at the next period boundary. The output stage
/// saturates duty at the period, so a compare value never exceeds it.
pub trait PwmTimer {
    /// Load the compare value of one phase's PWM channel
    fn set_duty(&mut self, phase: Phase, duty: u16);
    /// The timer period in compare counts
    fn period(&self) -> u16;
}

/// Clamping, gated duty-cycle stage.
///
/// Every value is clamped to the configured window before it reaches the
/// timer, and nothing is written at all unless the stage is armed. The
/// supervisor arms the stage only while the drive is running, which is what
/// keeps PWM writes out of every other state.
#[derive(Debug)]
pub struct OutputStage {
    min: u16,
    max: u16,
    active: Option<Phase>,
    armed: bool,
}

impl OutputStage {
    pub fn new(min: u16, max: u16) -> Self {
        Self {
            min,
            max,
            active: None,
            armed: false,
        }
    }

    /// Allow duty writes
    pub fn arm(&mut self) {
        self.armed = true;
    }

    /// Block duty writes and forget the active phase
    pub fn disarm(&mut self) {
        self.armed = false;
        self.active = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// The phase currently receiving the duty cycle
    pub fn active(&self) -> Option<Phase> {
        self.active
    }

    /// Clamp a duty value to the configured window
    pub fn clamp(&self, duty: u16) -> u16 {
        duty.clamp(self.min, self.max)
    }

    /// Route the duty cycle to a new phase.
    ///
    /// The phase leaving the PWM role has its compare zeroed so a stale
    /// value cannot reappear if the bridge reconnects it later.
    pub fn set_phase<T: PwmTimer>(&mut self, timer: &mut T, phase: Phase) {
        if !self.armed {
            return;
        }
        if let Some(previous) = self.active {
            if previous != phase {
                timer.set_duty(previous, 0);
            }
        }
        self.active = Some(phase);
    }

    /// Write a duty value to the active phase, clamped to the configured
    /// window and saturated at the timer period (full-on); does nothing
    /// while disarmed
    pub fn apply<T: PwmTimer>(&mut self, timer: &mut T, duty: u16) {
        if !self.armed {
            return;
        }
        if let Some(phase) = self.active {
            let duty = self.clamp(duty).min(timer.period());
            timer.set_duty(phase, duty);
        }
    }
}
