//!
//! Closed-loop block-commutation engine for a hall-sensored BLDC motor
//! behind a three-phase gate driver.
//!
//! The crate is split along the signal path: [`hall`] decodes the sensor
//! patterns into rotor sectors, [`commutation`] maps sectors to bridge
//! images, [`speed`] closes the rpm loop, [`pwm`] gates the duty cycle into
//! the timer, and [`supervisor`] owns the state machine tying them
//! together. The gate-driver safety layer lives in the separate [`bdrv`]
//! crate.
//!
//! Everything is `no_std` and generic over the hardware seams
//! ([`bdrv::BridgeRegisters`], [`pwm::PwmTimer`], the hall input pins), so
//! the whole engine runs unmodified in host-side tests.
//!

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod commutation;
pub mod config;
pub mod error;
pub mod hall;
pub mod pwm;
pub mod speed;
pub mod supervisor;

pub use config::DriveConfig;
pub use error::{Fault, StartError};
pub use hall::{HallDecoder, HallPattern, HallSensors, HallStep};
pub use pwm::{OutputStage, Phase, PwmTimer};
pub use speed::SpeedPi;
pub use supervisor::{Drive, DriveStatus, MotorState};

/// Rotation direction, as seen by the hall sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Forward,
    Reverse,
}
