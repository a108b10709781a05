//!
//! Error classes for the bridge driver
//!

use thiserror::Error;

/// Errors from the bridge driver safety layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BdrvError {
    /// The requested image would conduct through both MOSFETs of one leg
    #[error("high and low side of leg {0} driven simultaneously")]
    ShootThrough(u8),

    /// A control word contained an undefined channel encoding
    #[error("undefined channel configuration bits")]
    InvalidConfigBits,

    /// Off-state diagnosis requested while the bridge is driven
    #[error("diagnosis is only valid while the bridge is off")]
    BridgeActive,
}
