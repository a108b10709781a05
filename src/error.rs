//!
//! Fault taxonomy for the drive
//!

use bdrv::{BdrvError, OffDiagnosis};
use thiserror::Error;

/// Faults that latch the drive into the `Fault` state.
///
/// Every one of these forces the bridge all-off before the state changes,
/// and none of them is retried: the drive stays in `Fault` until it is
/// explicitly stopped and restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// Invalid hall sensor pattern (all lines low or all lines high)
    #[error("invalid hall sensor pattern")]
    Sensor,

    /// No commutation progress within the stall timeout
    #[error("no commutation progress within the stall timeout")]
    Stall,

    /// The off-state bridge diagnosis found a shorted phase
    #[error("bridge off-diagnosis failure")]
    BridgeDiagnosis(OffDiagnosis),

    /// An over-current / drain-source trip was reported while driving, or
    /// the bridge driver refused a commit
    #[error("bridge trip while driving")]
    BridgeTrip,
}

/// Why a start request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartError {
    /// The drive can only start from the off state
    #[error("the drive can only start from the off state")]
    NotOff,

    /// The open-load check found no motor; the drive stays off and the
    /// start may simply be retried once a motor is connected
    #[error("no motor connected")]
    OpenLoad,

    /// The bridge driver rejected a pre-start operation
    #[error("bridge driver error")]
    Bridge(#[from] BdrvError),

    /// A fault was latched during the pre-start diagnosis
    #[error(transparent)]
    Fault(#[from] Fault),
}
