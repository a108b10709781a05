//!
//! Bridge driver (BDRV) safety layer
//!
//! Owns the live channel-configuration image of the three phase-leg gate
//! drivers and funnels every reconfiguration through a single validated
//! control-word write. Also runs the off-state diagnosis (short to ground /
//! short to battery per phase) and the open-load check, both of which are
//! only valid while the bridge is not switching.
//!
//! The register block itself sits behind the [`BridgeRegisters`] trait so
//! the driver can be exercised on the host with a register fake.
//!

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod bridge;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use bridge::{BridgeChannel, BridgeConfig, ChannelConfig, CHANNELS, PHASES};
pub use error::BdrvError;

/// Status/interrupt flag mask for a channel's drain-source monitor
pub const fn ds_mask(channel: BridgeChannel) -> u32 {
    1 << (channel as u32)
}

/// Status/interrupt flag mask for a channel's over-current monitor
pub const fn oc_mask(channel: BridgeChannel) -> u32 {
    1 << (8 + channel as u32)
}

/// All drain-source status flags
pub const STATUS_DS_ALL: u32 = 0x3F;
/// All over-current status flags
pub const STATUS_OC_ALL: u32 = 0x3F << 8;
/// Every diagnosis status flag
pub const STATUS_ALL: u32 = STATUS_DS_ALL | STATUS_OC_ALL;

/// Access to the bridge-driver register block.
///
/// On hardware each of these is a single-word register access, which is what
/// makes a full bridge reconfiguration atomic with respect to interrupting
/// handlers.
pub trait BridgeRegisters {
    /// Commit the complete channel-control word in one register access
    fn write_control(&mut self, word: u32);
    /// The last committed control word
    fn read_control(&self) -> u32;
    /// Read the drain-source / over-current status flags
    fn read_status(&self) -> u32;
    /// Write-one-to-clear the given status flags
    fn clear_status(&mut self, mask: u32);
    /// Interrupt-enable flags, same bit layout as the status word
    fn write_int_enable(&mut self, word: u32);
    /// The current interrupt-enable flags
    fn read_int_enable(&self) -> u32;
    /// Wait for the diagnosis current sources to settle before a status read
    fn settle(&mut self) {}
}

/// Per-channel interrupt selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelInterrupt {
    /// All interrupts disabled
    Off,
    /// Drain-source interrupt (off-state diagnosis)
    DrainSource,
    /// Over-current interrupt (on-state diagnosis)
    OverCurrent,
    /// Both drain-source and over-current interrupts
    Both,
}

/// Off-state diagnosis result of one phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhaseDiag {
    /// No short detected
    #[default]
    Ok,
    /// Phase tied to ground
    ShortToGnd,
    /// Phase tied to the battery rail
    ShortToVBat,
}

/// Result of the off-state bridge diagnosis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OffDiagnosis {
    /// True if any phase failed
    pub global_fail: bool,
    /// Per-phase result, index 0 is phase 1
    pub phases: [PhaseDiag; PHASES],
}

/// Bridge driver instance owning the live channel-configuration image.
pub struct Bdrv<R> {
    regs: R,
    image: BridgeConfig,
}

impl<R: BridgeRegisters> Bdrv<R> {
    /// Take ownership of the register block and force the bridge off
    pub fn new(regs: R) -> Self {
        let mut bdrv = Self {
            regs,
            image: BridgeConfig::all_off(),
        };
        bdrv.regs.write_control(0);
        bdrv.regs.write_int_enable(0);
        bdrv.regs.clear_status(STATUS_ALL);
        debug!("bridge driver initialized, all channels off");
        bdrv
    }

    /// Release the register block
    pub fn release(self) -> R {
        self.regs
    }

    /// Direct register access escape hatch
    pub fn regs_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    /// The currently committed channel image
    pub fn image(&self) -> &BridgeConfig {
        &self.image
    }

    /// Validate and commit a complete bridge configuration.
    ///
    /// The image is rejected before anything is written if it would drive
    /// both sides of a leg, and it reaches the hardware as one control-word
    /// write.
    pub fn set_bridge(&mut self, config: BridgeConfig) -> Result<(), BdrvError> {
        config.check()?;
        self.image = config;
        self.regs.write_control(config.to_word());
        Ok(())
    }

    /// Reconfigure a single channel, revalidating the whole image
    pub fn set_channel(
        &mut self,
        channel: BridgeChannel,
        config: ChannelConfig,
    ) -> Result<(), BdrvError> {
        let image = self.image.with(channel, config);
        self.set_bridge(image)
    }

    /// Force every channel off.
    ///
    /// Cannot fail and performs exactly one register write, so it is safe to
    /// call from a fault path ahead of any bookkeeping.
    pub fn shutdown(&mut self) {
        self.image = BridgeConfig::all_off();
        self.regs.write_control(0);
    }

    /// Read the raw diagnosis status flags
    pub fn status(&self) -> u32 {
        self.regs.read_status()
    }

    /// Clear the given status flags
    pub fn clear_status(&mut self, mask: u32) {
        self.regs.clear_status(mask);
    }

    /// Select which diagnosis interrupts a channel raises
    pub fn set_int_channel(&mut self, channel: BridgeChannel, interrupt: ChannelInterrupt) {
        let (ds, oc) = match interrupt {
            ChannelInterrupt::Off => (false, false),
            ChannelInterrupt::DrainSource => (true, false),
            ChannelInterrupt::OverCurrent => (false, true),
            ChannelInterrupt::Both => (true, true),
        };
        let mut enable = self.regs.read_int_enable();
        enable &= !(ds_mask(channel) | oc_mask(channel));
        if ds {
            enable |= ds_mask(channel);
        }
        if oc {
            enable |= oc_mask(channel);
        }
        self.regs.write_int_enable(enable);
    }

    /// Off-state diagnosis of all phases.
    ///
    /// Pulls every phase toward the battery rail through the high-side
    /// diagnosis current sources and reads the low-side drain-source
    /// monitors (a trip means the phase sits at ground), then pulls every
    /// phase down through the low sides and reads the high-side monitors
    /// (a trip means the phase sits at the battery rail). The bridge is
    /// restored to all-off and the flags are cleared afterwards.
    ///
    /// Only valid while the bridge is off; diagnosis cannot run concurrently
    /// with active switching.
    pub fn off_diagnosis(&mut self) -> Result<OffDiagnosis, BdrvError> {
        if !self.image.is_off() {
            return Err(BdrvError::BridgeActive);
        }

        let mut result = OffDiagnosis::default();

        self.regs.clear_status(STATUS_DS_ALL);
        let mut pull_up = BridgeConfig::all_off();
        for leg in 0..PHASES as u8 {
            pull_up.set(
                BridgeChannel::high_side(leg),
                ChannelConfig::DiagCurrentSource,
            );
        }
        self.regs.write_control(pull_up.to_word());
        self.regs.settle();
        let status = self.regs.read_status();
        for leg in 0..PHASES as u8 {
            if status & ds_mask(BridgeChannel::low_side(leg)) != 0 {
                result.phases[leg as usize] = PhaseDiag::ShortToGnd;
            }
        }

        self.regs.clear_status(STATUS_DS_ALL);
        let mut pull_down = BridgeConfig::all_off();
        for leg in 0..PHASES as u8 {
            pull_down.set(
                BridgeChannel::low_side(leg),
                ChannelConfig::DiagCurrentSource,
            );
        }
        self.regs.write_control(pull_down.to_word());
        self.regs.settle();
        let status = self.regs.read_status();
        for leg in 0..PHASES as u8 {
            if status & ds_mask(BridgeChannel::high_side(leg)) != 0
                && result.phases[leg as usize] == PhaseDiag::Ok
            {
                result.phases[leg as usize] = PhaseDiag::ShortToVBat;
            }
        }

        self.regs.write_control(0);
        self.regs.clear_status(STATUS_DS_ALL);

        result.global_fail = result.phases.iter().any(|p| *p != PhaseDiag::Ok);
        if result.global_fail {
            warn!("bridge off-diagnosis failed");
        }
        Ok(result)
    }

    /// Open-load check.
    ///
    /// Sources the diagnosis current into phase 1 with phase 2's low side
    /// statically on. With a winding connected the sink pulls phase 1 down
    /// and the sourcing high-side FET sees the full drain-source drop; if
    /// its monitor stays clear the phase floated at the rail, no current
    /// flowed and the load is open. Returns `true` when an open load is
    /// detected.
    ///
    /// Only valid while the bridge is off.
    pub fn diag_open_load(&mut self) -> Result<bool, BdrvError> {
        if !self.image.is_off() {
            return Err(BdrvError::BridgeActive);
        }

        self.regs.clear_status(STATUS_DS_ALL);
        let probe = BridgeConfig::all_off()
            .with(BridgeChannel::Hs1, ChannelConfig::DiagCurrentSource)
            .with(BridgeChannel::Ls2, ChannelConfig::StaticOn);
        self.regs.write_control(probe.to_word());
        self.regs.settle();
        let status = self.regs.read_status();
        let open = status & ds_mask(BridgeChannel::Hs1) == 0;

        self.regs.write_control(0);
        self.regs.clear_status(STATUS_DS_ALL);

        if open {
            warn!("open load detected, no current path through the motor");
        }
        Ok(open)
    }
}
