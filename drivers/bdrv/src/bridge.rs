//!
//! Bridge channel types and the control-register image
//!

use crate::error::BdrvError;

/// The number of phase legs on the bridge.
pub const PHASES: usize = 3;
/// The number of gate-driver channels (one high side and one low side per leg).
pub const CHANNELS: usize = 2 * PHASES;

/// Gate-driver configuration of a single half-bridge MOSFET channel.
///
/// The discriminants are the 4-bit field encodings used in the control word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ChannelConfig {
    /// Channel disabled
    #[default]
    Off = 0,
    /// Channel enabled, gate driven by the commutation pattern
    Enabled = 1,
    /// Channel enabled with PWM (timer compare connection)
    Pwm = 3,
    /// Channel enabled and statically on
    StaticOn = 5,
    /// Channel enabled with the diagnosis current source
    DiagCurrentSource = 9,
}

impl ChannelConfig {
    /// Decode a 4-bit control field
    pub fn from_bits(bits: u8) -> Result<Self, BdrvError> {
        match bits {
            0 => Ok(Self::Off),
            1 => Ok(Self::Enabled),
            3 => Ok(Self::Pwm),
            5 => Ok(Self::StaticOn),
            9 => Ok(Self::DiagCurrentSource),
            _ => Err(BdrvError::InvalidConfigBits),
        }
    }
}

/// A physical gate-driver channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BridgeChannel {
    /// Phase 1 low side MOSFET
    Ls1 = 0,
    /// Phase 2 low side MOSFET
    Ls2 = 1,
    /// Phase 1 high side MOSFET
    Hs1 = 2,
    /// Phase 2 high side MOSFET
    Hs2 = 3,
    /// Phase 3 low side MOSFET
    Ls3 = 4,
    /// Phase 3 high side MOSFET
    Hs3 = 5,
}

impl BridgeChannel {
    /// All channels, low sides first per phase pair
    pub const ALL: [Self; CHANNELS] = [
        Self::Ls1,
        Self::Ls2,
        Self::Hs1,
        Self::Hs2,
        Self::Ls3,
        Self::Hs3,
    ];

    /// The channel's index in the control word
    pub fn index(self) -> usize {
        self as usize
    }

    /// The phase leg (0-2) this channel switches
    pub fn leg(self) -> u8 {
        match self {
            Self::Ls1 | Self::Hs1 => 0,
            Self::Ls2 | Self::Hs2 => 1,
            Self::Ls3 | Self::Hs3 => 2,
        }
    }

    /// Whether this channel is a high side MOSFET
    pub fn is_high_side(self) -> bool {
        matches!(self, Self::Hs1 | Self::Hs2 | Self::Hs3)
    }

    /// The high side channel of a phase leg (0-2)
    pub fn high_side(leg: u8) -> Self {
        match leg {
            0 => Self::Hs1,
            1 => Self::Hs2,
            _ => Self::Hs3,
        }
    }

    /// The low side channel of a phase leg (0-2)
    pub fn low_side(leg: u8) -> Self {
        match leg {
            0 => Self::Ls1,
            1 => Self::Ls2,
            _ => Self::Ls3,
        }
    }
}

/// The complete channel-configuration image of the bridge.
///
/// This is the value object every bridge reconfiguration goes through: it is
/// validated with [`BridgeConfig::check`] and committed to hardware as a
/// single control-word write, so a partially-applied commutation step can
/// never be observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BridgeConfig {
    channels: [ChannelConfig; CHANNELS],
}

impl BridgeConfig {
    /// An image with every channel disabled
    pub const fn all_off() -> Self {
        Self {
            channels: [ChannelConfig::Off; CHANNELS],
        }
    }

    /// The configuration of one channel
    pub fn get(&self, channel: BridgeChannel) -> ChannelConfig {
        self.channels[channel.index()]
    }

    /// Set the configuration of one channel
    pub fn set(&mut self, channel: BridgeChannel, config: ChannelConfig) -> &mut Self {
        self.channels[channel.index()] = config;
        self
    }

    /// Builder-style [`BridgeConfig::set`]
    pub fn with(mut self, channel: BridgeChannel, config: ChannelConfig) -> Self {
        self.set(channel, config);
        self
    }

    /// True if no channel is driven
    pub fn is_off(&self) -> bool {
        self.channels.iter().all(|c| *c == ChannelConfig::Off)
    }

    /// Reject any image that enables both MOSFETs of one phase leg.
    ///
    /// A leg with its high and low side conducting at the same time shorts
    /// the supply through the leg (shoot-through), so no such image may ever
    /// reach the control register.
    pub fn check(&self) -> Result<(), BdrvError> {
        for leg in 0..PHASES as u8 {
            let high = self.get(BridgeChannel::high_side(leg));
            let low = self.get(BridgeChannel::low_side(leg));
            if high != ChannelConfig::Off && low != ChannelConfig::Off {
                return Err(BdrvError::ShootThrough(leg));
            }
        }
        Ok(())
    }

    /// Pack the image into the 24-bit control word (4 bits per channel)
    pub fn to_word(&self) -> u32 {
        let mut word = 0u32;
        for (index, config) in self.channels.iter().enumerate() {
            word |= (*config as u32) << (4 * index);
        }
        word
    }

    /// Decode a control word back into an image
    pub fn from_word(word: u32) -> Result<Self, BdrvError> {
        let mut image = Self::all_off();
        for index in 0..CHANNELS {
            let bits = ((word >> (4 * index)) & 0xF) as u8;
            image.channels[index] = ChannelConfig::from_bits(bits)?;
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn test_all_off_is_safe() {
        assert!(BridgeConfig::all_off().check().is_ok());
        assert!(BridgeConfig::all_off().is_off());
        assert_eq!(BridgeConfig::all_off().to_word(), 0);
    }

    #[test]
    fn test_single_phase_pair_is_safe() {
        let config = BridgeConfig::all_off()
            .with(BridgeChannel::Hs1, ChannelConfig::Pwm)
            .with(BridgeChannel::Ls2, ChannelConfig::Enabled);
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_same_leg_both_sides_rejected() {
        for leg in 0..PHASES as u8 {
            let config = BridgeConfig::all_off()
                .with(BridgeChannel::high_side(leg), ChannelConfig::Pwm)
                .with(BridgeChannel::low_side(leg), ChannelConfig::Enabled);
            assert_eq!(config.check(), Err(BdrvError::ShootThrough(leg)));
        }
    }

    #[test]
    fn test_static_on_pairing_rejected() {
        let config = BridgeConfig::all_off()
            .with(BridgeChannel::Hs3, ChannelConfig::StaticOn)
            .with(BridgeChannel::Ls3, ChannelConfig::StaticOn);
        assert_eq!(config.check(), Err(BdrvError::ShootThrough(2)));
    }

    #[test]
    fn test_word_round_trip() {
        let config = BridgeConfig::all_off()
            .with(BridgeChannel::Hs2, ChannelConfig::Pwm)
            .with(BridgeChannel::Ls3, ChannelConfig::Enabled)
            .with(BridgeChannel::Hs1, ChannelConfig::DiagCurrentSource);
        let word = config.to_word();
        assert_eq!(BridgeConfig::from_word(word), Ok(config));
    }

    #[test]
    fn test_undefined_bits_rejected() {
        // 0x2 is not a defined channel encoding
        assert_eq!(
            BridgeConfig::from_word(0x2),
            Err(BdrvError::InvalidConfigBits)
        );
    }

    #[test]
    fn test_channel_leg_mapping() {
        for channel in BridgeChannel::ALL {
            let leg = channel.leg();
            if channel.is_high_side() {
                assert_eq!(BridgeChannel::high_side(leg), channel);
            } else {
                assert_eq!(BridgeChannel::low_side(leg), channel);
            }
        }
    }
}
