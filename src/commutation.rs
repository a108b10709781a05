//!
//! Block-commutation table
//!
//! Maps (rotor sector, direction) to the bridge channel image that
//! energizes the correct phase pair: the source phase's high side runs the
//! PWM, the sink phase's low side is enabled, everything else stays off.
//!

use bdrv::{BridgeChannel, BridgeConfig, ChannelConfig};

use crate::pwm::Phase;
use crate::Direction;

/// (source leg, sink leg) energized in each forward sector.
const FORWARD_PAIRS: [(u8, u8); 6] = [
    (0, 1), // A high, B low
    (0, 2), // A high, C low
    (1, 2), // B high, C low
    (1, 0), // B high, A low
    (2, 0), // C high, A low
    (2, 1), // C high, B low
];

/// The bridge image and active PWM phase for a rotor sector.
///
/// Total over all six sectors in both directions; the reverse entries are
/// the forward entries rotated by three sectors, which flips the torque.
/// Every entry energizes exactly one high side and one low side on
/// different legs.
pub fn commutate(sector: u8, direction: Direction) -> (BridgeConfig, Phase) {
    let index = match direction {
        Direction::Forward => sector % 6,
        Direction::Reverse => (sector + 3) % 6,
    };
    let (source, sink) = FORWARD_PAIRS[index as usize];
    let config = BridgeConfig::all_off()
        .with(BridgeChannel::high_side(source), ChannelConfig::Pwm)
        .with(BridgeChannel::low_side(sink), ChannelConfig::Enabled);
    (config, Phase::from_leg(source))
}

/// Bridge image held while waiting for the first hall sample: the low sides
/// conduct to ground so the high-side bootstrap supplies charge, the motor
/// sees no differential voltage and produces no torque.
pub fn standby() -> BridgeConfig {
    BridgeConfig::all_off()
        .with(BridgeChannel::Ls1, ChannelConfig::Enabled)
        .with(BridgeChannel::Ls2, ChannelConfig::Enabled)
        .with(BridgeChannel::Ls3, ChannelConfig::Enabled)
}
