//!
//! Register-block fake for host-side tests
//!

use crate::bridge::{BridgeChannel, BridgeConfig, ChannelConfig, PHASES};
use crate::{ds_mask, BridgeRegisters};

/// Maximum number of control-word writes the fake remembers.
const WRITE_HISTORY: usize = 256;

/// In-memory bridge register block with a minimal electrical model.
///
/// Drain-source flags are computed from the committed control word and the
/// injected phase conditions, so the diagnosis procedures observe the same
/// cause-and-effect as on hardware: a phase shorted to ground trips its
/// low-side monitor whenever the phase is pulled up, a connected winding
/// returns the open-load probe current and trips the source-side monitor,
/// and so on. [`MockBridge::latched`] carries directly injected flags (for
/// over-current trips) and honors write-one-to-clear.
///
/// Every control-word write is recorded so tests can assert that no unsafe
/// image was ever committed, not just that the final image is safe.
#[derive(Debug)]
pub struct MockBridge {
    /// Motor winding present between the phases
    pub connected: bool,
    /// Injected short-to-ground condition per phase
    pub short_to_gnd: [bool; PHASES],
    /// Injected short-to-battery condition per phase
    pub short_to_vbat: [bool; PHASES],
    /// Directly injected status flags, cleared by `clear_status`
    pub latched: u32,
    /// Last committed control word
    pub control: u32,
    /// Interrupt-enable word
    pub int_enable: u32,
    /// Control-word write history
    pub writes: [u32; WRITE_HISTORY],
    /// Number of control-word writes performed
    pub write_count: usize,
}

impl MockBridge {
    /// A healthy bridge with a motor connected and no shorts
    pub fn new() -> Self {
        Self {
            connected: true,
            short_to_gnd: [false; PHASES],
            short_to_vbat: [false; PHASES],
            latched: 0,
            control: 0,
            int_enable: 0,
            writes: [0; WRITE_HISTORY],
            write_count: 0,
        }
    }

    /// Every control word committed so far, oldest first
    pub fn write_history(&self) -> &[u32] {
        &self.writes[..self.write_count.min(WRITE_HISTORY)]
    }

    /// Whether any low side other than `source_leg`'s offers a current path
    fn sink_present(image: &BridgeConfig, source_leg: u8) -> bool {
        (0..PHASES as u8).any(|leg| {
            leg != source_leg
                && matches!(
                    image.get(BridgeChannel::low_side(leg)),
                    ChannelConfig::Enabled | ChannelConfig::Pwm | ChannelConfig::StaticOn
                )
        })
    }
}

impl Default for MockBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeRegisters for MockBridge {
    fn write_control(&mut self, word: u32) {
        self.control = word;
        if self.write_count < WRITE_HISTORY {
            self.writes[self.write_count] = word;
        }
        self.write_count += 1;
    }

    fn read_control(&self) -> u32 {
        self.control
    }

    fn read_status(&self) -> u32 {
        let mut status = self.latched;
        let Ok(image) = BridgeConfig::from_word(self.control) else {
            return status;
        };
        for leg in 0..PHASES as u8 {
            let high = image.get(BridgeChannel::high_side(leg));
            let low = image.get(BridgeChannel::low_side(leg));
            if high == ChannelConfig::DiagCurrentSource {
                // phase pulled toward the battery rail
                if self.short_to_gnd[leg as usize] {
                    status |= ds_mask(BridgeChannel::low_side(leg));
                }
                if self.connected && Self::sink_present(&image, leg) {
                    // the winding pulls the phase down through the sink,
                    // the source-side FET sees the full drain-source drop
                    status |= ds_mask(BridgeChannel::high_side(leg));
                }
            }
            if low == ChannelConfig::DiagCurrentSource && self.short_to_vbat[leg as usize] {
                status |= ds_mask(BridgeChannel::high_side(leg));
            }
        }
        status
    }

    fn clear_status(&mut self, mask: u32) {
        self.latched &= !mask;
    }

    fn write_int_enable(&mut self, word: u32) {
        self.int_enable = word;
    }

    fn read_int_enable(&self) -> u32 {
        self.int_enable
    }
}
