//!
//! Hall sensor sampling and rotor sector decoding
//!

use core::fmt::Debug;

use embedded_hal::digital::v2::InputPin;

use crate::error::Fault;
use crate::Direction;

/// Pattern to rotor sector lookup.
///
/// The six valid patterns follow the Gray sequence 1, 3, 2, 6, 4, 5 over one
/// forward electrical revolution; all-low and all-high mean a disconnected
/// or shorted sensor.
const SECTOR_TABLE: [Option<u8>; 8] = [
    None,    // 0b000 sensor fault
    Some(0), // 0b001
    Some(2), // 0b010
    Some(1), // 0b011
    Some(4), // 0b100
    Some(5), // 0b101
    Some(3), // 0b110
    None,    // 0b111 sensor fault
];

/// One 3-bit hall sensor sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HallPattern(u8);

impl HallPattern {
    /// Build a pattern from the three sensor lines
    pub fn new(a: bool, b: bool, c: bool) -> Self {
        Self((a as u8) << 2 | (b as u8) << 1 | c as u8)
    }

    /// Wrap a raw 3-bit sample
    pub fn from_raw(raw: u8) -> Self {
        Self(raw & 0b111)
    }

    /// The raw 3-bit value
    pub fn raw(self) -> u8 {
        self.0
    }

    /// The rotor sector this pattern maps to, `None` for the two invalid
    /// patterns
    pub fn sector(self) -> Option<u8> {
        SECTOR_TABLE[self.0 as usize]
    }

    /// Whether the pattern is one of the six valid positions
    pub fn is_valid(self) -> bool {
        self.sector().is_some()
    }
}

/// What one decoded sample means for the rotor position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HallStep {
    /// Same pattern as last time, nothing to infer
    None,
    /// Adjacent sector transition, direction known
    Step { sector: u8, direction: Direction },
    /// First sample, or a non-adjacent jump (missed edges): the position is
    /// re-established but no direction or speed can be inferred
    Resync { sector: u8 },
}

/// Stateful hall decoder.
///
/// Tracks the last pattern for repeated-sample rejection and the last sector
/// for direction inference.
#[derive(Debug, Default)]
pub struct HallDecoder {
    last_pattern: Option<HallPattern>,
    last_sector: Option<u8>,
}

impl HallDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the tracked position (the next sample resyncs)
    pub fn reset(&mut self) {
        self.last_pattern = None;
        self.last_sector = None;
    }

    /// The last established rotor sector
    pub fn sector(&self) -> Option<u8> {
        self.last_sector
    }

    /// Decode one sample.
    ///
    /// An invalid pattern is a sensor fault and leaves the tracked sector
    /// untouched.
    pub fn feed(&mut self, pattern: HallPattern) -> Result<HallStep, Fault> {
        let Some(sector) = pattern.sector() else {
            return Err(Fault::Sensor);
        };
        if self.last_pattern == Some(pattern) {
            return Ok(HallStep::None);
        }
        self.last_pattern = Some(pattern);

        let previous = self.last_sector.replace(sector);
        let step = match previous {
            None => HallStep::Resync { sector },
            Some(previous) => match (sector + 6 - previous) % 6 {
                1 => HallStep::Step {
                    sector,
                    direction: Direction::Forward,
                },
                5 => HallStep::Step {
                    sector,
                    direction: Direction::Reverse,
                },
                0 => HallStep::None,
                _ => HallStep::Resync { sector },
            },
        };
        Ok(step)
    }
}

/// Samples the three hall inputs into a [`HallPattern`].
///
/// The pin-to-channel wiring is fixed by which pin is passed as A, B and C.
pub struct HallSensors<A, B, C> {
    a: A,
    b: B,
    c: C,
}

impl<A, B, C, E> HallSensors<A, B, C>
where
    A: InputPin<Error = E>,
    B: InputPin<Error = E>,
    C: InputPin<Error = E>,
    E: Debug,
{
    pub fn new(a: A, b: B, c: C) -> Self {
        Self { a, b, c }
    }

    /// Read the three lines into a pattern
    pub fn sample(&self) -> Result<HallPattern, E> {
        Ok(HallPattern::new(
            self.a.is_high()?,
            self.b.is_high()?,
            self.c.is_high()?,
        ))
    }
}
