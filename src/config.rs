//!
//! Load-time drive configuration
//!

/// Configuration of the drive, injected at construction.
///
/// These values come from the motor wiring and the commissioning of the
/// control loop; nothing in here is computed at runtime. Duty values are in
/// timer compare counts, not percent; a value beyond the period simply
/// saturates the output. The defaults are the commissioning values of the
/// reference 1-pole-pair motor running a 40-count period at 25 kHz.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriveConfig {
    /// Number of rotor pole pairs
    pub pole_pairs: u8,
    /// PWM switching frequency in Hz
    pub pwm_freq_hz: u32,
    /// PWM period in timer compare counts
    pub pwm_period: u16,
    /// Duty applied when commutation first engages
    pub init_duty: u16,
    /// Proportional gain of the speed loop, Q12
    pub speed_kp: i32,
    /// Integral gain of the speed loop, Q12, applied once per tick
    pub speed_ki: i32,
    /// Integrator clamp, lower bound (duty counts)
    pub speed_imin: i32,
    /// Integrator clamp, upper bound (duty counts)
    pub speed_imax: i32,
    /// Controller output clamp, lower bound (duty counts)
    pub speed_pimin: i32,
    /// Controller output clamp, upper bound (duty counts)
    pub speed_pimax: i32,
    /// Advance the commutation lookup by one sector (60 electrical degrees),
    /// set by the hall sensor mounting
    pub sixty_degree_offset: bool,
    /// Commutation delay angle in degrees; reserved for delayed-commutation
    /// schemes, zero leaves every step on its hall edge
    pub delay_angle: u16,
    /// Milliseconds without a sector step before the measured speed reads
    /// zero
    pub min_speed_delay_ms: u32,
    /// Milliseconds without a sector step before a running drive faults out
    pub stall_timeout_ms: u32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            pole_pairs: 1,
            pwm_freq_hz: 25_000,
            pwm_period: 40,
            init_duty: 5,
            speed_kp: 90,
            speed_ki: 20,
            speed_imin: 0,
            speed_imax: 75,
            speed_pimin: 8,
            speed_pimax: 75,
            sixty_degree_offset: true,
            delay_angle: 0,
            min_speed_delay_ms: 500,
            stall_timeout_ms: 500,
        }
    }
}
