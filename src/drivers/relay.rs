//! Four-channel relay bank.
//!
//! Bit *i* of the actuator mask drives relay *i*.  Most relay boards are
//! active-low, so the polarity is a constructor flag rather than a
//! property of the pins.
//!
//! ## Safety contract
//!
//! The bank never decides anything; the thermostat and run machine compute
//! the mask.  It does, however, remember the last mask so callers can
//! report what the hardware is actually holding.

use embedded_hal::digital::OutputPin;
use log::warn;

pub const RELAY_COUNT: usize = 4;

pub struct RelayBank<P> {
    pins: [P; RELAY_COUNT],
    active_low: bool,
    mask: u8,
}

impl<P: OutputPin> RelayBank<P> {
    /// Build the bank and switch every relay off.
    pub fn new(pins: [P; RELAY_COUNT], active_low: bool) -> Self {
        let mut bank = Self {
            pins,
            active_low,
            mask: 0xFF,
        };
        bank.apply(0);
        bank
    }

    /// Drive every relay from `mask` (upper bits ignored).
    pub fn apply(&mut self, mask: u8) {
        let mask = mask & 0x0F;
        for (i, pin) in self.pins.iter_mut().enumerate() {
            let on = mask & (1 << i) != 0;
            let high = on != self.active_low;
            let res = if high { pin.set_high() } else { pin.set_low() };
            if res.is_err() {
                warn!("relay: pin {} write failed", i);
            }
        }
        self.mask = mask;
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }
}
