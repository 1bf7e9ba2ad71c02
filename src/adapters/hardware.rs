//! Hardware adapter: bridges real peripherals to domain port traits.
//!
//! Owns the [`SensorHub`] and the [`RelayBank`], exposing them through
//! [`SensorPort`] and [`ActuatorPort`].  The drivers are written against
//! `embedded-hal`, so the same adapter runs on ESP-IDF pins and on the
//! simulator's fake pins.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::app::ports::{ActuatorPort, SensorPort};
use crate::drivers::relay::RelayBank;
use crate::sensors::{Probe, SensorHub, SensorSnapshot};

/// Concrete adapter that combines all chamber hardware behind port traits.
pub struct HardwareAdapter<P1, P2, D, R> {
    sensors: SensorHub<P1, P2, D>,
    relays: RelayBank<R>,
}

impl<P1, P2, D, R> HardwareAdapter<P1, P2, D, R>
where
    P1: Probe,
    P2: Probe,
    D: DelayNs,
    R: OutputPin,
{
    pub fn new(sensors: SensorHub<P1, P2, D>, relays: RelayBank<R>) -> Self {
        Self { sensors, relays }
    }

    /// Mask the relays are holding right now.
    pub fn relay_mask(&self) -> u8 {
        self.relays.mask()
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl<P1, P2, D, R> SensorPort for HardwareAdapter<P1, P2, D, R>
where
    P1: Probe,
    P2: Probe,
    D: DelayNs,
    R: OutputPin,
{
    fn read_all(&mut self) -> SensorSnapshot {
        self.sensors.read_all()
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl<P1, P2, D, R> ActuatorPort for HardwareAdapter<P1, P2, D, R>
where
    P1: Probe,
    P2: Probe,
    D: DelayNs,
    R: OutputPin,
{
    fn apply_mask(&mut self, mask: u8) {
        self.relays.apply(mask);
    }
}
