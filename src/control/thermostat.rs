//! Heater thermostat.
//!
//! The active step's temperature band picks the policy:
//!
//! ```text
//!   high > low            → Hysteresis  (on below low, off above high)
//!   high ≤ low, low > 0   → Threshold   (duty cycle below low, off at low)
//!   otherwise             → Baseline    (heater bit follows the step mask)
//! ```
//!
//! Every transition is dwell-gated: the heater must have spent `min_on_secs`
//! on (or `min_off_secs` off) before it may switch again.  The only
//! exception is the threshold cut-off, which switches off immediately.

use log::{debug, info, warn};

use crate::config::ThermoConfig;
use crate::program::TempBand;

/// Control policy selected by the step's band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermoMode {
    Baseline,
    Threshold,
    Hysteresis,
}

impl ThermoMode {
    pub fn from_band(band: TempBand) -> Self {
        if band.high > band.low {
            Self::Hysteresis
        } else if band.low > 0 {
            Self::Threshold
        } else {
            Self::Baseline
        }
    }
}

/// Heater state plus the timestamps the dwell and safety rules need.
#[derive(Debug, Clone, Default)]
pub struct Thermostat {
    heater_on: bool,
    /// Last on/off transition.  `None` means every dwell is satisfied.
    changed_ms: Option<u64>,
    on_since_ms: u64,
    /// Last mask handed to the actuators.
    applied_mask: Option<u8>,
}

impl Thermostat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget dwell history (run start).  The applied mask is kept so the
    /// first update after a reset is still de-duplicated against hardware.
    pub fn reset(&mut self) {
        self.heater_on = false;
        self.changed_ms = None;
        self.on_since_ms = 0;
    }

    pub fn heater_on(&self) -> bool {
        self.heater_on
    }

    /// Last mask applied to the actuators, if any.
    pub fn applied_mask(&self) -> Option<u8> {
        self.applied_mask
    }

    /// Compute the combined actuator mask for this tick.
    ///
    /// `reading` is the averaged temperature in tenths, or `None` when no
    /// valid sample is available.
    pub fn update(
        &mut self,
        cfg: &ThermoConfig,
        band: TempBand,
        baseline: u8,
        reading: Option<i16>,
        now_ms: u64,
    ) -> u8 {
        let heater = cfg.heater_mask();
        match ThermoMode::from_band(band) {
            ThermoMode::Threshold => self.threshold(cfg, band.low, reading, now_ms),
            ThermoMode::Hysteresis => match reading {
                Some(t) => self.hysteresis(cfg, band, t, now_ms),
                None => self.mirror(baseline & heater != 0, now_ms),
            },
            ThermoMode::Baseline => self.mirror(baseline & heater != 0, now_ms),
        }

        let mask = if self.heater_on {
            baseline | heater
        } else {
            baseline & !heater
        };
        mask & 0x0F
    }

    /// `Some(mask)` when it differs from what the actuators already hold.
    pub fn take_changed(&mut self, mask: u8) -> Option<u8> {
        if self.applied_mask == Some(mask) {
            return None;
        }
        self.applied_mask = Some(mask);
        Some(mask)
    }

    // -----------------------------------------------------------------------
    // Policies
    // -----------------------------------------------------------------------

    fn threshold(&mut self, cfg: &ThermoConfig, low: i16, reading: Option<i16>, now_ms: u64) {
        let Some(t) = reading else {
            if self.heater_on {
                debug!("thermo: no reading, heater held off");
            }
            self.heater_on = false;
            return;
        };

        if t >= low {
            if self.heater_on {
                self.switch(false, now_ms);
            }
            return;
        }

        let dwell = if self.heater_on {
            cfg.min_on_secs
        } else {
            cfg.min_off_secs
        };
        if self.dwell_elapsed(dwell, now_ms) {
            self.switch(!self.heater_on, now_ms);
        }
    }

    fn hysteresis(&mut self, cfg: &ThermoConfig, band: TempBand, t: i16, now_ms: u64) {
        let want_on = if !self.heater_on && t < band.low {
            true
        } else if self.heater_on && t > band.high {
            false
        } else {
            self.heater_on
        };

        if want_on && !self.heater_on && self.dwell_elapsed(cfg.min_off_secs, now_ms) {
            self.switch(true, now_ms);
        } else if !want_on && self.heater_on && self.dwell_elapsed(cfg.min_on_secs, now_ms) {
            self.switch(false, now_ms);
        }

        if self.heater_on
            && cfg.safety_max_on_secs > 0
            && now_ms.saturating_sub(self.on_since_ms) >= secs_to_ms(cfg.safety_max_on_secs)
            && self.dwell_elapsed(cfg.min_on_secs, now_ms)
        {
            warn!(
                "thermo: safety cutoff after {} s on",
                now_ms.saturating_sub(self.on_since_ms) / 1000
            );
            self.switch(false, now_ms);
        }
    }

    /// No autonomous control: the heater follows the step's own bit.
    fn mirror(&mut self, on: bool, now_ms: u64) {
        if on && !self.heater_on {
            self.on_since_ms = now_ms;
        }
        self.heater_on = on;
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn dwell_elapsed(&self, secs: u16, now_ms: u64) -> bool {
        match self.changed_ms {
            None => true,
            Some(at) => now_ms.saturating_sub(at) >= secs_to_ms(secs.max(1)),
        }
    }

    fn switch(&mut self, on: bool, now_ms: u64) {
        info!("thermo: heater {}", if on { "on" } else { "off" });
        self.heater_on = on;
        self.changed_ms = Some(now_ms);
        if on {
            self.on_since_ms = now_ms;
        }
    }
}

fn secs_to_ms(secs: u16) -> u64 {
    u64::from(secs) * 1000
}
