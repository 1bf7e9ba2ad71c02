//! Sensor subsystem: the redundant temperature/humidity pair and the
//! aggregating [`SensorHub`].
//!
//! The hub owns both probes and produces a [`SensorSnapshot`] on demand.
//! Values are carried as signed tenths (`235` = 23.5 °C / 23.5 %RH).
//!
//! A failed primary read keeps the previous good values; the snapshot only
//! reports `valid = false` until the first successful read.  A failed or
//! absent secondary probe mirrors the primary so the averages stay sane.

use embedded_hal::delay::DelayNs;
use log::{debug, warn};

/// Read attempts per probe per sample.
pub const READ_ATTEMPTS: u8 = 3;
/// Pause between failed attempts.
pub const RETRY_DELAY_MS: u32 = 50;
/// Regular sampling period.
pub const SAMPLE_PERIOD_MS: u64 = 3000;
/// Sampling period while no valid reading exists.
pub const FAIL_RETRY_MS: u64 = 2000;

/// One temperature/humidity pair in tenths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reading {
    pub temp: i16,
    pub humidity: i16,
}

impl Reading {
    fn mean(a: Self, b: Self) -> Self {
        Self {
            temp: ((i32::from(a.temp) + i32::from(b.temp)) / 2) as i16,
            humidity: ((i32::from(a.humidity) + i32::from(b.humidity)) / 2) as i16,
        }
    }
}

/// A single temperature/humidity probe.
pub trait Probe {
    /// One read attempt; `None` on timeout or checksum failure.
    fn read(&mut self) -> Option<Reading>;
}

/// Point-in-time view of both probes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorSnapshot {
    pub first: Reading,
    pub second: Reading,
    pub average: Reading,
    /// At least one good primary read has happened.
    pub valid: bool,
    /// The most recent primary read succeeded.
    pub first_ok: bool,
    /// The most recent secondary read succeeded (or no secondary fitted).
    pub second_ok: bool,
}

impl SensorSnapshot {
    /// Averaged temperature when a valid reading exists.
    pub fn temperature(&self) -> Option<i16> {
        self.valid.then_some(self.average.temp)
    }
}

/// Owns the probes and the last-good snapshot.
pub struct SensorHub<P1, P2, D> {
    first: P1,
    second: Option<P2>,
    delay: D,
    last: SensorSnapshot,
}

impl<P1: Probe, P2: Probe, D: DelayNs> SensorHub<P1, P2, D> {
    pub fn new(first: P1, second: Option<P2>, delay: D) -> Self {
        Self {
            first,
            second,
            delay,
            last: SensorSnapshot::default(),
        }
    }

    /// Sample both probes (with retries) and return the updated snapshot.
    pub fn read_all(&mut self) -> SensorSnapshot {
        let first = read_with_retries(&mut self.first, &mut self.delay);
        let second = match self.second.as_mut() {
            Some(p) => read_with_retries(p, &mut self.delay),
            None => None,
        };
        self.last.first_ok = first.is_some();
        self.last.second_ok = self.second.is_none() || second.is_some();

        let Some(first) = first else {
            warn!("sensors: primary probe failed, keeping last good values");
            return self.last;
        };
        let second = second.unwrap_or(first);

        self.last.first = first;
        self.last.second = second;
        self.last.average = Reading::mean(first, second);
        self.last.valid = true;
        debug!(
            "sensors: t={} h={}",
            self.last.average.temp, self.last.average.humidity
        );
        self.last
    }

    pub fn last(&self) -> SensorSnapshot {
        self.last
    }
}

fn read_with_retries<P: Probe, D: DelayNs>(probe: &mut P, delay: &mut D) -> Option<Reading> {
    for attempt in 0..READ_ATTEMPTS {
        if let Some(r) = probe.read() {
            return Some(r);
        }
        if attempt + 1 < READ_ATTEMPTS {
            delay.delay_ms(RETRY_DELAY_MS);
        }
    }
    None
}
