//! Wall-clock state and ISO-8601 rendering.
//!
//! Control timing never depends on the real-time clock; it only stamps
//! journal rows, telemetry records and acknowledgment files.

use core::fmt::Write as _;

use heapless::String;

/// ISO-8601 UTC text, e.g. `2025-03-14T09:26:53Z`.
pub type IsoTime = String<20>;

/// Placeholder used when no trustworthy wall clock is available.
pub const EPOCH_PLACEHOLDER: &str = "1970-01-01T00:00:00Z";

/// Health of the real-time clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtcState {
    /// Running and set.
    Ok,
    /// Present but never set (or lost power).
    #[default]
    Invalid,
    /// Not responding.
    Fail,
}

impl RtcState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Invalid => "invalid",
            Self::Fail => "fail",
        }
    }
}

/// One reading of the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WallTime {
    pub state: RtcState,
    /// Seconds since the Unix epoch; meaningful only when `state` is `Ok`.
    pub epoch_secs: u64,
}

impl WallTime {
    pub const fn valid(epoch_secs: u64) -> Self {
        Self {
            state: RtcState::Ok,
            epoch_secs,
        }
    }

    pub const fn unavailable(state: RtcState) -> Self {
        Self {
            state,
            epoch_secs: 0,
        }
    }

    /// Epoch seconds when the clock is trustworthy.
    pub fn epoch(&self) -> Option<u64> {
        (self.state == RtcState::Ok).then_some(self.epoch_secs)
    }

    /// ISO text, or [`EPOCH_PLACEHOLDER`] when the clock is not trustworthy.
    pub fn iso(&self) -> IsoTime {
        match self.epoch() {
            Some(secs) => format_iso(secs),
            None => {
                let mut s = String::new();
                let _ = s.push_str(EPOCH_PLACEHOLDER);
                s
            }
        }
    }
}

/// Render epoch seconds as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn format_iso(epoch_secs: u64) -> IsoTime {
    let days = (epoch_secs / 86_400) as i64;
    let rem = epoch_secs % 86_400;
    let (y, m, d) = civil_from_days(days);
    let mut out = String::new();
    // 20 bytes fit any year up to 9999
    let _ = write!(
        out,
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y,
        m,
        d,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    );
    out
}

/// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = yoe + era * 400 + i64::from(m <= 2);
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_epoch_zero() {
        assert_eq!(format_iso(0).as_str(), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn formats_known_instants() {
        assert_eq!(format_iso(951_782_400).as_str(), "2000-02-29T00:00:00Z");
        assert_eq!(format_iso(1_700_000_000).as_str(), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn invalid_clock_renders_placeholder() {
        let t = WallTime {
            state: RtcState::Invalid,
            epoch_secs: 1_700_000_000,
        };
        assert_eq!(t.iso().as_str(), EPOCH_PLACEHOLDER);
        assert_eq!(t.epoch(), None);
        assert_eq!(WallTime::valid(5).epoch(), Some(5));
    }
}
