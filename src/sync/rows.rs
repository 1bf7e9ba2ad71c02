//! Parsers for log rows read back from the removable medium.
//!
//! Both logs are `;`-separated with a header line.  A row is accepted only
//! when it has exactly the expected field count and its first field starts
//! with a digit; anything else is a [`RowParseError`] and gets skipped by the
//! batch reader.

use core::fmt;

use crate::app::ports::FileName;
use crate::program::StepLabel;
use crate::rtc::IsoTime;
use crate::telemetry::journal::{EventTag, ScreenName};
use crate::text::{bounded, parse_tenths};

pub const TELEMETRY_FIELDS: usize = 9;
pub const EVENT_FIELDS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowParseError {
    FieldCount(usize),
    /// The first field does not start with a digit (header or garbage).
    NotARow,
    BadNumber(&'static str),
    TooLong(&'static str),
}

impl fmt::Display for RowParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldCount(n) => write!(f, "{n} fields"),
            Self::NotARow => write!(f, "not a data row"),
            Self::BadNumber(field) => write!(f, "bad number in {field}"),
            Self::TooLong(field) => write!(f, "{field} too long"),
        }
    }
}

/// A row type the batch reader can produce.
pub trait LogRow: Sized {
    fn parse(line: &str) -> Result<Self, RowParseError>;

    /// Stamp the 1-based position of the row among accepted rows.
    fn set_line_index(&mut self, index: u32);
}

/// Row of a `RUNxx.CSV` file.  Values are tenths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryRow {
    pub line_index: u32,
    pub ms: u64,
    pub t1: i16,
    pub u1: i16,
    pub t2: i16,
    pub u2: i16,
    pub tavg: i16,
    pub uavg: i16,
    pub mask: u8,
    pub step: StepLabel,
}

/// Row of `EVENTS.CSV`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub line_index: u32,
    pub ms: u64,
    pub rtc_iso: IsoTime,
    pub event: EventTag,
    pub screen: ScreenName,
    pub arg0: i16,
    pub arg1: i16,
    pub run_file: FileName,
    pub step: u16,
}

fn split_fields<const N: usize>(line: &str) -> Result<[&str; N], RowParseError> {
    let mut out = [""; N];
    let mut count = 0;
    for field in line.split(';') {
        if count < N {
            out[count] = field.trim();
        }
        count += 1;
    }
    if count != N {
        return Err(RowParseError::FieldCount(count));
    }
    if !out[0].starts_with(|c: char| c.is_ascii_digit()) {
        return Err(RowParseError::NotARow);
    }
    Ok(out)
}

fn number<T: core::str::FromStr>(s: &str, field: &'static str) -> Result<T, RowParseError> {
    s.parse().map_err(|_| RowParseError::BadNumber(field))
}

fn tenths(s: &str, field: &'static str) -> Result<i16, RowParseError> {
    parse_tenths(s).ok_or(RowParseError::BadNumber(field))
}

fn text<const N: usize>(s: &str, field: &'static str) -> Result<heapless::String<N>, RowParseError> {
    bounded(s).ok_or(RowParseError::TooLong(field))
}

impl LogRow for TelemetryRow {
    fn parse(line: &str) -> Result<Self, RowParseError> {
        let [ms, t1, u1, t2, u2, tavg, uavg, mask, step] = split_fields::<TELEMETRY_FIELDS>(line)?;
        let mask: u8 = number(mask, "mask")?;
        Ok(Self {
            line_index: 0,
            ms: number(ms, "ms")?,
            t1: tenths(t1, "T1")?,
            u1: tenths(u1, "U1")?,
            t2: tenths(t2, "T2")?,
            u2: tenths(u2, "U2")?,
            tavg: tenths(tavg, "Tavg")?,
            uavg: tenths(uavg, "Uavg")?,
            mask: mask & 0x0F,
            step: text(step, "step")?,
        })
    }

    fn set_line_index(&mut self, index: u32) {
        self.line_index = index;
    }
}

impl LogRow for EventRow {
    fn parse(line: &str) -> Result<Self, RowParseError> {
        let [ms, rtc_iso, event, screen, arg0, arg1, run_file, step] =
            split_fields::<EVENT_FIELDS>(line)?;
        Ok(Self {
            line_index: 0,
            ms: number(ms, "ms")?,
            rtc_iso: text(rtc_iso, "rtc_iso")?,
            event: text(event, "event")?,
            screen: text(screen, "screen")?,
            arg0: number(arg0, "arg0")?,
            arg1: number(arg1, "arg1")?,
            run_file: text(run_file, "run_file")?,
            step: number(step, "step")?,
        })
    }

    fn set_line_index(&mut self, index: u32) {
        self.line_index = index;
    }
}
