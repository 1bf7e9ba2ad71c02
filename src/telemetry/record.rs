//! Log records and their on-disk row format.

use core::fmt::Write as _;

use heapless::String;

use crate::error::StorageFault;
use crate::program::StepLabel;
use crate::sensors::{Reading, SensorSnapshot};
use crate::text::Tenths;

/// First line of every run log.
pub const RUN_LOG_HEADER: &str = "ms;T1;U1;T2;U2;Tavg;Uavg;mask;step";

/// One formatted run-log line including the trailing newline.
pub type CsvRow = String<96>;

/// One sensor sample, produced by the sampler and written once by the
/// flush worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub ms: u64,
    pub first: Reading,
    pub second: Reading,
    pub average: Reading,
    /// Actuator mask applied when the sample was taken.
    pub mask: u8,
    pub step: StepLabel,
}

impl LogRecord {
    pub fn from_snapshot(ms: u64, snap: &SensorSnapshot, mask: u8, step: StepLabel) -> Self {
        Self {
            ms,
            first: snap.first,
            second: snap.second,
            average: snap.average,
            mask: mask & 0x0F,
            step,
        }
    }

    /// `ms;T1;U1;T2;U2;Tavg;Uavg;mask;step\n`
    pub fn to_row(&self) -> Result<CsvRow, StorageFault> {
        let mut row = CsvRow::new();
        writeln!(
            row,
            "{};{};{};{};{};{};{};{};{}",
            self.ms,
            Tenths(self.first.temp),
            Tenths(self.first.humidity),
            Tenths(self.second.temp),
            Tenths(self.second.humidity),
            Tenths(self.average.temp),
            Tenths(self.average.humidity),
            self.mask,
            self.step
        )
        .map_err(|_| StorageFault::CapacityExceeded)?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::bounded;

    #[test]
    fn row_matches_header_layout() {
        let rec = LogRecord {
            ms: 12_345,
            first: Reading { temp: 215, humidity: 603 },
            second: Reading { temp: -5, humidity: 600 },
            average: Reading { temp: 105, humidity: 601 },
            mask: 0b0101,
            step: bounded("WARM").unwrap(),
        };
        assert_eq!(
            rec.to_row().unwrap().as_str(),
            "12345;21.5;60.3;-0.5;60.0;10.5;60.1;5;WARM\n"
        );
        assert_eq!(RUN_LOG_HEADER.split(';').count(), 9);
    }

    #[test]
    fn snapshot_mask_is_clipped() {
        let snap = SensorSnapshot::default();
        let rec = LogRecord::from_snapshot(1, &snap, 0xFF, StepLabel::new());
        assert_eq!(rec.mask, 0x0F);
    }
}
