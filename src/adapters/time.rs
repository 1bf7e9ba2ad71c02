//! Time adapter.
//!
//! Provides the monotonic millisecond clock the scheduler loop feeds into
//! every `tick`, and the wall clock behind [`ClockPort`].
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` and
//!   `gettimeofday()`.
//! - **`not(target_os = "espidf")`**: uses `std::time` for host-side
//!   testing and simulation.

use crate::app::ports::ClockPort;
use crate::rtc::{RtcState, WallTime};

/// Anything before 2020-01-01 means the clock was never set.
const EPOCH_2020: u64 = 1_577_836_800;

/// System clock adapter.
pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    #[cfg(target_os = "espidf")]
    fn epoch_secs(&self) -> Option<u64> {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        u64::try_from(tv.tv_sec).ok()
    }

    #[cfg(not(target_os = "espidf"))]
    fn epoch_secs(&self) -> Option<u64> {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs())
    }
}

impl ClockPort for SystemClock {
    fn wall_time(&self) -> WallTime {
        match self.epoch_secs() {
            Some(secs) if secs >= EPOCH_2020 => WallTime::valid(secs),
            Some(_) => WallTime::unavailable(RtcState::Invalid),
            None => WallTime::unavailable(RtcState::Fail),
        }
    }
}
