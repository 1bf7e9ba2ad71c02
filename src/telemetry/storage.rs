//! Removable-storage health tracking.
//!
//! ```text
//!  Unavailable ──[mount + probe ok]──▶ Ready ──[fault, no run]──▶ Unavailable
//!                                        │ ▲
//!                          [fault, run]  │ │ [mount + probe ok]
//!                                        ▼ │
//!                                      Degraded
//! ```
//!
//! `Ready` is only ever reached through a successful mount-and-probe.
//! Probes are rate limited to one per [`PROBE_RETRY_MS`] unless forced.

use log::{info, warn};

use crate::app::ports::FileStore;
use crate::error::StorageFault;
use crate::scheduler::Cadence;

/// Minimum spacing of mount attempts.
pub const PROBE_RETRY_MS: u64 = 5000;
/// Health-check cadence.
pub const HEALTH_CHECK_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageState {
    #[default]
    Unavailable,
    Ready,
    Degraded,
}

impl StorageState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ok",
            Self::Degraded => "degraded",
            Self::Unavailable => "unavailable",
        }
    }
}

/// User-visible storage transitions raised while a run is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageNotice {
    Disconnected,
    Reconnected,
}

impl StorageNotice {
    pub fn message(self) -> &'static str {
        match self {
            Self::Disconnected => "storage disconnected, logging suspended",
            Self::Reconnected => "storage reconnected",
        }
    }
}

#[derive(Debug)]
pub struct StorageHealth {
    state: StorageState,
    last_probe_ms: Option<u64>,
    check: Cadence,
    notice: Option<StorageNotice>,
}

impl Default for StorageHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageHealth {
    pub fn new() -> Self {
        Self {
            state: StorageState::Unavailable,
            last_probe_ms: None,
            check: Cadence::new(HEALTH_CHECK_MS),
            notice: None,
        }
    }

    pub fn state(&self) -> StorageState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == StorageState::Ready
    }

    /// Return `true` if storage is usable, probing it if allowed.
    pub fn ensure_ready(
        &mut self,
        fs: &mut impl FileStore,
        now_ms: u64,
        force: bool,
        run_active: bool,
    ) -> bool {
        if self.is_ready() {
            return true;
        }
        if !force {
            if let Some(at) = self.last_probe_ms {
                if now_ms.saturating_sub(at) < PROBE_RETRY_MS {
                    return false;
                }
            }
        }
        self.last_probe_ms = Some(now_ms);
        match mount_and_probe(fs) {
            Ok(()) => {
                self.set_state(StorageState::Ready, run_active);
                true
            }
            Err(e) => {
                warn!("storage: probe failed: {}", e);
                self.set_state(fault_state(run_active), run_active);
                false
            }
        }
    }

    /// Periodic check: re-probe a Ready medium, retry a faulted one.
    pub fn health_check(&mut self, fs: &mut impl FileStore, now_ms: u64, run_active: bool) {
        if !self.check.poll(now_ms) {
            return;
        }
        if self.is_ready() {
            if let Err(e) = fs.probe() {
                warn!("storage: health check failed: {}", e);
                self.demote(run_active);
            }
        } else {
            self.ensure_ready(fs, now_ms, false, run_active);
        }
    }

    /// A read or write failed: leave `Ready`.
    pub fn demote(&mut self, run_active: bool) {
        if self.is_ready() {
            self.set_state(fault_state(run_active), run_active);
        }
    }

    /// Pending user-visible notice, if any.
    pub fn take_notice(&mut self) -> Option<StorageNotice> {
        self.notice.take()
    }

    pub fn clear_notice(&mut self) {
        self.notice = None;
    }

    fn set_state(&mut self, next: StorageState, run_active: bool) {
        let prev = self.state;
        if prev == next {
            return;
        }
        info!("storage transition: {:?} -> {:?}", prev, next);
        self.state = next;
        if run_active {
            if prev == StorageState::Ready {
                self.notice = Some(StorageNotice::Disconnected);
            } else if next == StorageState::Ready {
                self.notice = Some(StorageNotice::Reconnected);
            }
        }
    }
}

fn fault_state(run_active: bool) -> StorageState {
    if run_active {
        StorageState::Degraded
    } else {
        StorageState::Unavailable
    }
}

fn mount_and_probe(fs: &mut impl FileStore) -> Result<(), StorageFault> {
    fs.mount()?;
    fs.probe()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::FileEntry;

    /// Medium that fails while `down` is set.
    #[derive(Default)]
    struct Flaky {
        down: bool,
        mounts: u32,
    }

    impl FileStore for Flaky {
        fn mount(&mut self) -> Result<(), StorageFault> {
            self.mounts += 1;
            if self.down { Err(StorageFault::NotMounted) } else { Ok(()) }
        }
        fn probe(&mut self) -> Result<(), StorageFault> {
            if self.down { Err(StorageFault::OpenFailed) } else { Ok(()) }
        }
        fn exists(&mut self, _: &str) -> bool {
            false
        }
        fn size(&mut self, _: &str) -> Result<u64, StorageFault> {
            Err(StorageFault::NotFound)
        }
        fn append(&mut self, _: &str, _: &[u8]) -> Result<(), StorageFault> {
            Ok(())
        }
        fn sync(&mut self, _: &str) -> Result<(), StorageFault> {
            Ok(())
        }
        fn close(&mut self, _: &str) {}
        fn read_at(&mut self, _: &str, _: u64, _: &mut [u8]) -> Result<usize, StorageFault> {
            Ok(0)
        }
        fn write_file(&mut self, _: &str, _: &[u8]) -> Result<(), StorageFault> {
            Ok(())
        }
        fn remove(&mut self, _: &str) -> Result<(), StorageFault> {
            Ok(())
        }
        fn list(&mut self) -> Result<Vec<FileEntry>, StorageFault> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn probe_reaches_ready() {
        let mut fs = Flaky::default();
        let mut h = StorageHealth::new();
        assert!(h.ensure_ready(&mut fs, 0, false, false));
        assert_eq!(h.state(), StorageState::Ready);
        assert_eq!(h.take_notice(), None);
    }

    #[test]
    fn retry_is_rate_limited_unless_forced() {
        let mut fs = Flaky { down: true, ..Default::default() };
        let mut h = StorageHealth::new();
        assert!(!h.ensure_ready(&mut fs, 1_000, false, false));
        fs.down = false;
        assert!(!h.ensure_ready(&mut fs, 3_000, false, false));
        assert_eq!(fs.mounts, 1);
        assert!(h.ensure_ready(&mut fs, 3_000, true, false));
        assert_eq!(fs.mounts, 2);
    }

    #[test]
    fn demote_during_run_raises_notices() {
        let mut fs = Flaky::default();
        let mut h = StorageHealth::new();
        h.ensure_ready(&mut fs, 0, true, true);
        assert_eq!(h.take_notice(), Some(StorageNotice::Reconnected));

        h.demote(true);
        assert_eq!(h.state(), StorageState::Degraded);
        assert_eq!(h.take_notice(), Some(StorageNotice::Disconnected));

        assert!(h.ensure_ready(&mut fs, 10_000, false, true));
        assert_eq!(h.take_notice(), Some(StorageNotice::Reconnected));
    }

    #[test]
    fn demote_without_run_is_silent() {
        let mut fs = Flaky::default();
        let mut h = StorageHealth::new();
        h.ensure_ready(&mut fs, 0, true, false);
        h.demote(false);
        assert_eq!(h.state(), StorageState::Unavailable);
        assert_eq!(h.take_notice(), None);
    }

    #[test]
    fn health_check_detects_pulled_card() {
        let mut fs = Flaky::default();
        let mut h = StorageHealth::new();
        h.ensure_ready(&mut fs, 0, true, false);
        fs.down = true;
        h.health_check(&mut fs, 0, true);
        assert_eq!(h.state(), StorageState::Degraded);
    }
}
