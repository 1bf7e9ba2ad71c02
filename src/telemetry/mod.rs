//! Telemetry logging with storage-fault resilience.
//!
//! ```text
//!  sampler ──▶ LogQueue (8, drop-oldest) ──▶ RunLog flush ──▶ RUNxx.CSV
//!                                                  │
//!  run / UI events ──────────────▶ EventJournal ───┼──▶ EVENTS.CSV
//!                                                  ▼
//!                                           StorageHealth
//! ```

pub mod journal;
pub mod queue;
pub mod record;
pub mod run_log;
pub mod storage;

pub use journal::{EventJournal, JournalEntry, EVENTS_FILE};
pub use queue::{DropOldestQueue, LogQueue};
pub use record::{LogRecord, RUN_LOG_HEADER};
pub use run_log::RunLog;
pub use storage::{StorageHealth, StorageNotice, StorageState};
