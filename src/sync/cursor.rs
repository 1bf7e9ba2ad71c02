//! Resumable upload cursors and their acknowledgment files.
//!
//! A cursor for `RUN03.CSV` lives in `RUN03.ACK` as one line:
//!
//! ```text
//! byteOffset,lineIndex,lastSyncEpoch
//! ```
//!
//! The file is rewritten only after the remote acknowledged every row up to
//! `byteOffset`, so a crash or failed job re-sends rows rather than losing
//! them.

use core::fmt::Write as _;

use heapless::String;
use log::debug;

use crate::app::ports::{FileName, FileStore};
use crate::error::StorageFault;
use crate::text::bounded;

/// Name used when the source file has no extension.
pub const FALLBACK_ACK_NAME: &str = "SYNC.ACK";

/// Read position in an append-only log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadCursor {
    pub file: FileName,
    pub byte_offset: u64,
    pub line_index: u32,
    /// The offset reached the end of the file when it was last read.
    pub synced: bool,
}

impl UploadCursor {
    pub fn start(file: FileName) -> Self {
        Self {
            file,
            ..Self::default()
        }
    }
}

/// `RUN03.CSV` → `RUN03.ACK`; no extension → [`FALLBACK_ACK_NAME`].
pub fn ack_name(file: &str) -> FileName {
    let mut out = FileName::new();
    match file.rfind('.') {
        Some(dot) if out.push_str(&file[..dot]).is_ok() && out.push_str(".ACK").is_ok() => out,
        _ => bounded(FALLBACK_ACK_NAME).unwrap_or_default(),
    }
}

/// Load the persisted cursor for `file` (zero if none).  Also returns the
/// recorded sync epoch.
pub fn load_cursor(
    fs: &mut impl FileStore,
    file: &FileName,
) -> Result<(UploadCursor, u64), StorageFault> {
    let mut cursor = UploadCursor::start(file.clone());
    let ack = ack_name(file);
    let mut buf = [0u8; 48];
    let n = match fs.read_at(&ack, 0, &mut buf) {
        Ok(n) => n,
        Err(StorageFault::NotFound) => return Ok((cursor, 0)),
        Err(e) => return Err(e),
    };

    let text = core::str::from_utf8(&buf[..n]).unwrap_or("");
    let line = text.lines().next().unwrap_or("").trim();
    let mut fields = line.split(',').map(|f| f.trim().parse::<u64>().unwrap_or(0));
    cursor.byte_offset = fields.next().unwrap_or(0);
    cursor.line_index = fields.next().unwrap_or(0).min(u64::from(u32::MAX)) as u32;
    let epoch = fields.next().unwrap_or(0);
    debug!(
        "sync: cursor {} at offset {} line {}",
        file, cursor.byte_offset, cursor.line_index
    );
    Ok((cursor, epoch))
}

/// Replace the acknowledgment file for `cursor.file`.
pub fn save_cursor(
    fs: &mut impl FileStore,
    cursor: &UploadCursor,
    epoch: u64,
) -> Result<(), StorageFault> {
    let ack = ack_name(&cursor.file);
    let mut line = String::<48>::new();
    writeln!(line, "{},{},{}", cursor.byte_offset, cursor.line_index, epoch)
        .map_err(|_| StorageFault::CapacityExceeded)?;
    fs.remove(&ack)?;
    fs.write_file(&ack, line.as_bytes())
}
