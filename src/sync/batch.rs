//! Cursor-driven batch reader.
//!
//! Reads whole lines from an append-only log starting at a cursor, skipping
//! blank lines, headers and rows that fail to parse.  Skipped lines still
//! advance the byte offset; only accepted rows advance the line index.

use heapless::Vec;
use log::debug;

use super::cursor::UploadCursor;
use super::rows::LogRow;
use crate::app::ports::FileStore;
use crate::error::StorageFault;

/// Upper bound on rows per batch.
pub const BATCH_CAPACITY: usize = 4;
/// Longest line kept; longer ones are consumed and skipped.
pub const MAX_LINE: usize = 128;
const CHUNK: usize = 64;

/// Rows read plus the cursor that acknowledging them would persist.
#[derive(Debug)]
pub struct Batch<R> {
    pub rows: Vec<R, BATCH_CAPACITY>,
    pub next: UploadCursor,
}

impl<R> Batch<R> {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What the last [`LineReader::advance`] produced.
#[derive(Debug, PartialEq, Eq)]
enum RawLine<'a> {
    Text(&'a str),
    Overlong,
    NotUtf8,
}

struct LineReader<'n> {
    name: &'n str,
    chunk: [u8; CHUNK],
    chunk_len: usize,
    chunk_pos: usize,
    next_read: u64,
    consumed: u64,
    line: Vec<u8, MAX_LINE>,
    overlong: bool,
}

impl<'n> LineReader<'n> {
    fn new(name: &'n str, offset: u64) -> Self {
        Self {
            name,
            chunk: [0; CHUNK],
            chunk_len: 0,
            chunk_pos: 0,
            next_read: offset,
            consumed: offset,
            line: Vec::new(),
            overlong: false,
        }
    }

    /// Byte offset just past the last line returned.
    fn position(&self) -> u64 {
        self.consumed
    }

    /// Load the next line; `false` at end of file.  A final line without a
    /// newline still counts.
    fn advance(&mut self, fs: &mut impl FileStore) -> Result<bool, StorageFault> {
        self.line.clear();
        self.overlong = false;
        let mut any = false;
        loop {
            if self.chunk_pos == self.chunk_len {
                let n = fs.read_at(self.name, self.next_read, &mut self.chunk)?;
                if n == 0 {
                    return Ok(any);
                }
                self.next_read += n as u64;
                self.chunk_len = n;
                self.chunk_pos = 0;
            }
            let byte = self.chunk[self.chunk_pos];
            self.chunk_pos += 1;
            self.consumed += 1;
            any = true;
            if byte == b'\n' {
                return Ok(true);
            }
            if self.line.push(byte).is_err() {
                self.overlong = true;
            }
        }
    }

    fn current(&self) -> RawLine<'_> {
        if self.overlong {
            return RawLine::Overlong;
        }
        match core::str::from_utf8(&self.line) {
            Ok(s) => RawLine::Text(s.trim_end_matches('\r')),
            Err(_) => RawLine::NotUtf8,
        }
    }
}

/// Read up to `max_rows` rows of `R` starting at `from`.
///
/// An offset beyond the current size (file replaced externally) yields an
/// empty, synced batch without moving the cursor backwards.
pub fn read_batch<R: LogRow>(
    fs: &mut impl FileStore,
    from: &UploadCursor,
    max_rows: usize,
) -> Result<Batch<R>, StorageFault> {
    let size = fs.size(&from.file)?;
    let mut next = from.clone();
    let mut rows = Vec::new();
    if from.byte_offset >= size {
        next.synced = true;
        return Ok(Batch { rows, next });
    }

    let max_rows = max_rows.min(BATCH_CAPACITY);
    let mut reader = LineReader::new(&from.file, from.byte_offset);
    while rows.len() < max_rows && reader.advance(fs)? {
        next.byte_offset = reader.position();
        match reader.current() {
            RawLine::Text(line) => {
                let line = line.trim();
                if line.is_empty() || line.starts_with("ms;") {
                    continue;
                }
                match R::parse(line) {
                    Ok(mut row) => {
                        next.line_index += 1;
                        row.set_line_index(next.line_index);
                        // cannot fail: bounded by max_rows
                        let _ = rows.push(row);
                    }
                    Err(e) => debug!("sync: skipping row in {}: {}", from.file, e),
                }
            }
            RawLine::Overlong => debug!("sync: skipping overlong line in {}", from.file),
            RawLine::NotUtf8 => debug!("sync: skipping undecodable line in {}", from.file),
        }
    }
    next.synced = next.byte_offset >= size;
    Ok(Batch { rows, next })
}
