//! Experiment programs: ordered steps plus run-level metadata.
//!
//! Program text is line oriented.  Metadata lines are `KEY=VALUE` (or
//! `KEY,VALUE` for the well-known keys); every other non-comment line is a
//! step:
//!
//! ```text
//! ID=HEAT1
//! RETRIEVALS=2
//! INTERVAL_MIN=30
//! STEP_UNIT=MIN
//! # label,duration,-,mask,-,tmin,tmax
//! WARM,10,0,0010,0000,20.0,25.0
//! HOLD,45,0,1010,0000,28,0
//! ```
//!
//! The mask column is four `0`/`1` characters; character *i* drives
//! actuator bit *i*.  Temperatures are decimal degrees stored as tenths.

use core::fmt::Write as _;

use heapless::{String, Vec};
use log::debug;

use crate::app::ports::{FileName, FileStore};
use crate::error::{Error, ProgramLoadError, StorageFault};
use crate::text::{bounded, parse_tenths};

/// Step cache capacity.
pub const MAX_STEPS: usize = 90;
pub const MAX_LABEL_LEN: usize = 9;
pub const DEFAULT_STEP_UNIT_MS: u32 = 1000;
/// Largest program file accepted from storage.
pub const MAX_PROGRAM_BYTES: u64 = 8192;

pub type StepLabel = String<MAX_LABEL_LEN>;

/// Optional per-step temperature band, in tenths of a degree.
///
/// The relative order of the two bounds selects the thermostat policy; see
/// [`ThermoMode::from_band`](crate::control::thermostat::ThermoMode::from_band).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TempBand {
    pub low: i16,
    pub high: i16,
}

/// One timed phase of a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub label: StepLabel,
    /// Duration in the program's step units.
    pub duration: u16,
    /// Raw 4-bit actuator mask.
    pub mask: u8,
    pub band: TempBand,
}

/// Where a program came from.  Built-in programs have no backing file, so
/// their run log is opened lazily on the first flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramSource {
    Storage,
    Builtin,
}

/// A loaded program.  Immutable once parsed; replaced wholesale on reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub id: FileName,
    pub number: u16,
    pub step_unit_ms: u32,
    pub retrievals: u8,
    pub retrieval_interval_min: u16,
    pub steps: Vec<Step, MAX_STEPS>,
    pub source: ProgramSource,
    /// File the program was loaded from (`INT1.CSV` for built-ins); empty
    /// for text parsed without a backing file.
    pub file: FileName,
}

impl Program {
    fn empty(source: ProgramSource) -> Self {
        Self {
            id: String::new(),
            number: 1,
            step_unit_ms: DEFAULT_STEP_UNIT_MS,
            retrievals: 0,
            retrieval_interval_min: 0,
            steps: Vec::new(),
            source,
            file: FileName::new(),
        }
    }

    /// Parse program text.
    ///
    /// Fails on the first malformed line, on overflow of the step cache, and
    /// when the text holds no steps at all.
    pub fn parse(text: &str, source: ProgramSource) -> Result<Self, ProgramLoadError> {
        let mut program = Self::empty(source);

        for (idx, raw) in text.lines().enumerate() {
            let line_no = u16::try_from(idx + 1).unwrap_or(u16::MAX);
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = split_meta(line) {
                program.apply_meta(key, value, line_no)?;
                continue;
            }

            let step = parse_step(line, line_no)?;
            program
                .steps
                .push(step)
                .map_err(|_| ProgramLoadError::TooManySteps)?;
        }

        if program.steps.is_empty() {
            return Err(ProgramLoadError::ProgramEmpty);
        }
        debug!(
            "program: parsed '{}' with {} steps (unit {} ms)",
            program.id,
            program.steps.len(),
            program.step_unit_ms
        );
        Ok(program)
    }

    /// One of the compiled-in programs (`0..BUILTIN_PROGRAMS.len()`).
    pub fn builtin(index: usize) -> Result<Self, ProgramLoadError> {
        let (id, text) = BUILTIN_PROGRAMS
            .get(index)
            .ok_or(ProgramLoadError::UnknownBuiltin)?;
        let mut program = Self::parse(text, ProgramSource::Builtin)?;
        write!(program.file, "{id}.CSV").map_err(|_| ProgramLoadError::TextTooLong { line: 0 })?;
        Ok(program)
    }

    /// Read and parse a program file from storage.
    ///
    /// A program without an `ID` line is named after its file stem.
    pub fn load(fs: &mut impl FileStore, name: &str) -> Result<Self, Error> {
        let bytes = fs.read_to_end(name, MAX_PROGRAM_BYTES).map_err(|e| match e {
            StorageFault::CapacityExceeded => Error::ProgramLoad(ProgramLoadError::FileTooLarge),
            other => Error::Storage(other),
        })?;
        let text = core::str::from_utf8(&bytes).map_err(|_| ProgramLoadError::NotText)?;

        let mut program = Self::parse(text, ProgramSource::Storage)?;
        program.file = bounded(name).ok_or(ProgramLoadError::TextTooLong { line: 0 })?;
        if program.id.is_empty() {
            let stem = name.split('.').next().unwrap_or(name);
            program.id = bounded(stem).ok_or(ProgramLoadError::TextTooLong { line: 0 })?;
        }
        Ok(program)
    }

    /// A built-in program by id (`INT1`..), otherwise the named file.
    pub fn by_name(fs: &mut impl FileStore, name: &str) -> Result<Self, Error> {
        match BUILTIN_PROGRAMS
            .iter()
            .position(|(id, _)| id.eq_ignore_ascii_case(name))
        {
            Some(index) => Ok(Self::builtin(index)?),
            None => Self::load(fs, name),
        }
    }

    /// Name recorded against this program in the event journal.
    pub fn run_file(&self) -> &FileName {
        if self.file.is_empty() {
            &self.id
        } else {
            &self.file
        }
    }

    pub fn step_count(&self) -> u16 {
        self.steps.len() as u16
    }

    /// Wall duration of a step under this program's time unit.
    pub fn step_duration_ms(&self, step: &Step) -> u64 {
        u64::from(step.duration) * u64::from(self.step_unit_ms)
    }

    fn apply_meta(&mut self, key: &str, value: &str, line: u16) -> Result<(), ProgramLoadError> {
        let bad = ProgramLoadError::MalformedMeta { line };
        match meta_key(key) {
            Some(MetaKey::Id) => {
                if !is_field_text(value) {
                    return Err(bad);
                }
                self.id = bounded(value).ok_or(ProgramLoadError::TextTooLong { line })?;
            }
            Some(MetaKey::Number) => self.number = value.parse().map_err(|_| bad)?,
            Some(MetaKey::Retrievals) => self.retrievals = value.parse().map_err(|_| bad)?,
            Some(MetaKey::Interval) => {
                self.retrieval_interval_min = value.parse().map_err(|_| bad)?;
            }
            Some(MetaKey::StepUnit) => self.step_unit_ms = parse_step_unit(value).ok_or(bad)?,
            None => debug!("program: ignoring metadata '{}' on line {}", key, line),
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Line grammar
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetaKey {
    Id,
    Number,
    Retrievals,
    Interval,
    StepUnit,
}

fn meta_key(key: &str) -> Option<MetaKey> {
    let is = |k: &str| key.eq_ignore_ascii_case(k);
    if is("ID") {
        Some(MetaKey::Id)
    } else if is("PROGRAM") {
        Some(MetaKey::Number)
    } else if is("RETRIEVALS") || is("RETIRADAS") {
        Some(MetaKey::Retrievals)
    } else if is("INTERVAL_MIN") || is("INTERVALO") {
        Some(MetaKey::Interval)
    } else if is("STEP_UNIT") || is("STEP_UNIT_MS") || is("UNIDADE") {
        Some(MetaKey::StepUnit)
    } else {
        None
    }
}

/// Metadata is any `KEY=VALUE` line, or a `KEY,VALUE` line whose key is one
/// of the well-known metadata keys.
fn split_meta(line: &str) -> Option<(&str, &str)> {
    if let Some((k, v)) = line.split_once('=') {
        return Some((k.trim(), v.trim()));
    }
    let (k, v) = line.split_once(',')?;
    meta_key(k.trim()).map(|_| (k.trim(), v.trim()))
}

/// `S`/`SEC`/`SEG` → 1000, `M`/`MIN` → 60000, otherwise milliseconds
/// (0 falls back to 1000).
fn parse_step_unit(value: &str) -> Option<u32> {
    let is = |k: &str| value.eq_ignore_ascii_case(k);
    if is("S") || is("SEC") || is("SEG") {
        return Some(1000);
    }
    if is("M") || is("MIN") {
        return Some(60_000);
    }
    let ms: u32 = value.parse().ok()?;
    Some(if ms == 0 { DEFAULT_STEP_UNIT_MS } else { ms })
}

fn parse_step(line: &str, line_no: u16) -> Result<Step, ProgramLoadError> {
    let malformed = ProgramLoadError::MalformedStep { line: line_no };
    let fields: Vec<&str, 8> = line.split(',').map(str::trim).take(8).collect();
    if fields.len() < 5 {
        return Err(malformed);
    }

    if !is_field_text(fields[0]) {
        return Err(malformed);
    }
    let label = bounded(fields[0]).ok_or(ProgramLoadError::TextTooLong { line: line_no })?;
    let duration = fields[1].parse().map_err(|_| malformed)?;
    let mask = parse_mask(fields[3]);
    let band_field = |i: usize| -> Result<i16, ProgramLoadError> {
        match fields.get(i) {
            None => Ok(0),
            Some(f) if f.is_empty() => Ok(0),
            Some(f) => parse_tenths(f).ok_or(malformed),
        }
    };

    Ok(Step {
        label,
        duration,
        mask,
        band: TempBand {
            low: band_field(5)?,
            high: band_field(6)?,
        },
    })
}

/// Labels and ids are copied verbatim into `;`-separated log rows.
fn is_field_text(s: &str) -> bool {
    !s.chars().any(|c| c == ';' || c.is_control())
}

/// `"1010"` → bits 0 and 2.
fn parse_mask(field: &str) -> u8 {
    field
        .bytes()
        .take(4)
        .enumerate()
        .filter(|&(_, c)| c == b'1')
        .fold(0, |m, (i, _)| m | (1 << i))
}

// ───────────────────────────────────────────────────────────────
// Built-in programs
// ───────────────────────────────────────────────────────────────

/// Compiled-in test programs, available without removable storage.
pub const BUILTIN_PROGRAMS: [(&str, &str); 4] = [
    (
        "INT1",
        "ID=INT1\nPROGRAM=1\nRETRIEVALS=0\nINTERVAL_MIN=0\nSTEP_UNIT=SEC\n\
         S1,3,0,1000,0000,0,0\nS2,4,0,0100,0000,0,0\nS3,5,0,0010,0000,0,0\n\
         S4,3,0,0001,0000,0,0\nS5,4,0,1100,0000,0,0\n",
    ),
    (
        "INT2",
        "ID=INT2\nPROGRAM=1\nRETRIEVALS=0\nINTERVAL_MIN=0\nSTEP_UNIT=SEC\n\
         A1,5,0,1010,0000,0,0\nA2,5,0,0101,0000,0,0\nA3,5,0,0011,0000,0,0\n\
         A4,5,0,1111,0000,0,0\n",
    ),
    (
        "INT3",
        "ID=INT3\nPROGRAM=1\nRETRIEVALS=0\nINTERVAL_MIN=0\nSTEP_UNIT=SEC\n\
         B1,2,0,1000,0000,0,0\nB2,2,0,0100,0000,0,0\nB3,2,0,0010,0000,0,0\n\
         B4,2,0,0001,0000,0,0\nB5,2,0,1110,0000,0,0\n",
    ),
    (
        "INT4",
        "ID=INT4\nPROGRAM=1\nRETRIEVALS=0\nINTERVAL_MIN=0\nSTEP_UNIT=SEC\n\
         T28,60,0,0000,0000,28,0\n",
    ),
];
