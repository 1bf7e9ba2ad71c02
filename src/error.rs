//! Unified error types for the chamber controller.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! control loop's error handling uniform.  All variants are `Copy` so they
//! can be carried through state machines and event payloads without
//! allocation.  Nothing in the core is fatal: every fault here has a local
//! recovery path (demote, back off, reject, skip).

use core::fmt;

use crate::sync::job::JobStage;
use crate::sync::link::BringUpStage;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the controller funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Removable storage could not be opened, read or written.
    Storage(StorageFault),
    /// A program could not be loaded or started.
    ProgramLoad(ProgramLoadError),
    /// The radio coprocessor rejected a command or a bring-up stage timed out.
    Network(NetworkFault),
    /// An upload job failed.
    Job(JobFault),
    /// A configuration value was out of range or incomplete.
    Config(ConfigValidationError),
    /// A run command was issued in a phase that does not accept it.
    Run(RunError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::ProgramLoad(e) => write!(f, "program: {e}"),
            Self::Network(e) => write!(f, "network: {e}"),
            Self::Job(e) => write!(f, "job: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Run(e) => write!(f, "run: {e}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Storage faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFault {
    /// The medium is absent or failed to initialise.
    NotMounted,
    /// The named file does not exist.
    NotFound,
    /// A file could not be opened or created.
    OpenFailed,
    /// Reading or seeking failed.
    ReadFailed,
    /// Appending, syncing or replacing a file failed.
    WriteFailed,
    /// No free run log name was left (RUN01..RUN98 all taken).
    NamespaceExhausted,
    /// A formatted row or file name did not fit its bounded buffer.
    CapacityExceeded,
}

impl fmt::Display for StorageFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotMounted => write!(f, "medium not mounted"),
            Self::NotFound => write!(f, "file not found"),
            Self::OpenFailed => write!(f, "open failed"),
            Self::ReadFailed => write!(f, "read failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::NamespaceExhausted => write!(f, "no free run log name"),
            Self::CapacityExceeded => write!(f, "capacity exceeded"),
        }
    }
}

impl From<StorageFault> for Error {
    fn from(e: StorageFault) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Program load errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramLoadError {
    /// The program holds zero steps.
    ProgramEmpty,
    /// More steps than the step cache can hold.
    TooManySteps,
    /// A step line had too few fields or a non-numeric duration.
    MalformedStep { line: u16 },
    /// A metadata line carried an unparseable value.
    MalformedMeta { line: u16 },
    /// A step label or program id did not fit its bounded buffer.
    TextTooLong { line: u16 },
    /// No built-in program with that index.
    UnknownBuiltin,
    /// The program file is larger than the load buffer.
    FileTooLarge,
    /// The program file is not valid UTF-8.
    NotText,
}

impl fmt::Display for ProgramLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProgramEmpty => write!(f, "program has no steps"),
            Self::TooManySteps => write!(f, "step count exceeds cache capacity"),
            Self::MalformedStep { line } => write!(f, "malformed step on line {line}"),
            Self::MalformedMeta { line } => write!(f, "malformed metadata on line {line}"),
            Self::TextTooLong { line } => write!(f, "text field too long on line {line}"),
            Self::UnknownBuiltin => write!(f, "unknown built-in program"),
            Self::FileTooLarge => write!(f, "program file too large"),
            Self::NotText => write!(f, "program file is not text"),
        }
    }
}

impl From<ProgramLoadError> for Error {
    fn from(e: ProgramLoadError) -> Self {
        Self::ProgramLoad(e)
    }
}

// ---------------------------------------------------------------------------
// Network faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFault {
    /// The coprocessor answered a bring-up command with an error token.
    CommandRejected(BringUpStage),
    /// No success token arrived before the stage deadline.
    StageTimeout(BringUpStage),
    /// Writing to the coprocessor link failed.
    LinkWrite,
    /// A command line did not fit its bounded buffer.
    CommandTooLong,
}

impl fmt::Display for NetworkFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandRejected(stage) => write!(f, "{stage:?} rejected"),
            Self::StageTimeout(stage) => write!(f, "{stage:?} timed out"),
            Self::LinkWrite => write!(f, "coprocessor write failed"),
            Self::CommandTooLong => write!(f, "command too long"),
        }
    }
}

impl From<NetworkFault> for Error {
    fn from(e: NetworkFault) -> Self {
        Self::Network(e)
    }
}

// ---------------------------------------------------------------------------
// Job faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFault {
    /// Another job is already in flight.
    Busy,
    /// The network is not online.
    NotOnline,
    /// The JSON payload exceeded its bound.
    PayloadTooLarge,
    /// The request head exceeded its bound.
    HeaderTooLarge,
    /// A stage deadline expired.
    StageTimeout(JobStage),
    /// The coprocessor reported an error token during a stage.
    Rejected(JobStage),
    /// The remote answered with a non-2xx status.
    Status(u16),
    /// The connection closed (or timed out) without a parsable status line.
    NoStatus,
}

impl fmt::Display for JobFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "job already in flight"),
            Self::NotOnline => write!(f, "network offline"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::HeaderTooLarge => write!(f, "request head too large"),
            Self::StageTimeout(stage) => write!(f, "{stage:?} timed out"),
            Self::Rejected(stage) => write!(f, "{stage:?} rejected"),
            Self::Status(code) => write!(f, "status {code}"),
            Self::NoStatus => write!(f, "no status line"),
        }
    }
}

impl JobFault {
    /// Failures with no parsed status are network-level and force the
    /// bring-up pipeline back through reconnection.
    pub fn is_network_level(self) -> bool {
        !matches!(self, Self::Status(_))
    }
}

impl From<JobFault> for Error {
    fn from(e: JobFault) -> Self {
        Self::Job(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigValidationError {
    MinOnOutOfRange,
    MinOffOutOfRange,
    HeaterBitOutOfRange,
    SafetyMaxOutOfRange,
    MissingSsid,
    MissingHost,
    MissingPath,
    MissingToken,
    /// A text value did not fit the named field.
    ValueTooLong(&'static str),
    /// A numeric value failed to parse for the named field.
    NotANumber(&'static str),
    /// Configuration changes are refused while a run is active.
    RunActive,
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinOnOutOfRange => write!(f, "min on-time must be 1-600 s"),
            Self::MinOffOutOfRange => write!(f, "min off-time must be 1-600 s"),
            Self::HeaterBitOutOfRange => write!(f, "heater bit must be 0-3"),
            Self::SafetyMaxOutOfRange => write!(f, "safety max on-time must be 0-3600 s"),
            Self::MissingSsid => write!(f, "network name missing"),
            Self::MissingHost => write!(f, "API host missing"),
            Self::MissingPath => write!(f, "API path missing"),
            Self::MissingToken => write!(f, "API token missing"),
            Self::ValueTooLong(field) => write!(f, "{field} too long"),
            Self::NotANumber(field) => write!(f, "{field} is not a number"),
            Self::RunActive => write!(f, "rejected while a run is active"),
        }
    }
}

impl From<ConfigValidationError> for Error {
    fn from(e: ConfigValidationError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Run command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunError {
    /// A run is already in progress.
    AlreadyActive,
    /// No run is in progress.
    NotActive,
    /// Acknowledge was issued while no retrieval was pending.
    NoRetrievalPending,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyActive => write!(f, "run already active"),
            Self::NotActive => write!(f, "no active run"),
            Self::NoRetrievalPending => write!(f, "no retrieval pending"),
        }
    }
}

impl From<RunError> for Error {
    fn from(e: RunError) -> Self {
        Self::Run(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
