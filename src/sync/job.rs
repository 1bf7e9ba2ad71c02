//! Single-slot HTTP upload job over the coprocessor's secure socket.
//!
//! ```text
//!  Idle ─▶ OpenSecureSocket ─▶ AwaitSendPrompt ─▶ Sending ─▶ AwaitResponse ─▶ Done
//!            7 s                  4 s               5 s          9 s
//! ```
//!
//! Any stage may fail on an error token or its deadline; the socket is
//! always closed on the way out.  The response stage finishes on `CLOSED`
//! or deadline, whichever comes first, with whatever status line was seen.

use core::fmt::Write as _;

use heapless::String;
use log::{debug, info, warn};

use super::cursor::UploadCursor;
use super::link::{send_command, RxWindow};
use super::payload::{BatchKind, Payload, RequestHead};
use crate::app::ports::ModemPort;
use crate::error::JobFault;

pub const TLS_PORT: u16 = 443;
const ERROR_TOKENS: [&str; 2] = ["ERROR", "FAIL"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Idle,
    OpenSecureSocket,
    AwaitSendPrompt,
    Sending,
    AwaitResponse,
    Done,
}

impl JobStage {
    pub fn timeout_ms(self) -> u64 {
        match self {
            Self::OpenSecureSocket => 7000,
            Self::AwaitSendPrompt => 4000,
            Self::Sending => 5000,
            Self::AwaitResponse => 9000,
            Self::Idle | Self::Done => 0,
        }
    }
}

/// Everything needed to send one batch and acknowledge it afterwards.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub kind: BatchKind,
    pub head: RequestHead,
    pub payload: Payload,
    /// Cursor to persist once the remote accepted the batch.
    pub next_cursor: UploadCursor,
    pub rows: u8,
}

/// Result of a finished job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub kind: BatchKind,
    pub result: Result<u16, JobFault>,
    pub next_cursor: UploadCursor,
    pub rows: u8,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug)]
pub struct JobMachine {
    stage: JobStage,
    job: Option<UploadJob>,
    deadline_ms: u64,
    /// First status code seen while awaiting the response.
    status: Option<u16>,
}

impl Default for JobMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl JobMachine {
    pub const fn new() -> Self {
        Self {
            stage: JobStage::Idle,
            job: None,
            deadline_ms: 0,
            status: None,
        }
    }

    pub fn stage(&self) -> JobStage {
        self.stage
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.stage, JobStage::Idle | JobStage::Done)
    }

    /// Rows carried by the job in flight.
    pub fn pending_rows(&self) -> u8 {
        self.job.as_ref().map_or(0, |j| j.rows)
    }

    /// Open the socket for `job`.  Rejected while busy or offline.
    pub fn start(
        &mut self,
        job: UploadJob,
        host: &str,
        online: bool,
        now_ms: u64,
        modem: &mut impl ModemPort,
        rx: &mut RxWindow,
    ) -> Result<(), JobFault> {
        if self.is_busy() {
            return Err(JobFault::Busy);
        }
        if !online {
            return Err(JobFault::NotOnline);
        }
        let mut cmd = String::<96>::new();
        write!(cmd, "AT+CIPSTART=\"SSL\",\"{host}\",{TLS_PORT}")
            .map_err(|_| JobFault::HeaderTooLarge)?;
        debug!("sync: {:?} job, {} rows, {} bytes", job.kind, job.rows, job.payload.len());
        self.job = Some(job);
        self.status = None;
        self.enter(JobStage::OpenSecureSocket, now_ms);
        if send_command(modem, rx, &cmd).is_err() {
            self.stage = JobStage::Done;
            self.job = None;
            return Err(JobFault::Rejected(JobStage::OpenSecureSocket));
        }
        Ok(())
    }

    /// Advance the job; returns its outcome once finished.
    pub fn tick(
        &mut self,
        now_ms: u64,
        modem: &mut impl ModemPort,
        rx: &mut RxWindow,
    ) -> Option<JobOutcome> {
        let expired = now_ms > self.deadline_ms;
        match self.stage {
            JobStage::Idle | JobStage::Done => None,
            JobStage::OpenSecureSocket => {
                if rx.contains_any(&["OK", "CONNECT", "ALREADY CONNECTED"]) {
                    let len = self
                        .job
                        .as_ref()
                        .map_or(0, |j| j.head.len() + j.payload.len());
                    let mut cmd = String::<32>::new();
                    let _ = write!(cmd, "AT+CIPSEND={len}");
                    if send_command(modem, rx, &cmd).is_err() {
                        return self.fail(JobFault::Rejected(JobStage::AwaitSendPrompt), modem, rx);
                    }
                    self.enter(JobStage::AwaitSendPrompt, now_ms);
                    None
                } else {
                    self.check_failed(expired, modem, rx)
                }
            }
            JobStage::AwaitSendPrompt => {
                if rx.contains(">") {
                    rx.clear();
                    let sent = self.job.as_ref().map_or(Ok(()), |j| {
                        modem
                            .write(j.head.as_bytes())
                            .and_then(|()| modem.write(&j.payload))
                    });
                    if sent.is_err() {
                        return self.fail(JobFault::Rejected(JobStage::Sending), modem, rx);
                    }
                    self.enter(JobStage::Sending, now_ms);
                    None
                } else {
                    self.check_failed(expired, modem, rx)
                }
            }
            JobStage::Sending => {
                if rx.contains("SEND OK") {
                    self.enter(JobStage::AwaitResponse, now_ms);
                    None
                } else {
                    self.check_failed(expired, modem, rx)
                }
            }
            JobStage::AwaitResponse => {
                if self.status.is_none() {
                    self.status = rx.status_code();
                }
                if rx.contains("CLOSED") || expired {
                    let result = match self.status {
                        Some(code) if (200..300).contains(&code) => Ok(code),
                        Some(code) => Err(JobFault::Status(code)),
                        None => Err(JobFault::NoStatus),
                    };
                    self.finish(result, modem, rx)
                } else {
                    None
                }
            }
        }
    }

    fn enter(&mut self, stage: JobStage, now_ms: u64) {
        self.stage = stage;
        self.deadline_ms = now_ms + stage.timeout_ms();
    }

    fn check_failed(
        &mut self,
        expired: bool,
        modem: &mut impl ModemPort,
        rx: &mut RxWindow,
    ) -> Option<JobOutcome> {
        if rx.contains_any(&ERROR_TOKENS) {
            self.fail(JobFault::Rejected(self.stage), modem, rx)
        } else if expired {
            self.fail(JobFault::StageTimeout(self.stage), modem, rx)
        } else {
            None
        }
    }

    fn fail(
        &mut self,
        fault: JobFault,
        modem: &mut impl ModemPort,
        rx: &mut RxWindow,
    ) -> Option<JobOutcome> {
        self.finish(Err(fault), modem, rx)
    }

    fn finish(
        &mut self,
        result: Result<u16, JobFault>,
        modem: &mut impl ModemPort,
        rx: &mut RxWindow,
    ) -> Option<JobOutcome> {
        if send_command(modem, rx, "AT+CIPCLOSE").is_err() {
            debug!("sync: close command not delivered");
        }
        self.stage = JobStage::Done;
        let job = self.job.take()?;
        match result {
            Ok(code) => info!("sync: {:?} batch accepted ({})", job.kind, code),
            Err(e) => warn!("sync: {:?} batch failed: {}", job.kind, e),
        }
        Some(JobOutcome {
            kind: job.kind,
            result,
            next_cursor: job.next_cursor,
            rows: job.rows,
        })
    }
}
