//! Network bring-up over the radio coprocessor's command link.
//!
//! ```text
//!          usable                 all stages ok
//!   Off ─────────▶ Connecting ───────────────────▶ Online
//!    ▲  ◀─────────  │  ▲  error token / timeout      │
//!    │  not usable  ▼  │ backoff elapsed             │ network-level
//!    └──────────── Error ◀───────────────────────────┘ job failure
//! ```
//!
//! Each stage sends one command and waits for a success token in the
//! receive window.  Tokens are substring matches against the last
//! [`RX_WINDOW`] characters.

use core::fmt::Write as _;

use heapless::{String, Vec};
use log::{debug, info, warn};

use super::backoff::Backoff;
use crate::app::ports::ModemPort;
use crate::config::CloudConfig;
use crate::error::NetworkFault;

pub const RX_WINDOW: usize = 180;
const COMMAND_MAX: usize = 128;

const ERROR_TOKENS: [&str; 2] = ["ERROR", "FAIL"];

// ---------------------------------------------------------------------------
// Receive window
// ---------------------------------------------------------------------------

/// Sliding window over the most recent coprocessor output.
///
/// An HTTP status line is latched as it scrolls out, so long response
/// headers cannot push the code out of reach before `CLOSED` arrives.
#[derive(Debug, Default)]
pub struct RxWindow {
    buf: Vec<u8, RX_WINDOW>,
    status: Option<u16>,
}

impl RxWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append, dropping the oldest bytes once full.
    pub fn push(&mut self, data: &[u8]) {
        for &b in data {
            if self.buf.is_full() {
                if self.status.is_none() && self.buf.starts_with(b"HTTP/1.") {
                    self.status = self.scan_status();
                }
                self.buf.remove(0);
            }
            let _ = self.buf.push(b);
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.status = None;
    }

    pub fn contains(&self, token: &str) -> bool {
        let needle = token.as_bytes();
        !needle.is_empty() && self.buf.windows(needle.len()).any(|w| w == needle)
    }

    pub fn contains_any(&self, tokens: &[&str]) -> bool {
        tokens.iter().any(|t| self.contains(t))
    }

    /// Status code following `HTTP/1.1 ` or `HTTP/1.0 `, including one that
    /// already scrolled out since the last [`clear`](Self::clear).
    pub fn status_code(&self) -> Option<u16> {
        self.status.or_else(|| self.scan_status())
    }

    fn scan_status(&self) -> Option<u16> {
        ["HTTP/1.1 ", "HTTP/1.0 "].iter().find_map(|marker| {
            let needle = marker.as_bytes();
            let at = self.buf.windows(needle.len()).position(|w| w == needle)?;
            let digits = &self.buf[at + needle.len()..];
            let end = digits.iter().position(|c| !c.is_ascii_digit()).unwrap_or(digits.len());
            core::str::from_utf8(&digits[..end]).ok()?.parse().ok()
        })
    }

    /// Pull everything the modem has buffered into the window.
    pub fn pump(&mut self, modem: &mut impl ModemPort) {
        let mut chunk = [0u8; 64];
        loop {
            let n = modem.read(&mut chunk);
            if n == 0 {
                break;
            }
            self.push(&chunk[..n]);
        }
    }
}

/// Clear the window, then send `line` followed by CR LF.
pub(crate) fn send_command(
    modem: &mut impl ModemPort,
    rx: &mut RxWindow,
    line: &str,
) -> Result<(), NetworkFault> {
    let mut cmd = String::<COMMAND_MAX>::new();
    write!(cmd, "{line}\r\n").map_err(|_| NetworkFault::CommandTooLong)?;
    rx.clear();
    modem.write(cmd.as_bytes())
}

// ---------------------------------------------------------------------------
// Bring-up stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringUpStage {
    Handshake,
    EchoOff,
    StationMode,
    JoinNetwork,
    SingleConnection,
}

impl BringUpStage {
    pub fn timeout_ms(self) -> u64 {
        match self {
            Self::JoinNetwork => 15_000,
            Self::SingleConnection => 3000,
            _ => 2000,
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            Self::Handshake => Some(Self::EchoOff),
            Self::EchoOff => Some(Self::StationMode),
            Self::StationMode => Some(Self::JoinNetwork),
            Self::JoinNetwork => Some(Self::SingleConnection),
            Self::SingleConnection => None,
        }
    }

    fn success_tokens(self) -> &'static [&'static str] {
        match self {
            Self::JoinNetwork => &["WIFI GOT IP", "OK"],
            _ => &["OK"],
        }
    }

    fn command(self, cfg: &CloudConfig) -> Result<String<COMMAND_MAX>, NetworkFault> {
        let mut cmd = String::new();
        let res = match self {
            Self::Handshake => cmd.write_str("AT"),
            Self::EchoOff => cmd.write_str("ATE0"),
            Self::StationMode => cmd.write_str("AT+CWMODE=1"),
            Self::JoinNetwork if cfg.passphrase.is_empty() => {
                write!(cmd, "AT+CWJAP=\"{}\"", cfg.ssid)
            }
            Self::JoinNetwork => write!(cmd, "AT+CWJAP=\"{}\",\"{}\"", cfg.ssid, cfg.passphrase),
            Self::SingleConnection => cmd.write_str("AT+CIPMUX=0"),
        };
        res.map_err(|_| NetworkFault::CommandTooLong)?;
        Ok(cmd)
    }
}

// ---------------------------------------------------------------------------
// Link state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetState {
    Off,
    Connecting { stage: BringUpStage, since_ms: u64 },
    Online,
    Error { at_ms: u64 },
}

impl NetState {
    pub fn status(self) -> NetStatus {
        match self {
            Self::Off => NetStatus::Off,
            Self::Connecting { .. } => NetStatus::Connecting,
            Self::Online => NetStatus::Online,
            Self::Error { .. } => NetStatus::Error,
        }
    }
}

/// Coarse link status for display and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetStatus {
    Off,
    Connecting,
    Online,
    Error,
}

impl NetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Connecting => "connecting",
            Self::Online => "online",
            Self::Error => "error",
        }
    }
}

#[derive(Debug)]
pub struct NetworkLink {
    state: NetState,
    last_fault: Option<NetworkFault>,
}

impl Default for NetworkLink {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkLink {
    pub const fn new() -> Self {
        Self {
            state: NetState::Off,
            last_fault: None,
        }
    }

    pub fn state(&self) -> NetState {
        self.state
    }

    pub fn status(&self) -> NetStatus {
        self.state.status()
    }

    pub fn is_online(&self) -> bool {
        self.state == NetState::Online
    }

    pub fn last_fault(&self) -> Option<NetworkFault> {
        self.last_fault
    }

    /// Restart bring-up from the first stage, ignoring any pending backoff.
    pub fn force_reconnect(
        &mut self,
        now_ms: u64,
        cfg: &CloudConfig,
        modem: &mut impl ModemPort,
        rx: &mut RxWindow,
        backoff: &mut Backoff,
    ) {
        info!("net: reconnect requested");
        self.last_fault = None;
        if cfg.is_usable() {
            self.begin(now_ms, cfg, modem, rx, backoff);
        } else {
            rx.clear();
            self.set_state(NetState::Off);
        }
    }

    /// A job failed below HTTP level: the link is presumed down.
    pub fn mark_failed(&mut self, now_ms: u64) {
        if self.state != NetState::Off {
            self.set_state(NetState::Error { at_ms: now_ms });
        }
    }

    pub fn tick(
        &mut self,
        now_ms: u64,
        cfg: &CloudConfig,
        modem: &mut impl ModemPort,
        rx: &mut RxWindow,
        backoff: &mut Backoff,
    ) {
        if !cfg.is_usable() {
            if self.state != NetState::Off {
                self.set_state(NetState::Off);
            }
            return;
        }

        match self.state {
            NetState::Online => {}
            NetState::Off => self.begin(now_ms, cfg, modem, rx, backoff),
            NetState::Error { .. } => {
                if backoff.ready(now_ms) {
                    self.begin(now_ms, cfg, modem, rx, backoff);
                }
            }
            NetState::Connecting { stage, since_ms } => {
                if rx.contains_any(stage.success_tokens()) {
                    match stage.next() {
                        Some(next) => self.enter_stage(next, now_ms, cfg, modem, rx, backoff),
                        None => {
                            rx.clear();
                            self.last_fault = None;
                            self.set_state(NetState::Online);
                        }
                    }
                } else if rx.contains_any(&ERROR_TOKENS) {
                    self.fail(NetworkFault::CommandRejected(stage), now_ms, backoff);
                } else if now_ms.saturating_sub(since_ms) > stage.timeout_ms() {
                    self.fail(NetworkFault::StageTimeout(stage), now_ms, backoff);
                }
            }
        }
    }

    fn begin(
        &mut self,
        now_ms: u64,
        cfg: &CloudConfig,
        modem: &mut impl ModemPort,
        rx: &mut RxWindow,
        backoff: &mut Backoff,
    ) {
        debug!("net: starting bring-up");
        self.enter_stage(BringUpStage::Handshake, now_ms, cfg, modem, rx, backoff);
    }

    fn enter_stage(
        &mut self,
        stage: BringUpStage,
        now_ms: u64,
        cfg: &CloudConfig,
        modem: &mut impl ModemPort,
        rx: &mut RxWindow,
        backoff: &mut Backoff,
    ) {
        let sent = stage
            .command(cfg)
            .and_then(|cmd| send_command(modem, rx, &cmd));
        match sent {
            Ok(()) => {
                self.set_state(NetState::Connecting {
                    stage,
                    since_ms: now_ms,
                })
            }
            Err(e) => self.fail(e, now_ms, backoff),
        }
    }

    fn fail(&mut self, fault: NetworkFault, now_ms: u64, backoff: &mut Backoff) {
        let wait = backoff.record_failure(now_ms);
        warn!("net: bring-up failed: {} (retry in {} ms)", fault, wait);
        self.last_fault = Some(fault);
        self.set_state(NetState::Error { at_ms: now_ms });
    }

    fn set_state(&mut self, next: NetState) {
        let (from, to) = (self.state.status(), next.status());
        if from != to {
            info!("net transition: {:?} -> {:?}", from, to);
        }
        self.state = next;
    }
}
