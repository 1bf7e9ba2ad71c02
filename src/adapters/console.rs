//! Line-oriented operator console.
//!
//! Turns text lines from the serial console (or the simulator's stdin)
//! into [`AppCommand`]s.  Parsing is pure; resolving a `start` or `set`
//! request needs the file store and the live config, so that step runs in
//! the main loop.
//!
//! ```text
//! start INT2 | start P1.TXT      pause | resume | ack | stop
//! set THERMO_MIN_ON_S=30         save | reconnect
//! event time_set clock 13 45
//! ```

use core::fmt;
use std::sync::mpsc::{self, Receiver};

use heapless::String;
use log::{info, warn};

use crate::app::commands::AppCommand;
use crate::app::ports::{FileName, FileStore};
use crate::config::{apply_overrides, SystemConfig};
use crate::error::Result;
use crate::program::Program;
use crate::text::bounded;

/// One parsed console line.
#[derive(Debug, Clone)]
pub enum ConsoleRequest {
    /// Load the named program (built-in id or file) and start it.
    Start(FileName),
    /// Apply one `KEY=VALUE` override to a copy of the live config.
    Set(String<96>),
    Command(AppCommand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleError {
    Empty,
    UnknownCommand,
    MissingArgument,
    BadNumber,
    TooLong,
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "empty line",
            Self::UnknownCommand => "unknown command",
            Self::MissingArgument => "missing argument",
            Self::BadNumber => "bad number",
            Self::TooLong => "argument too long",
        })
    }
}

pub fn parse_line(line: &str) -> core::result::Result<ConsoleRequest, ConsoleError> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or(ConsoleError::Empty)?;
    let mut arg = || words.next().ok_or(ConsoleError::MissingArgument);

    let cmd = match verb.to_ascii_lowercase().as_str() {
        "start" => {
            let name = bounded(arg()?).ok_or(ConsoleError::TooLong)?;
            return Ok(ConsoleRequest::Start(name));
        }
        "set" => {
            let kv = arg()?;
            if !kv.contains('=') {
                return Err(ConsoleError::MissingArgument);
            }
            let kv = bounded(kv).ok_or(ConsoleError::TooLong)?;
            return Ok(ConsoleRequest::Set(kv));
        }
        "pause" => AppCommand::Pause,
        "resume" => AppCommand::Resume,
        "ack" => AppCommand::AcknowledgeRetrieval,
        "stop" => AppCommand::Stop,
        "save" => AppCommand::SaveConfig,
        "reconnect" => AppCommand::ForceReconnect,
        "event" => {
            let tag = bounded(arg()?).ok_or(ConsoleError::TooLong)?;
            let screen = bounded(arg()?).ok_or(ConsoleError::TooLong)?;
            let mut number = || -> core::result::Result<i16, ConsoleError> {
                match words.next() {
                    Some(w) => w.parse().map_err(|_| ConsoleError::BadNumber),
                    None => Ok(0),
                }
            };
            let arg0 = number()?;
            let arg1 = number()?;
            AppCommand::JournalEvent {
                tag,
                screen,
                arg0,
                arg1,
            }
        }
        _ => return Err(ConsoleError::UnknownCommand),
    };
    Ok(ConsoleRequest::Command(cmd))
}

/// Turn a request into a command the service can take.
pub fn resolve(
    request: ConsoleRequest,
    fs: &mut impl FileStore,
    config: &SystemConfig,
) -> Result<AppCommand> {
    match request {
        ConsoleRequest::Start(name) => {
            let program = Program::by_name(fs, &name)?;
            info!("console: loaded '{}' ({} steps)", program.id, program.step_count());
            Ok(AppCommand::StartRun(program))
        }
        ConsoleRequest::Set(kv) => {
            let mut next = config.clone();
            let report = apply_overrides(&mut next, &kv);
            if report.applied == 0 {
                warn!("console: '{}' not applied", kv);
            }
            Ok(AppCommand::UpdateConfig(next))
        }
        ConsoleRequest::Command(cmd) => Ok(cmd),
    }
}

/// Read stdin lines on a background thread.
///
/// The main loop polls the receiver with `try_recv` so it never blocks on
/// the console.
pub fn spawn_stdin_reader() -> std::io::Result<Receiver<std::string::String>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("console".into())
        .stack_size(8 * 1024)
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, StorageFault};
    use crate::testing::MemStore;

    #[test]
    fn parses_simple_commands() {
        assert!(matches!(
            parse_line("  PAUSE "),
            Ok(ConsoleRequest::Command(AppCommand::Pause))
        ));
        assert!(matches!(
            parse_line("ack"),
            Ok(ConsoleRequest::Command(AppCommand::AcknowledgeRetrieval))
        ));
        assert!(matches!(parse_line(""), Err(ConsoleError::Empty)));
        assert!(matches!(parse_line("dance"), Err(ConsoleError::UnknownCommand)));
        assert!(matches!(parse_line("start"), Err(ConsoleError::MissingArgument)));
    }

    #[test]
    fn event_arguments_default_to_zero() {
        let Ok(ConsoleRequest::Command(AppCommand::JournalEvent {
            tag,
            screen,
            arg0,
            arg1,
        })) = parse_line("event wifi_test network 3")
        else {
            panic!("expected journal event");
        };
        assert_eq!(tag.as_str(), "wifi_test");
        assert_eq!(screen.as_str(), "network");
        assert_eq!((arg0, arg1), (3, 0));
        assert!(matches!(
            parse_line("event a b x"),
            Err(ConsoleError::BadNumber)
        ));
    }

    #[test]
    fn start_resolves_builtin_and_file() {
        let mut fs = MemStore::default().with_file("P1.TXT", "A,1,0,1000,0\n");
        let cfg = SystemConfig::default();

        let req = parse_line("start int1").unwrap();
        assert!(matches!(
            resolve(req, &mut fs, &cfg),
            Ok(AppCommand::StartRun(p)) if p.id.as_str() == "INT1"
        ));

        let req = parse_line("start P1.TXT").unwrap();
        assert!(matches!(
            resolve(req, &mut fs, &cfg),
            Ok(AppCommand::StartRun(p)) if p.id.as_str() == "P1"
        ));

        let req = parse_line("start P2.TXT").unwrap();
        assert!(matches!(
            resolve(req, &mut fs, &cfg),
            Err(Error::Storage(StorageFault::NotFound))
        ));
    }

    #[test]
    fn set_builds_updated_config() {
        let mut fs = MemStore::default();
        let cfg = SystemConfig::default();
        let req = parse_line("set THERMO_MIN_ON_S=30").unwrap();
        let Ok(AppCommand::UpdateConfig(next)) = resolve(req, &mut fs, &cfg) else {
            panic!("expected config update");
        };
        assert_eq!(next.thermo.min_on_secs, 30);
        assert_eq!(cfg.thermo.min_on_secs, 10);
    }
}
