//! Radio coprocessor link adapters.
//!
//! - [`UartModem`] (ESP-IDF only) talks to the AT-command coprocessor over
//!   a UART, never blocking on reads.
//! - [`SimModem`] answers the same command set from memory so the
//!   simulator and the integration tests can drive the full bring-up and
//!   upload path without a radio.

use log::debug;

use crate::app::ports::ModemPort;
use crate::error::NetworkFault;

// ───────────────────────────────────────────────────────────────
// UART (firmware)
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct UartModem<'d> {
    uart: esp_idf_hal::uart::UartDriver<'d>,
}

#[cfg(target_os = "espidf")]
impl<'d> UartModem<'d> {
    pub fn new(uart: esp_idf_hal::uart::UartDriver<'d>) -> Self {
        Self { uart }
    }
}

#[cfg(target_os = "espidf")]
impl ModemPort for UartModem<'_> {
    fn write(&mut self, data: &[u8]) -> Result<(), NetworkFault> {
        let mut rest = data;
        while !rest.is_empty() {
            match self.uart.write(rest) {
                Ok(0) | Err(_) => return Err(NetworkFault::LinkWrite),
                Ok(n) => rest = &rest[n..],
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        // zero ticks: return whatever the driver already buffered
        self.uart.read(buf, 0).unwrap_or(0)
    }
}

// ───────────────────────────────────────────────────────────────
// Simulated coprocessor
// ───────────────────────────────────────────────────────────────

/// In-memory stand-in for the coprocessor.
///
/// Replies are queued as soon as a command line (or the announced number of
/// request bytes) has been written, and handed out on the next `read`.
#[derive(Debug)]
pub struct SimModem {
    /// Status code returned for every request.
    pub status: u16,
    /// The access point rejects the join.
    pub refuse_join: bool,
    /// Drop every reply, as if the coprocessor hung.
    pub mute: bool,
    line: Vec<u8>,
    /// Request bytes still expected after `AT+CIPSEND`.
    expecting: usize,
    outbox: std::collections::VecDeque<u8>,
    /// Every request body received, header included.
    pub requests: Vec<String>,
    current: Vec<u8>,
}

impl Default for SimModem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimModem {
    pub fn new() -> Self {
        Self {
            status: 200,
            refuse_join: false,
            mute: false,
            line: Vec::new(),
            expecting: 0,
            outbox: std::collections::VecDeque::new(),
            requests: Vec::new(),
            current: Vec::new(),
        }
    }

    fn reply(&mut self, text: &str) {
        if !self.mute {
            self.outbox.extend(text.bytes());
        }
    }

    fn command(&mut self, line: &str) {
        debug!("sim-modem: <- {}", line);
        if line.starts_with("AT+CWJAP=") {
            if self.refuse_join {
                self.reply("+CWJAP:1\r\nFAIL\r\n");
            } else {
                self.reply("WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n");
            }
        } else if line.starts_with("AT+CIPSTART=") {
            self.reply("CONNECT\r\n\r\nOK\r\n");
        } else if let Some(len) = line.strip_prefix("AT+CIPSEND=") {
            match len.trim().parse::<usize>() {
                Ok(n) if n > 0 => {
                    self.expecting = n;
                    self.current.clear();
                    self.reply("OK\r\n> ");
                }
                _ => self.reply("ERROR\r\n"),
            }
        } else if line == "AT+CIPCLOSE" {
            self.reply("CLOSED\r\n\r\nOK\r\n");
        } else if matches!(line, "AT" | "ATE0" | "AT+CWMODE=1" | "AT+CIPMUX=0") {
            self.reply("OK\r\n");
        } else {
            self.reply("ERROR\r\n");
        }
    }

    fn request_complete(&mut self) {
        let body = String::from_utf8_lossy(&self.current).into_owned();
        self.requests.push(body);
        self.current.clear();
        let status = self.status;
        let reason = if (200..300).contains(&status) { "OK" } else { "Rejected" };
        let response = format!(
            "\r\nRecv {} bytes\r\n\r\nSEND OK\r\n\r\n+IPD,40:HTTP/1.1 {} {}\r\nContent-Length: 0\r\n\r\nCLOSED\r\n",
            self.requests.last().map_or(0, String::len),
            status,
            reason
        );
        self.reply(&response);
    }
}

impl ModemPort for SimModem {
    fn write(&mut self, data: &[u8]) -> Result<(), NetworkFault> {
        for &b in data {
            if self.expecting > 0 {
                self.current.push(b);
                self.expecting -= 1;
                if self.expecting == 0 {
                    self.request_complete();
                }
                continue;
            }
            if b == b'\n' {
                let line = String::from_utf8_lossy(&self.line).trim().to_string();
                self.line.clear();
                if !line.is_empty() {
                    self.command(&line);
                }
            } else {
                self.line.push(b);
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.outbox.len());
        for (slot, b) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *slot = b;
        }
        n
    }
}
