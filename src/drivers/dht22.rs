//! DHT22 / AM2302 temperature-humidity probe on a single open-drain line.
//!
//! The host pulls the line low to request a frame, the probe answers with
//! an 80 µs low / 80 µs high preamble and then 40 bits.  Each bit is a
//! ~50 µs low followed by a high pulse whose width encodes the value
//! (~27 µs = 0, ~70 µs = 1), so a bit is `1` when its high phase outlasts
//! its low phase.
//!
//! ```text
//!  byte 0..1  humidity ×10      (big endian)
//!  byte 2..3  temperature ×10   (bit 15 = sign)
//!  byte 4     checksum = low byte of the sum of bytes 0..3
//! ```
//!
//! Pulse widths are measured by polling with 1 µs delays.  The probe must
//! not be read more than once every two seconds.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::sensors::{Probe, Reading};

/// Poll iterations before a phase is declared stuck.
const PHASE_TIMEOUT: u32 = 200;
const START_LOW_US: u32 = 1_100;
const RELEASE_US: u32 = 40;

/// One DHT22 on a bidirectional pin.
pub struct Dht22<P, D> {
    pin: P,
    delay: D,
}

impl<P, D> Dht22<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    pub fn new(mut pin: P, delay: D) -> Self {
        // idle high
        let _ = pin.set_high();
        Self { pin, delay }
    }

    fn read_frame(&mut self) -> Option<[u8; 5]> {
        self.pin.set_low().ok()?;
        self.delay.delay_us(START_LOW_US);
        self.pin.set_high().ok()?;
        self.delay.delay_us(RELEASE_US);

        // preamble
        self.wait_while(false)?;
        self.wait_while(true)?;

        let mut frame = [0u8; 5];
        for bit in 0..40 {
            let low = self.wait_while(false)?;
            let high = self.wait_while(true)?;
            if high > low {
                frame[bit / 8] |= 0x80 >> (bit % 8);
            }
        }
        Some(frame)
    }

    /// Poll until the line leaves `level`; returns the number of polls.
    fn wait_while(&mut self, level: bool) -> Option<u32> {
        let mut count = 0;
        while self.pin.is_high().ok()? == level {
            count += 1;
            if count >= PHASE_TIMEOUT {
                return None;
            }
            self.delay.delay_us(1);
        }
        Some(count)
    }
}

impl<P, D> Probe for Dht22<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    fn read(&mut self) -> Option<Reading> {
        let frame = self.read_frame();
        let _ = self.pin.set_high();
        decode_frame(frame?)
    }
}

/// Validate the checksum and unpack a 5-byte frame.
pub fn decode_frame(frame: [u8; 5]) -> Option<Reading> {
    let sum = frame[..4].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum != frame[4] {
        return None;
    }
    let humidity = i16::from_be_bytes([frame[0], frame[1]]);
    let magnitude = i16::from_be_bytes([frame[2] & 0x7F, frame[3]]);
    let temp = if frame[2] & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    };
    Some(Reading { temp, humidity })
}
