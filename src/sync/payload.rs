//! JSON batch bodies and HTTP request heads for the upload endpoints.
//!
//! ```text
//! POST {base}/telemetry/batch   {"device_id":..,"records":[{..}]}
//! POST {base}/events/batch      {"device_id":..,"records":[{..}]}
//! ```

use core::fmt::Write as _;

use heapless::String;
use serde::{Serialize, Serializer};

use super::rows::{EventRow, TelemetryRow};
use crate::config::CloudConfig;
use crate::error::JobFault;

/// Largest serialized body.
pub const PAYLOAD_MAX: usize = 400;
/// Largest request head.
pub const HEAD_MAX: usize = 360;
pub const ENDPOINT_MAX: usize = 64;
pub const DEFAULT_API_BASE: &str = "/v1";
pub const USER_AGENT: &str = "chamber/0.3";

pub type Payload = heapless::Vec<u8, PAYLOAD_MAX>;
pub type RequestHead = String<HEAD_MAX>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Telemetry,
    Events,
}

impl BatchKind {
    fn endpoint(self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry/batch",
            Self::Events => "events/batch",
        }
    }
}

/// Status labels stamped on every telemetry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus<'a> {
    pub rtc_iso: &'a str,
    pub sd_state: &'static str,
    pub rtc_state: &'static str,
    pub run_state: &'static str,
}

/// Tenths serialized as a JSON number (`215` → `21.5`).
struct Decimal(i16);

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(f64::from(self.0) / 10.0)
    }
}

#[derive(Serialize)]
struct Body<'a, T> {
    device_id: &'a str,
    records: &'a [T],
}

#[derive(Serialize)]
struct TelemetryJson<'a> {
    run_file: &'a str,
    line_index: u32,
    rtc_iso: &'a str,
    ms: u64,
    t1: Decimal,
    u1: Decimal,
    t2: Decimal,
    u2: Decimal,
    tavg: Decimal,
    uavg: Decimal,
    mask: u8,
    step: &'a str,
    sd_state: &'a str,
    rtc_state: &'a str,
    run_state: &'a str,
}

#[derive(Serialize)]
struct EventJson<'a> {
    line_index: u32,
    rtc_iso: &'a str,
    event_type: &'a str,
    screen: &'a str,
    arg0: i16,
    arg1: i16,
    run_file: &'a str,
    current_step: u16,
}

fn bounded_json<T: Serialize>(device_id: &str, records: &[T]) -> Result<Payload, JobFault> {
    let body = serde_json::to_vec(&Body { device_id, records })
        .map_err(|_| JobFault::PayloadTooLarge)?;
    Payload::from_slice(&body).map_err(|_| JobFault::PayloadTooLarge)
}

/// Telemetry batch body.  `rtc_iso` is the current clock reading, not the
/// time the row was logged.
pub fn telemetry_payload(
    device_id: &str,
    run_file: &str,
    rows: &[TelemetryRow],
    status: &DeviceStatus<'_>,
) -> Result<Payload, JobFault> {
    let records: std::vec::Vec<TelemetryJson<'_>> = rows
        .iter()
        .map(|r| TelemetryJson {
            run_file,
            line_index: r.line_index,
            rtc_iso: status.rtc_iso,
            ms: r.ms,
            t1: Decimal(r.t1),
            u1: Decimal(r.u1),
            t2: Decimal(r.t2),
            u2: Decimal(r.u2),
            tavg: Decimal(r.tavg),
            uavg: Decimal(r.uavg),
            mask: r.mask,
            step: &r.step,
            sd_state: status.sd_state,
            rtc_state: status.rtc_state,
            run_state: status.run_state,
        })
        .collect();
    bounded_json(device_id, &records)
}

pub fn events_payload(device_id: &str, rows: &[EventRow]) -> Result<Payload, JobFault> {
    let records: std::vec::Vec<EventJson<'_>> = rows
        .iter()
        .map(|r| EventJson {
            line_index: r.line_index,
            rtc_iso: &r.rtc_iso,
            event_type: &r.event,
            screen: &r.screen,
            arg0: r.arg0,
            arg1: r.arg1,
            run_file: &r.run_file,
            current_step: r.step,
        })
        .collect();
    bounded_json(device_id, &records)
}

/// `{base}/{kind}`; an empty base falls back to [`DEFAULT_API_BASE`].
pub fn endpoint_path(base: &str, kind: BatchKind) -> Result<String<ENDPOINT_MAX>, JobFault> {
    let base = if base.is_empty() { DEFAULT_API_BASE } else { base };
    let sep = if base.ends_with('/') { "" } else { "/" };
    let mut path = String::new();
    write!(path, "{base}{sep}{}", kind.endpoint()).map_err(|_| JobFault::HeaderTooLarge)?;
    Ok(path)
}

/// HTTP/1.1 request head for a JSON POST of `content_length` bytes.
pub fn request_head(
    cfg: &CloudConfig,
    kind: BatchKind,
    content_length: usize,
) -> Result<RequestHead, JobFault> {
    let path = endpoint_path(&cfg.api_path, kind)?;
    let mut head = RequestHead::new();
    write!(
        head,
        "POST {path} HTTP/1.1\r\n\
         Host: {}\r\n\
         User-Agent: {USER_AGENT}\r\n\
         Connection: close\r\n\
         Content-Type: application/json\r\n\
         X-Device-Id: {}\r\n\
         X-Api-Token: {}\r\n\
         Content-Length: {content_length}\r\n\r\n",
        cfg.api_host, cfg.device_id, cfg.api_token
    )
    .map_err(|_| JobFault::HeaderTooLarge)?;
    Ok(head)
}
