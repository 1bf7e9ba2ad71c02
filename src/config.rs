//! System configuration parameters
//!
//! Thermostat dwell times and cloud credentials.  Defaults are compiled in,
//! a persisted blob may replace them, and a `KEY=VALUE` override document on
//! the removable medium is layered on top (see
//! [`ConfigStore`](crate::adapters::config_store::ConfigStore)).

use heapless::String;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::ConfigValidationError;
use crate::text::bounded;

pub const MIN_DWELL_SECS: u16 = 1;
pub const MAX_DWELL_SECS: u16 = 600;
pub const MAX_HEATER_BIT: u8 = 3;
pub const MAX_SAFETY_ON_SECS: u16 = 3600;

/// Bit used when a stored heater index is out of range.
pub const FALLBACK_HEATER_BIT: u8 = 2;

pub const SSID_MAX: usize = 32;
pub const PASSPHRASE_MAX: usize = 64;
pub const HOST_MAX: usize = 64;
pub const PATH_MAX: usize = 40;
pub const TOKEN_MAX: usize = 64;
pub const DEVICE_ID_MAX: usize = 24;

// ---------------------------------------------------------------------------
// Thermostat
// ---------------------------------------------------------------------------

/// Thermostat dwell and safety configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThermoConfig {
    /// Minimum time the heater stays on once switched on (seconds)
    pub min_on_secs: u16,
    /// Minimum time the heater stays off once switched off (seconds)
    pub min_off_secs: u16,
    /// Which bit of the 4-bit actuator mask drives the heater (0-3)
    pub heater_bit: u8,
    /// Reserved mode selector; the per-step band decides the control policy
    pub mode: u8,
    /// Continuous on-time after which the heater is forced off (0 = disabled)
    pub safety_max_on_secs: u16,
}

impl Default for ThermoConfig {
    fn default() -> Self {
        Self {
            min_on_secs: 10,
            min_off_secs: 10,
            heater_bit: 2,
            mode: 0,
            safety_max_on_secs: 180,
        }
    }
}

impl ThermoConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(MIN_DWELL_SECS..=MAX_DWELL_SECS).contains(&self.min_on_secs) {
            return Err(ConfigValidationError::MinOnOutOfRange);
        }
        if !(MIN_DWELL_SECS..=MAX_DWELL_SECS).contains(&self.min_off_secs) {
            return Err(ConfigValidationError::MinOffOutOfRange);
        }
        if self.heater_bit > MAX_HEATER_BIT {
            return Err(ConfigValidationError::HeaterBitOutOfRange);
        }
        if self.safety_max_on_secs > MAX_SAFETY_ON_SECS {
            return Err(ConfigValidationError::SafetyMaxOutOfRange);
        }
        Ok(())
    }

    /// Mask selecting the heater output.
    pub fn heater_mask(&self) -> u8 {
        let bit = if self.heater_bit > MAX_HEATER_BIT {
            FALLBACK_HEATER_BIT
        } else {
            self.heater_bit
        };
        1 << bit
    }
}

// ---------------------------------------------------------------------------
// Cloud
// ---------------------------------------------------------------------------

/// Network and upload credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudConfig {
    pub enabled: bool,
    pub ssid: String<SSID_MAX>,
    pub passphrase: String<PASSPHRASE_MAX>,
    pub api_host: String<HOST_MAX>,
    pub api_path: String<PATH_MAX>,
    pub api_token: String<TOKEN_MAX>,
    pub device_id: String<DEVICE_ID_MAX>,
}

impl Default for CloudConfig {
    fn default() -> Self {
        let mut device_id = String::new();
        let _ = device_id.push_str("MEGA001");
        let mut api_path = String::new();
        let _ = api_path.push_str("/v1");
        Self {
            enabled: false,
            ssid: String::new(),
            passphrase: String::new(),
            api_host: String::new(),
            api_path,
            api_token: String::new(),
            device_id,
        }
    }
}

impl CloudConfig {
    /// Every field the bring-up and upload path needs is present.
    pub fn check_complete(&self) -> Result<(), ConfigValidationError> {
        if self.ssid.is_empty() {
            return Err(ConfigValidationError::MissingSsid);
        }
        if self.api_host.is_empty() {
            return Err(ConfigValidationError::MissingHost);
        }
        if self.api_path.is_empty() {
            return Err(ConfigValidationError::MissingPath);
        }
        if self.api_token.is_empty() {
            return Err(ConfigValidationError::MissingToken);
        }
        Ok(())
    }

    /// Sync is enabled and fully configured.
    pub fn is_usable(&self) -> bool {
        self.enabled && self.check_complete().is_ok()
    }
}

// ---------------------------------------------------------------------------
// SystemConfig
// ---------------------------------------------------------------------------

/// Core system configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub thermo: ThermoConfig,
    pub cloud: CloudConfig,
}

/// Range-check everything.  An enabled cloud section must be complete.
pub fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigValidationError> {
    cfg.thermo.validate()?;
    if cfg.cloud.enabled {
        cfg.cloud.check_complete()?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// KEY=VALUE overrides
// ---------------------------------------------------------------------------

/// Tally of one override document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverrideReport {
    pub applied: u8,
    pub rejected: u8,
    pub unknown: u8,
}

/// Apply one override.  Returns `Ok(false)` for keys this firmware does not
/// know.  On error `cfg` is left untouched.
pub fn apply_override(
    cfg: &mut SystemConfig,
    key: &str,
    value: &str,
) -> Result<bool, ConfigValidationError> {
    let key = key.trim();
    let value = value.trim();
    let mut thermo = cfg.thermo;

    if key.eq_ignore_ascii_case("THERMO_MIN_ON_S") {
        thermo.min_on_secs = parse_num(value, "THERMO_MIN_ON_S")?;
    } else if key.eq_ignore_ascii_case("THERMO_MIN_OFF_S") {
        thermo.min_off_secs = parse_num(value, "THERMO_MIN_OFF_S")?;
    } else if key.eq_ignore_ascii_case("THERMO_TOGGLE_S") {
        let secs = parse_num(value, "THERMO_TOGGLE_S")?;
        thermo.min_on_secs = secs;
        thermo.min_off_secs = secs;
    } else if key.eq_ignore_ascii_case("THERMO_HEATER_BIT") {
        thermo.heater_bit = parse_num(value, "THERMO_HEATER_BIT")?;
    } else if key.eq_ignore_ascii_case("THERMO_SAFETY_MAX_ON_S") {
        thermo.safety_max_on_secs = parse_num(value, "THERMO_SAFETY_MAX_ON_S")?;
    } else {
        return apply_cloud_override(&mut cfg.cloud, key, value);
    }

    thermo.validate()?;
    cfg.thermo = thermo;
    Ok(true)
}

fn apply_cloud_override(
    cloud: &mut CloudConfig,
    key: &str,
    value: &str,
) -> Result<bool, ConfigValidationError> {
    if key.eq_ignore_ascii_case("WIFI_ENABLE") {
        cloud.enabled = parse_flag(value);
    } else if key.eq_ignore_ascii_case("WIFI_SSID") {
        cloud.ssid = text_field(value, "WIFI_SSID")?;
    } else if key.eq_ignore_ascii_case("WIFI_PASS") {
        cloud.passphrase = text_field(value, "WIFI_PASS")?;
    } else if key.eq_ignore_ascii_case("API_HOST") {
        cloud.api_host = text_field(value, "API_HOST")?;
    } else if key.eq_ignore_ascii_case("API_PATH") {
        cloud.api_path = text_field(value, "API_PATH")?;
    } else if key.eq_ignore_ascii_case("API_TOKEN") {
        cloud.api_token = text_field(value, "API_TOKEN")?;
    } else if key.eq_ignore_ascii_case("DEVICE_ID") {
        cloud.device_id = text_field(value, "DEVICE_ID")?;
    } else {
        return Ok(false);
    }
    Ok(true)
}

/// Apply a whole override document (`#` comments, blank lines ignored).
///
/// Each line is applied independently: a rejected value keeps the previous
/// one and the rest of the document still applies.  An enabled but
/// incomplete cloud section is switched off afterwards.
pub fn apply_overrides(cfg: &mut SystemConfig, document: &str) -> OverrideReport {
    let mut report = OverrideReport::default();
    for raw in document.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            report.unknown = report.unknown.saturating_add(1);
            continue;
        };
        match apply_override(cfg, key, value) {
            Ok(true) => report.applied = report.applied.saturating_add(1),
            Ok(false) => {
                warn!("config: unknown override key '{}'", key.trim());
                report.unknown = report.unknown.saturating_add(1);
            }
            Err(e) => {
                warn!("config: override '{}' rejected: {}", key.trim(), e);
                report.rejected = report.rejected.saturating_add(1);
            }
        }
    }

    if cfg.cloud.enabled {
        if let Err(e) = cfg.cloud.check_complete() {
            warn!("config: cloud sync disabled ({})", e);
            cfg.cloud.enabled = false;
        }
    }
    info!(
        "config: overrides applied={} rejected={} unknown={}",
        report.applied, report.rejected, report.unknown
    );
    report
}

fn parse_num<T: core::str::FromStr>(
    value: &str,
    field: &'static str,
) -> Result<T, ConfigValidationError> {
    value
        .parse()
        .map_err(|_| ConfigValidationError::NotANumber(field))
}

fn parse_flag(value: &str) -> bool {
    ["1", "true", "yes", "on"]
        .iter()
        .any(|t| value.eq_ignore_ascii_case(t))
        || value.parse::<u32>().is_ok_and(|n| n != 0)
}

fn text_field<const N: usize>(
    value: &str,
    field: &'static str,
) -> Result<String<N>, ConfigValidationError> {
    bounded(value).ok_or(ConfigValidationError::ValueTooLong(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = SystemConfig::default();
        assert!(validate_config(&c).is_ok());
        assert_eq!(c.thermo.min_on_secs, 10);
        assert_eq!(c.thermo.heater_bit, 2);
        assert_eq!(c.thermo.safety_max_on_secs, 180);
        assert!(!c.cloud.enabled);
        assert_eq!(c.cloud.device_id.as_str(), "MEGA001");
        assert_eq!(c.cloud.api_path.as_str(), "/v1");
    }

    #[test]
    fn thermo_ranges_enforced() {
        let mut t = ThermoConfig::default();
        t.min_on_secs = 0;
        assert_eq!(t.validate(), Err(ConfigValidationError::MinOnOutOfRange));
        t.min_on_secs = 601;
        assert_eq!(t.validate(), Err(ConfigValidationError::MinOnOutOfRange));
        t = ThermoConfig::default();
        t.heater_bit = 4;
        assert_eq!(t.validate(), Err(ConfigValidationError::HeaterBitOutOfRange));
        t = ThermoConfig::default();
        t.safety_max_on_secs = 3601;
        assert_eq!(t.validate(), Err(ConfigValidationError::SafetyMaxOutOfRange));
        t.safety_max_on_secs = 0;
        assert!(t.validate().is_ok());
    }

    #[test]
    fn heater_mask_falls_back_for_bad_bit() {
        let mut t = ThermoConfig::default();
        t.heater_bit = 0;
        assert_eq!(t.heater_mask(), 0b0001);
        t.heater_bit = 7;
        assert_eq!(t.heater_mask(), 0b0100);
    }

    #[test]
    fn enabled_cloud_must_be_complete() {
        let mut c = SystemConfig::default();
        c.cloud.enabled = true;
        assert_eq!(validate_config(&c), Err(ConfigValidationError::MissingSsid));
        c.cloud.ssid = bounded("lab").unwrap();
        c.cloud.api_host = bounded("api.example.org").unwrap();
        assert_eq!(validate_config(&c), Err(ConfigValidationError::MissingToken));
        c.cloud.api_token = bounded("secret").unwrap();
        assert!(validate_config(&c).is_ok());
        assert!(c.cloud.is_usable());
    }

    #[test]
    fn toggle_sets_both_dwell_times() {
        let mut c = SystemConfig::default();
        assert_eq!(apply_override(&mut c, "thermo_toggle_s", " 30 "), Ok(true));
        assert_eq!(c.thermo.min_on_secs, 30);
        assert_eq!(c.thermo.min_off_secs, 30);
    }

    #[test]
    fn out_of_range_override_keeps_previous_value() {
        let mut c = SystemConfig::default();
        assert_eq!(
            apply_override(&mut c, "THERMO_MIN_ON_S", "900"),
            Err(ConfigValidationError::MinOnOutOfRange)
        );
        assert_eq!(c.thermo.min_on_secs, 10);
        assert_eq!(
            apply_override(&mut c, "THERMO_HEATER_BIT", "x"),
            Err(ConfigValidationError::NotANumber("THERMO_HEATER_BIT"))
        );
        assert_eq!(c.thermo.heater_bit, 2);
    }

    #[test]
    fn override_document_applies_line_by_line() {
        let mut c = SystemConfig::default();
        let doc = "# lab chamber\n\
                   WIFI_ENABLE=1\n\
                   WIFI_SSID=lab-net\n\
                   WIFI_PASS=hunter22\n\
                   API_HOST=ingest.example.org\n\
                   API_TOKEN=abc123\n\
                   THERMO_SAFETY_MAX_ON_S=99999\n\
                   COLOUR=blue\n\
                   \n\
                   DEVICE_ID=CH02\n";
        let report = apply_overrides(&mut c, doc);
        assert_eq!(report.applied, 6);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.unknown, 1);
        assert!(c.cloud.is_usable());
        assert_eq!(c.cloud.device_id.as_str(), "CH02");
        assert_eq!(c.thermo.safety_max_on_secs, 180);
    }

    #[test]
    fn incomplete_cloud_overrides_disable_sync() {
        let mut c = SystemConfig::default();
        apply_overrides(&mut c, "WIFI_ENABLE=yes\nWIFI_SSID=lab\n");
        assert!(!c.cloud.enabled);
        assert_eq!(c.cloud.ssid.as_str(), "lab");
    }

    #[test]
    fn overlong_text_rejected() {
        let mut c = SystemConfig::default();
        let long = "x".repeat(SSID_MAX + 1);
        assert_eq!(
            apply_override(&mut c, "WIFI_SSID", &long),
            Err(ConfigValidationError::ValueTooLong("WIFI_SSID"))
        );
        assert!(c.cloud.ssid.is_empty());
    }

    #[test]
    fn config_survives_postcard_round_trip() {
        let mut c = SystemConfig::default();
        c.thermo.min_off_secs = 42;
        c.cloud.api_token = bounded("tok").unwrap();
        let bytes = postcard::to_allocvec(&c).unwrap();
        let back: SystemConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back, c);
    }
}
