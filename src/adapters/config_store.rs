//! Configuration store on the removable medium.
//!
//! Implements [`ConfigPort`] on top of any [`FileStore`]:
//!
//! - `CONFIG.BIN` holds the last saved [`SystemConfig`] as a postcard blob.
//! - `CONFIG.CSV` is an optional operator-edited `KEY=VALUE` document
//!   layered on top at load time (see [`apply_overrides`]).
//!
//! Saving validates first; out-of-range values are rejected, not clamped.
//! A missing or corrupt blob falls back to defaults so the chamber still
//! boots with a blank or foreign card.

use log::{info, warn};

use crate::app::ports::{ConfigPort, FileStore};
use crate::config::{apply_overrides, validate_config, SystemConfig};
use crate::error::{Result, StorageFault};

pub const CONFIG_BLOB: &str = "CONFIG.BIN";
pub const CONFIG_OVERRIDES: &str = "CONFIG.CSV";

const MAX_BLOB_SIZE: u64 = 1024;
const MAX_OVERRIDES_SIZE: u64 = 2048;

/// Borrows the file store for the duration of one load or save.
pub struct ConfigStore<'a, F> {
    fs: &'a mut F,
}

impl<'a, F: FileStore> ConfigStore<'a, F> {
    pub fn new(fs: &'a mut F) -> Self {
        Self { fs }
    }

    fn load_blob(&mut self) -> SystemConfig {
        let bytes = match self.fs.read_to_end(CONFIG_BLOB, MAX_BLOB_SIZE) {
            Ok(bytes) => bytes,
            Err(StorageFault::NotFound) => {
                info!("ConfigStore: no stored config, using defaults");
                return SystemConfig::default();
            }
            Err(e) => {
                warn!("ConfigStore: {} unreadable ({}), using defaults", CONFIG_BLOB, e);
                return SystemConfig::default();
            }
        };
        match postcard::from_bytes::<SystemConfig>(&bytes) {
            Ok(cfg) if validate_config(&cfg).is_ok() => {
                info!("ConfigStore: loaded config ({} bytes)", bytes.len());
                cfg
            }
            Ok(_) => {
                warn!("ConfigStore: stored config out of range, using defaults");
                SystemConfig::default()
            }
            Err(_) => {
                warn!("ConfigStore: stored config corrupted, using defaults");
                SystemConfig::default()
            }
        }
    }

    fn layer_overrides(&mut self, cfg: &mut SystemConfig) {
        let bytes = match self.fs.read_to_end(CONFIG_OVERRIDES, MAX_OVERRIDES_SIZE) {
            Ok(bytes) => bytes,
            Err(StorageFault::NotFound) => return,
            Err(e) => {
                warn!("ConfigStore: {} unreadable: {}", CONFIG_OVERRIDES, e);
                return;
            }
        };
        let Ok(text) = core::str::from_utf8(&bytes) else {
            warn!("ConfigStore: {} is not text, ignored", CONFIG_OVERRIDES);
            return;
        };
        let report = apply_overrides(cfg, text);
        info!(
            "ConfigStore: overrides applied={} rejected={} unknown={}",
            report.applied, report.rejected, report.unknown
        );
    }
}

impl<F: FileStore> ConfigPort for ConfigStore<'_, F> {
    fn load(&mut self) -> Result<SystemConfig> {
        self.fs.mount()?;
        let mut cfg = self.load_blob();
        self.layer_overrides(&mut cfg);
        Ok(cfg)
    }

    fn save(&mut self, config: &SystemConfig) -> Result<()> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| StorageFault::CapacityExceeded)?;
        self.fs.write_file(CONFIG_BLOB, &bytes)?;
        info!("ConfigStore: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}
