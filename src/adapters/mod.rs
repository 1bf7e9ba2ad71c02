//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                  |
//! |----------------|--------------------|------------------------------|
//! | `config_store` | ConfigPort         | `CONFIG.BIN` + `CONFIG.CSV`  |
//! | `console`      | (AppCommand source)| Serial console / stdin      |
//! | `fs_storage`   | FileStore          | SD card mount / host dir     |
//! | `hardware`     | SensorPort         | DHT22 probes                 |
//! |                | ActuatorPort       | Relay bank GPIO              |
//! | `log_sink`     | EventSink          | Serial log output            |
//! | `modem`        | ModemPort          | AT coprocessor UART / sim    |
//! | `time`         | ClockPort          | ESP32 system timer / RTC     |

pub mod config_store;
pub mod console;
pub mod fs_storage;
pub mod hardware;
pub mod log_sink;
pub mod modem;
pub mod time;
