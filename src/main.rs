//! Chamber controller firmware: main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                    │
//! │                                                              │
//! │  HardwareAdapter    FsStorage     UartModem    SystemClock   │
//! │  (DHT22 + relays)   (/sdcard)     (UART1 AT)   (ClockPort)   │
//! │  LogEventSink       ConfigStore   console                    │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ──────────────────     │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │          ControllerService (pure logic)                │  │
//! │  │  Run · Thermostat · Telemetry · CloudSync              │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                                                              │
//! │  50 ms cooperative loop: tick → console → config auto-save   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

mod pins;

// ── Imports ───────────────────────────────────────────────────
use anyhow::Result;
use log::{info, warn};

use esp_idf_svc::fs::fatfs::Fatfs;
use esp_idf_svc::hal::delay::{Ets, FreeRtos};
use esp_idf_svc::hal::gpio::{AnyIOPin, AnyOutputPin, PinDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::sd::{spi::SdSpiHostDriver, SdCardConfiguration, SdCardDriver};
use esp_idf_svc::hal::spi::{config::DriverConfig, Dma, SpiDriver};
use esp_idf_svc::hal::uart::{config::Config as UartConfig, UartDriver};
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::io::vfs::MountedFatfs;

use chamber::adapters::config_store::ConfigStore;
use chamber::adapters::console::{parse_line, resolve, spawn_stdin_reader};
use chamber::adapters::fs_storage::FsStorage;
use chamber::adapters::hardware::HardwareAdapter;
use chamber::adapters::log_sink::LogEventSink;
use chamber::adapters::modem::UartModem;
use chamber::adapters::time::SystemClock;
use chamber::app::ports::ConfigPort;
use chamber::app::service::{ControllerService, Io};
use chamber::config::SystemConfig;
use chamber::drivers::dht22::Dht22;
use chamber::drivers::relay::RelayBank;
use chamber::sensors::SensorHub;

const LOOP_PERIOD_MS: u32 = 50;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Chamber v{}                         ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;

    // ── 2. SD card on SPI3, mounted into the VFS ──────────────
    let spi = SpiDriver::new(
        peripherals.spi3,
        unsafe { AnyOutputPin::new(pins::SD_SCLK_GPIO) },
        unsafe { AnyOutputPin::new(pins::SD_MOSI_GPIO) },
        Some(unsafe { AnyIOPin::new(pins::SD_MISO_GPIO) }),
        &DriverConfig::default().dma(Dma::Auto(4096)),
    )?;
    let sd = SdCardDriver::new_spi(
        SdSpiHostDriver::new(
            spi,
            Some(unsafe { AnyOutputPin::new(pins::SD_CS_GPIO) }),
            AnyIOPin::none(),
            AnyIOPin::none(),
            AnyIOPin::none(),
            None,
        )?,
        &SdCardConfiguration::new(),
    )?;
    // A missing card is not fatal: storage health keeps re-probing.
    let _mounted = match Fatfs::new_sdcard(0, sd)
        .and_then(|fatfs| MountedFatfs::mount(fatfs, pins::SD_MOUNT_POINT, 4))
    {
        Ok(m) => Some(m),
        Err(e) => {
            warn!("SD mount failed ({}), running without storage", e);
            None
        }
    };
    let mut fs = FsStorage::new(pins::SD_MOUNT_POINT);

    // ── 3. Load config from the card (or defaults) ────────────
    let config = match ConfigStore::new(&mut fs).load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };

    // ── 4. Construct adapters ─────────────────────────────────
    let primary = Dht22::new(
        PinDriver::input_output_od(unsafe { AnyIOPin::new(pins::DHT_PRIMARY_GPIO) })?,
        Ets,
    );
    let secondary = match pins::DHT_SECONDARY_GPIO {
        Some(gpio) => Some(Dht22::new(
            PinDriver::input_output_od(unsafe { AnyIOPin::new(gpio) })?,
            Ets,
        )),
        None => None,
    };
    let relays = RelayBank::new(
        [
            PinDriver::output(unsafe { AnyOutputPin::new(pins::RELAY_GPIOS[0]) })?,
            PinDriver::output(unsafe { AnyOutputPin::new(pins::RELAY_GPIOS[1]) })?,
            PinDriver::output(unsafe { AnyOutputPin::new(pins::RELAY_GPIOS[2]) })?,
            PinDriver::output(unsafe { AnyOutputPin::new(pins::RELAY_GPIOS[3]) })?,
        ],
        pins::RELAY_ACTIVE_LOW,
    );
    let mut hw = HardwareAdapter::new(SensorHub::new(primary, secondary, Ets), relays);

    let uart = UartDriver::new(
        peripherals.uart1,
        unsafe { AnyOutputPin::new(pins::MODEM_TX_GPIO) },
        unsafe { AnyIOPin::new(pins::MODEM_RX_GPIO) },
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &UartConfig::new().baudrate(Hertz(pins::MODEM_BAUD)),
    )?;
    let mut modem = UartModem::new(uart);

    let clock = SystemClock::new();
    let mut sink = LogEventSink::new();
    let console = spawn_stdin_reader()?;

    // ── 5. Construct the controller service ───────────────────
    let mut app = ControllerService::new(config);
    app.start(&mut sink);

    info!("System ready. Entering control loop.");

    // ── 6. Control loop ───────────────────────────────────────
    loop {
        let now = clock.uptime_ms();
        let mut io = Io {
            hw: &mut hw,
            fs: &mut fs,
            modem: &mut modem,
            clock: &clock,
        };
        app.tick(now, &mut io, &mut sink);

        while let Ok(line) = console.try_recv() {
            let request = match parse_line(&line) {
                Ok(r) => r,
                Err(e) => {
                    warn!("console: {} ({})", e, line.trim());
                    continue;
                }
            };
            match resolve(request, &mut *io.fs, app.config()) {
                Ok(cmd) => app.handle_command(now, cmd, &mut io, &mut sink),
                Err(e) => warn!("console: {}", e),
            }
        }

        // Config auto-save (5 s debounce after the last change).
        app.auto_save_if_needed(now, &mut ConfigStore::new(&mut fs), &mut sink);

        FreeRtos::delay_ms(LOOP_PERIOD_MS);
    }
}
