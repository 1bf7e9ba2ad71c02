//! GPIO / peripheral pin assignments for the chamber controller board.
//!
//! Single source of truth for the firmware binary; the library drivers are
//! generic over `embedded-hal` pins and never see a pin number.

// ---------------------------------------------------------------------------
// Temperature / humidity probes (DHT22, open-drain data line)
// ---------------------------------------------------------------------------

pub const DHT_PRIMARY_GPIO: i32 = 4;
/// Redundant probe; set to `None` on boards without the second socket.
pub const DHT_SECONDARY_GPIO: Option<i32> = Some(5);

// ---------------------------------------------------------------------------
// Relay bank (bit i of the actuator mask drives RELAY_GPIOS[i])
// ---------------------------------------------------------------------------

pub const RELAY_GPIOS: [i32; 4] = [16, 17, 18, 21];
/// The opto-isolated relay board switches on a LOW input.
pub const RELAY_ACTIVE_LOW: bool = true;

// ---------------------------------------------------------------------------
// Radio coprocessor (AT firmware on UART1)
// ---------------------------------------------------------------------------

pub const MODEM_TX_GPIO: i32 = 43;
pub const MODEM_RX_GPIO: i32 = 44;
pub const MODEM_BAUD: u32 = 115_200;

// ---------------------------------------------------------------------------
// SD card (SPI3)
// ---------------------------------------------------------------------------

pub const SD_SCLK_GPIO: i32 = 12;
pub const SD_MOSI_GPIO: i32 = 11;
pub const SD_MISO_GPIO: i32 = 13;
pub const SD_CS_GPIO: i32 = 10;
pub const SD_MOUNT_POINT: &str = "/sdcard";
