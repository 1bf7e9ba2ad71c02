//! Peripheral drivers written against the `embedded-hal` traits.

pub mod dht22;
pub mod relay;
