fn main() {
    // Firmware builds pull the ESP-IDF toolchain environment; host builds
    // (tests, simulation) need nothing from the build script.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
