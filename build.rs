fn main() {
    // ESP-IDF link arguments only matter for the firmware image; host
    // builds (tests, fuzzing) run without the toolchain environment.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
