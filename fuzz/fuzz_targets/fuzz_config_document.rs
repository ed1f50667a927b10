//! Fuzz target: parsing of the YAML configuration document.
//!
//! Any document that parses must answer every lookup without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use scriptgate_core::Configuration;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = Configuration::from_yaml_str(raw) {
        let _ = config.get("api_port");
        let _ = config.require("cors_allowed_domains");
    }
});
