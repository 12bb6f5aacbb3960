//! Fuzz target for controller settings passed across the C ABI

#![no_main]

use ferry_core::Settings;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(settings) = Settings::from_json(s) {
            let _ = settings.into_config();
        }
    }
});
