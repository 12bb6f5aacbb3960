//! Fuzz target for relay control messages

#![no_main]

use ferry_discovery::relay::RelayMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = RelayMessage::from_bytes(data);
});
