//! Fuzz target for decoding wire messages
//!
//! Decrypted frame payloads come from the peer; decoding must only ever
//! return Ok or Err.

#![no_main]

use ferry_transport::WireMessage;
use ferry_transport::message::{ControlMessage, from_bytes};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = from_bytes::<WireMessage>(data);
    let _ = from_bytes::<ControlMessage>(data);
});
