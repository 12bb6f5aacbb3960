//! Fuzz target for ticket and receive-target parsing
//!
//! Decoding must never panic, and anything that decodes must re-encode to a
//! ticket that decodes to the same value.

#![no_main]

use ferry_core::{Target, Ticket};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(ticket) = Ticket::decode(s) {
        let again = Ticket::decode(&ticket.encode()).expect("re-encoded ticket must decode");
        assert_eq!(again, ticket);
    }
    let _ = Target::parse(s);

    // Same body behind the prefix
    let _ = Ticket::decode(&format!("ferry:{s}"));
});
