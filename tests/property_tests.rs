//! Property-based tests for Ferry
//!
//! Uses proptest to verify ticket and event queue invariants.

use proptest::prelude::*;

// ============================================================================
// Ticket Properties
// ============================================================================

mod ticket_properties {
    use super::*;
    use ferry_core::{Target, Ticket, TicketError, TransferDescriptor};
    use ferry_transport::{NodeId, SessionId};

    fn address() -> impl Strategy<Value = String> {
        prop_oneof![
            (any::<[u8; 4]>(), 1u16..).prop_map(|(ip, port)| format!(
                "{}.{}.{}.{}:{port}",
                ip[0], ip[1], ip[2], ip[3]
            )),
            ("[a-z][a-z0-9-]{0,15}(\\.[a-z]{2,6})?", 1u16..)
                .prop_map(|(host, port)| format!("{host}:{port}")),
            (any::<[u16; 8]>(), 1u16..).prop_map(|(seg, port)| {
                let ip = std::net::Ipv6Addr::new(
                    seg[0], seg[1], seg[2], seg[3], seg[4], seg[5], seg[6], seg[7],
                );
                format!("[{ip}]:{port}")
            }),
        ]
    }

    fn descriptor() -> impl Strategy<Value = TransferDescriptor> {
        (
            "[A-Za-z0-9_][A-Za-z0-9 _-]{0,40}(\\.[a-z0-9]{1,5})?",
            any::<u64>(),
            any::<[u8; 32]>(),
        )
            .prop_map(|(name, size, digest)| TransferDescriptor { name, size, digest })
    }

    fn ticket() -> impl Strategy<Value = Ticket> {
        (
            any::<[u8; 32]>(),
            any::<[u8; 16]>(),
            prop::collection::vec(address(), 0..5),
            prop::option::of(address()),
            prop::option::of(descriptor()),
        )
            .prop_filter("needs an address", |(_, _, addrs, relay, _)| {
                !addrs.is_empty() || relay.is_some()
            })
            .prop_map(|(node, session, addrs, relay, descriptor)| Ticket {
                node: NodeId(node),
                session: SessionId(session),
                addrs,
                relay,
                descriptor,
            })
    }

    proptest! {
        /// Decoding an encoded ticket yields the same ticket
        #[test]
        fn ticket_roundtrip(ticket in ticket()) {
            let encoded = ticket.encode();
            prop_assert!(encoded.starts_with("ferry:"));
            prop_assert_eq!(Ticket::decode(&encoded).unwrap(), ticket.clone());

            match Target::parse(&encoded).unwrap() {
                Target::Ticket(parsed) => prop_assert_eq!(parsed, ticket),
                Target::Direct(addr) => prop_assert!(false, "parsed as address {}", addr),
            }
        }

        /// Cutting a ticket short never decodes to anything
        #[test]
        fn truncated_ticket_rejected(ticket in ticket(), keep in 0.0f64..1.0) {
            let encoded = ticket.encode();
            let body_len = encoded.len() - "ferry:".len();
            let cut = "ferry:".len() + ((body_len as f64 * keep) as usize).min(body_len - 1);
            let result = Ticket::decode(&encoded[..cut]);
            prop_assert!(result.is_err());
        }

        /// Strings without the prefix are never tickets
        #[test]
        fn missing_prefix_rejected(s in "[a-eg-zA-EG-Z0-9][ -~]{0,100}") {
            prop_assert_eq!(Ticket::decode(&s), Err(TicketError::MissingPrefix));
        }
    }
}

// ============================================================================
// Event Queue Properties
// ============================================================================

mod queue_properties {
    use super::*;
    use ferry_core::{Event, EventPayload, EventQueue};

    #[derive(Debug, Clone)]
    enum Push {
        Progress,
        Marker,
    }

    fn pushes() -> impl Strategy<Value = Vec<Push>> {
        prop::collection::vec(
            prop_oneof![4 => Just(Push::Progress), 1 => Just(Push::Marker)],
            0..200,
        )
    }

    fn marker(n: u64) -> Event {
        Event {
            timestamp_ms: n,
            payload: EventPayload::PeerConnecting {
                target: format!("marker {n}"),
            },
        }
    }

    fn progress(n: u64) -> Event {
        Event {
            timestamp_ms: n,
            payload: EventPayload::Progress {
                bytes_transferred: n,
                total_bytes: u64::MAX,
            },
        }
    }

    proptest! {
        /// Non-progress events are never dropped nor reordered, progress
        /// never goes backwards, and only progress is sacrificed at capacity
        #[test]
        fn queue_keeps_markers_in_order(capacity in 1usize..16, pushes in pushes()) {
            let queue = EventQueue::new(capacity);
            let mut markers = Vec::new();
            for (n, push) in pushes.iter().enumerate() {
                let n = n as u64;
                match push {
                    Push::Progress => queue.push(progress(n)),
                    Push::Marker => {
                        markers.push(n);
                        queue.push(marker(n));
                    }
                }
                prop_assert!(queue.len() <= capacity.max(markers.len()));
            }

            let mut drained_markers = Vec::new();
            let mut last_progress = None;
            while let Some(event) = queue.poll() {
                match event.payload {
                    EventPayload::Progress { bytes_transferred, .. } => {
                        if let Some(prev) = last_progress {
                            prop_assert!(bytes_transferred > prev);
                        }
                        last_progress = Some(bytes_transferred);
                    }
                    _ => drained_markers.push(event.timestamp_ms),
                }
            }
            prop_assert_eq!(drained_markers, markers);
            prop_assert!(queue.is_empty());
        }

        /// Below capacity nothing is coalesced
        #[test]
        fn queue_below_capacity_is_lossless(count in 0usize..64) {
            let queue = EventQueue::new(64);
            for n in 0..count as u64 {
                queue.push(progress(n));
            }
            prop_assert_eq!(queue.len(), count);
            prop_assert_eq!(queue.coalesced(), 0);
            for n in 0..count as u64 {
                prop_assert_eq!(queue.poll().map(|e| e.timestamp_ms), Some(n));
            }
        }
    }
}
