//! Ticket codec.
//!
//! A ticket is `ferry:` followed by URL-safe unpadded base64 of
//! `checksum(4) || json`. The checksum is the first four bytes of the BLAKE3
//! hash of the JSON body, so a mistyped or truncated ticket is caught before
//! any field is trusted.
//!
//! ```text
//! ferry:<base64url( blake3(json)[..4] ++ {"v":1,"node":..,"session":..,"addrs":[..],..} )>
//! ```

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ferry_crypto::hash::{CHECKSUM_SIZE, checksum};
use ferry_files::FileMetadata;
use ferry_files::hasher::digest_from_hex;
use ferry_files::naming::sanitize_file_name;
use ferry_transport::{ConnectTarget, NodeId, SessionId};
use serde::{Deserialize, Serialize};

use crate::error::TicketError;

/// Ticket prefix, matched case-insensitively
pub const TICKET_PREFIX: &str = "ferry:";

/// Ticket body format version
pub const TICKET_VERSION: u32 = 1;

/// File a sender offers, carried in send tickets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    /// File name
    pub name: String,
    /// File size in bytes
    pub size: u64,
    /// BLAKE3 digest of the file
    pub digest: [u8; 32],
}

impl From<&FileMetadata> for TransferDescriptor {
    fn from(meta: &FileMetadata) -> Self {
        Self {
            name: meta.name.clone(),
            size: meta.size,
            digest: meta.digest,
        }
    }
}

/// Decoded ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    /// Listener identity
    pub node: NodeId,
    /// Session commitment
    pub session: SessionId,
    /// Direct `host:port` candidates
    pub addrs: Vec<String>,
    /// Relay the listener registered with
    pub relay: Option<String>,
    /// Offered file, for tickets minted by a waiting sender
    pub descriptor: Option<TransferDescriptor>,
}

#[derive(Serialize, Deserialize)]
struct TicketBody {
    v: u32,
    node: String,
    session: String,
    #[serde(default)]
    addrs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    relay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<DescriptorBody>,
}

#[derive(Serialize, Deserialize)]
struct DescriptorBody {
    name: String,
    size: u64,
    digest: String,
}

/// Whether `s` looks like a ticket rather than a plain address
pub fn is_ticket(s: &str) -> bool {
    strip_prefix(s.trim()).is_some()
}

fn strip_prefix(s: &str) -> Option<&str> {
    let head = s.get(..TICKET_PREFIX.len())?;
    head.eq_ignore_ascii_case(TICKET_PREFIX)
        .then(|| &s[TICKET_PREFIX.len()..])
}

fn malformed(msg: &'static str) -> TicketError {
    TicketError::Malformed(Cow::Borrowed(msg))
}

impl Ticket {
    /// Encode into the textual ticket form
    pub fn encode(&self) -> String {
        let body = TicketBody {
            v: TICKET_VERSION,
            node: self.node.to_hex(),
            session: self.session.to_hex(),
            addrs: self.addrs.clone(),
            relay: self.relay.clone(),
            file: self.descriptor.as_ref().map(|d| DescriptorBody {
                name: d.name.clone(),
                size: d.size,
                digest: hex::encode(d.digest),
            }),
        };
        // Serializing plain strings and integers cannot fail
        let json = serde_json::to_vec(&body).unwrap_or_default();

        let mut raw = Vec::with_capacity(CHECKSUM_SIZE + json.len());
        raw.extend_from_slice(&checksum(&json));
        raw.extend_from_slice(&json);
        format!("{TICKET_PREFIX}{}", URL_SAFE_NO_PAD.encode(raw))
    }

    /// Decode and validate a ticket. Pure; performs no I/O.
    pub fn decode(s: &str) -> Result<Self, TicketError> {
        let encoded = strip_prefix(s.trim()).ok_or(TicketError::MissingPrefix)?;
        let raw = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| TicketError::Encoding(e.to_string()))?;
        if raw.len() <= CHECKSUM_SIZE {
            return Err(TicketError::Truncated);
        }

        let (sum, json) = raw.split_at(CHECKSUM_SIZE);
        if sum != checksum(json) {
            return Err(TicketError::Checksum);
        }

        let body: TicketBody = serde_json::from_slice(json)
            .map_err(|e| TicketError::Malformed(Cow::Owned(e.to_string())))?;
        if body.v != TICKET_VERSION {
            return Err(TicketError::UnsupportedVersion(body.v));
        }

        let node = NodeId::from_hex(&body.node).ok_or_else(|| malformed("bad node id"))?;
        let session =
            SessionId::from_hex(&body.session).ok_or_else(|| malformed("bad session id"))?;

        let descriptor = body
            .file
            .map(|f| {
                let digest = digest_from_hex(&f.digest).ok_or_else(|| malformed("bad digest"))?;
                let name =
                    sanitize_file_name(&f.name).map_err(|_| malformed("unsafe file name"))?;
                Ok::<_, TicketError>(TransferDescriptor {
                    name,
                    size: f.size,
                    digest,
                })
            })
            .transpose()?;

        if body.addrs.iter().any(|a| parse_host_port(a).is_none()) {
            return Err(malformed("bad address"));
        }
        let relay = body.relay.filter(|r| !r.is_empty());
        if matches!(&relay, Some(r) if parse_host_port(r).is_none()) {
            return Err(malformed("bad relay address"));
        }
        if body.addrs.is_empty() && relay.is_none() {
            return Err(TicketError::NoAddress);
        }

        Ok(Self {
            node,
            session,
            addrs: body.addrs,
            relay,
            descriptor,
        })
    }

    /// Connection target for this ticket
    pub fn connect_target(&self) -> ConnectTarget {
        ConnectTarget {
            peer: Some(self.node),
            session: Some(self.session),
            addrs: self.addrs.clone(),
            relay: self.relay.clone(),
        }
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Ticket {
    type Err = TicketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ticket::decode(s)
    }
}

/// `host:port` with a non-empty host and a non-zero port
fn parse_host_port(s: &str) -> Option<(&str, u16)> {
    let (host, port) = s.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port: u16 = port.parse().ok()?;
    if host.is_empty() || port == 0 || host.chars().any(char::is_whitespace) {
        return None;
    }
    Some((host, port))
}

/// What a receiver connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Full ticket
    Ticket(Ticket),
    /// Plain `host:port` on the local network
    Direct(String),
}

impl Target {
    /// Parse a receive target: a ticket when it carries the prefix,
    /// otherwise `host:port`.
    pub fn parse(s: &str) -> Result<Self, TicketError> {
        let s = s.trim();
        if is_ticket(s) {
            return Ticket::decode(s).map(Target::Ticket);
        }
        match parse_host_port(s) {
            Some(_) => Ok(Target::Direct(s.to_string())),
            None => Err(TicketError::InvalidTarget(s.to_string())),
        }
    }

    /// Connection target
    pub fn connect_target(&self) -> ConnectTarget {
        match self {
            Target::Ticket(ticket) => ticket.connect_target(),
            Target::Direct(addr) => ConnectTarget::direct(addr.clone()),
        }
    }

    /// File the ticket promised, if any
    pub fn descriptor(&self) -> Option<&TransferDescriptor> {
        match self {
            Target::Ticket(ticket) => ticket.descriptor.as_ref(),
            Target::Direct(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Ticket {
        Ticket {
            node: NodeId([0x11; 32]),
            session: SessionId([0x22; 16]),
            addrs: vec!["192.168.1.20:41000".into(), "[fd00::2]:41000".into()],
            relay: Some("relay.example.org:7878".into()),
            descriptor: Some(TransferDescriptor {
                name: "report.pdf".into(),
                size: 1_048_576,
                digest: [0x33; 32],
            }),
        }
    }

    #[test]
    fn test_roundtrip() {
        let ticket = sample();
        let encoded = ticket.encode();
        assert!(encoded.starts_with("ferry:"));
        assert_eq!(Ticket::decode(&encoded).unwrap(), ticket);
    }

    #[test]
    fn test_prefix_case_and_whitespace() {
        let encoded = sample().encode();
        let shouty = format!("  FERRY:{}\n", &encoded[TICKET_PREFIX.len()..]);
        assert!(is_ticket(&shouty));
        assert_eq!(Ticket::decode(&shouty).unwrap(), sample());
    }

    #[test]
    fn test_missing_prefix() {
        assert_eq!(
            Ticket::decode("wormhole:abc"),
            Err(TicketError::MissingPrefix)
        );
        assert!(!is_ticket("192.168.1.2:9000"));
    }

    #[test]
    fn test_bad_base64() {
        assert!(matches!(
            Ticket::decode("ferry:***"),
            Err(TicketError::Encoding(_))
        ));
    }

    #[test]
    fn test_truncated() {
        assert_eq!(Ticket::decode("ferry:AAAA"), Err(TicketError::Truncated));
        assert_eq!(Ticket::decode("ferry:"), Err(TicketError::Truncated));
    }

    #[test]
    fn test_flipped_character_fails() {
        let encoded = sample().encode();
        let mut bytes = encoded.into_bytes();
        let idx = bytes.len() / 2;
        bytes[idx] = if bytes[idx] == b'A' { b'B' } else { b'A' };
        let corrupted = String::from_utf8(bytes).unwrap();
        assert!(Ticket::decode(&corrupted).is_err());
    }

    fn encode_body(json: &str) -> String {
        let mut raw = checksum(json.as_bytes()).to_vec();
        raw.extend_from_slice(json.as_bytes());
        format!("ferry:{}", URL_SAFE_NO_PAD.encode(raw))
    }

    #[test]
    fn test_field_validation() {
        let node = "11".repeat(32);
        let session = "22".repeat(16);

        let wrong_version = encode_body(&format!(
            r#"{{"v":2,"node":"{node}","session":"{session}","addrs":["1.2.3.4:5"]}}"#
        ));
        assert_eq!(
            Ticket::decode(&wrong_version),
            Err(TicketError::UnsupportedVersion(2))
        );

        let short_node = encode_body(&format!(
            r#"{{"v":1,"node":"abcd","session":"{session}","addrs":["1.2.3.4:5"]}}"#
        ));
        assert!(matches!(
            Ticket::decode(&short_node),
            Err(TicketError::Malformed(_))
        ));

        let no_addr =
            encode_body(&format!(r#"{{"v":1,"node":"{node}","session":"{session}"}}"#));
        assert_eq!(Ticket::decode(&no_addr), Err(TicketError::NoAddress));

        let unsafe_name = encode_body(&format!(
            r#"{{"v":1,"node":"{node}","session":"{session}","addrs":["1.2.3.4:5"],
                "file":{{"name":"../etc/passwd","size":1,"digest":"{}"}}}}"#,
            "00".repeat(32)
        ));
        assert!(matches!(
            Ticket::decode(&unsafe_name),
            Err(TicketError::Malformed(_))
        ));

        let relay_only = encode_body(&format!(
            r#"{{"v":1,"node":"{node}","session":"{session}","relay":"relay.example:7878"}}"#
        ));
        let ticket = Ticket::decode(&relay_only).unwrap();
        assert!(ticket.addrs.is_empty());
        assert_eq!(ticket.relay.as_deref(), Some("relay.example:7878"));
    }

    #[test]
    fn test_target_parse() {
        assert_eq!(
            Target::parse("192.168.1.2:9000").unwrap(),
            Target::Direct("192.168.1.2:9000".into())
        );
        assert_eq!(
            Target::parse("laptop.local:9000").unwrap(),
            Target::Direct("laptop.local:9000".into())
        );
        assert!(matches!(
            Target::parse("192.168.1.2:0"),
            Err(TicketError::InvalidTarget(_))
        ));
        assert!(Target::parse("192.168.1.2").is_err());
        assert!(Target::parse(":9000").is_err());
        assert!(Target::parse("host:notaport").is_err());

        let ticket = sample();
        match Target::parse(&ticket.encode()).unwrap() {
            Target::Ticket(t) => assert_eq!(t, ticket),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            Target::parse("ferry:broken"),
            Err(TicketError::Encoding(_) | TicketError::Truncated | TicketError::Checksum)
        ));
    }

    #[test]
    fn test_connect_target() {
        let target = sample().connect_target();
        assert_eq!(target.peer, Some(NodeId([0x11; 32])));
        assert_eq!(target.session, Some(SessionId([0x22; 16])));
        assert_eq!(target.addrs.len(), 2);

        let direct = Target::Direct("10.0.0.1:9000".into()).connect_target();
        assert!(direct.peer.is_none());
        assert!(direct.session.is_none());
    }

    proptest! {
        #[test]
        fn decode_never_panics(input in "\\PC{0,200}") {
            let _ = Ticket::decode(&input);
            let _ = Target::parse(&input);
        }

        #[test]
        fn decode_rejects_any_single_byte_change(idx in 0usize..64, replacement in "[A-Za-z0-9_-]") {
            let encoded = sample().encode();
            let body = &encoded[TICKET_PREFIX.len()..];
            let idx = idx % body.len();
            prop_assume!(body.as_bytes()[idx] != replacement.as_bytes()[0]);

            let mut corrupted = body.to_string();
            corrupted.replace_range(idx..idx + 1, &replacement);
            let decoded = Ticket::decode(&format!("{TICKET_PREFIX}{corrupted}"));
            prop_assert!(decoded.map(|t| t != sample()).unwrap_or(true));
        }
    }
}
