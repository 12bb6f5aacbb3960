//! Noise_NN handshake protocol.
//!
//! Both peers use ephemeral keys only. The handshake gives forward-secret
//! transport encryption but no authentication; peers confirm each other out
//! of band by comparing the short verification code derived from the
//! handshake hash.
//!
//! Message flow:
//!
//! ```text
//! initiator -> e
//! responder <- e, ee
//! ```

use snow::params::NoiseParams;
use snow::{Builder, HandshakeState, TransportState};

use crate::CryptoError;

/// Noise protocol name.
pub const NOISE_PATTERN: &str = "Noise_NN_25519_ChaChaPoly_BLAKE2s";

/// Maximum size of a single Noise message (ciphertext).
pub const MAX_NOISE_MESSAGE: usize = 65535;

/// AEAD tag appended to every transport message.
pub const TAG_SIZE: usize = 16;

/// Largest plaintext that fits into one transport message.
pub const MAX_PLAINTEXT: usize = MAX_NOISE_MESSAGE - TAG_SIZE;

/// Which side of the handshake this peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRole {
    /// Sends the first handshake message
    Initiator,
    /// Answers the first handshake message
    Responder,
}

/// In-progress Noise_NN handshake
pub struct NoiseHandshake {
    state: HandshakeState,
    role: HandshakeRole,
}

impl NoiseHandshake {
    /// Create a new handshake as the initiator
    pub fn new_initiator() -> Result<Self, CryptoError> {
        Ok(Self {
            state: builder()?.build_initiator()?,
            role: HandshakeRole::Initiator,
        })
    }

    /// Create a new handshake as the responder
    pub fn new_responder() -> Result<Self, CryptoError> {
        Ok(Self {
            state: builder()?.build_responder()?,
            role: HandshakeRole::Responder,
        })
    }

    /// Role this handshake was created with
    #[must_use]
    pub fn role(&self) -> HandshakeRole {
        self.role
    }

    /// Produce the next outgoing handshake message
    pub fn write_message(&mut self) -> Result<Vec<u8>, CryptoError> {
        if !self.state.is_my_turn() {
            return Err(CryptoError::InvalidState);
        }
        let mut buf = vec![0u8; MAX_NOISE_MESSAGE];
        let len = self.state.write_message(&[], &mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Consume an incoming handshake message
    pub fn read_message(&mut self, message: &[u8]) -> Result<(), CryptoError> {
        if self.state.is_my_turn() {
            return Err(CryptoError::InvalidState);
        }
        let mut buf = vec![0u8; MAX_NOISE_MESSAGE];
        self.state.read_message(message, &mut buf)?;
        Ok(())
    }

    /// Whether both handshake messages have been exchanged
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.is_handshake_finished()
    }

    /// Complete handshake and switch to transport mode
    pub fn into_transport(self) -> Result<NoiseTransport, CryptoError> {
        if !self.state.is_handshake_finished() {
            return Err(CryptoError::InvalidState);
        }
        let code = verification_code(self.state.get_handshake_hash());
        let state = self.state.into_transport_mode()?;
        Ok(NoiseTransport {
            state,
            verification_code: code,
        })
    }
}

/// Established Noise transport
pub struct NoiseTransport {
    state: TransportState,
    verification_code: String,
}

impl NoiseTransport {
    /// Encrypt one message
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if plaintext.len() > MAX_PLAINTEXT {
            return Err(CryptoError::MessageTooLarge {
                size: plaintext.len(),
                max: MAX_PLAINTEXT,
            });
        }
        let mut buf = vec![0u8; plaintext.len() + TAG_SIZE];
        let len = self
            .state
            .write_message(plaintext, &mut buf)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Decrypt one message
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut buf = vec![0u8; ciphertext.len()];
        let len = self
            .state
            .read_message(ciphertext, &mut buf)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Short code both peers can compare to detect an interposed party
    #[must_use]
    pub fn verification_code(&self) -> &str {
        &self.verification_code
    }
}

impl std::fmt::Debug for NoiseTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseTransport")
            .field("verification_code", &self.verification_code)
            .finish_non_exhaustive()
    }
}

fn builder() -> Result<Builder<'static>, CryptoError> {
    let params: NoiseParams = NOISE_PATTERN.parse()?;
    Ok(Builder::new(params))
}

/// Format the first four bytes of a handshake hash as `xxxx-xxxx`.
#[must_use]
pub fn verification_code(handshake_hash: &[u8]) -> String {
    let a = hex::encode(&handshake_hash[..2]);
    let b = hex::encode(&handshake_hash[2..4]);
    format!("{a}-{b}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_pair() -> (NoiseTransport, NoiseTransport) {
        let mut initiator = NoiseHandshake::new_initiator().unwrap();
        let mut responder = NoiseHandshake::new_responder().unwrap();

        let m1 = initiator.write_message().unwrap();
        responder.read_message(&m1).unwrap();
        let m2 = responder.write_message().unwrap();
        initiator.read_message(&m2).unwrap();

        assert!(initiator.is_finished());
        assert!(responder.is_finished());

        (
            initiator.into_transport().unwrap(),
            responder.into_transport().unwrap(),
        )
    }

    #[test]
    fn test_handshake_verification_codes_match() {
        let (a, b) = complete_pair();
        assert_eq!(a.verification_code(), b.verification_code());
        assert_eq!(a.verification_code().len(), 9);
        assert_eq!(&a.verification_code()[4..5], "-");
    }

    #[test]
    fn test_separate_handshakes_differ() {
        let (a, _) = complete_pair();
        let (c, _) = complete_pair();
        assert_ne!(a.verification_code(), c.verification_code());
    }

    #[test]
    fn test_encrypt_decrypt_both_directions() {
        let (mut a, mut b) = complete_pair();

        let ct = a.encrypt(b"hello responder").unwrap();
        assert_eq!(ct.len(), 15 + TAG_SIZE);
        assert_eq!(b.decrypt(&ct).unwrap(), b"hello responder");

        let ct = b.encrypt(b"hello initiator").unwrap();
        assert_eq!(a.decrypt(&ct).unwrap(), b"hello initiator");
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let (mut a, mut b) = complete_pair();
        let mut ct = a.encrypt(b"payload").unwrap();
        ct[0] ^= 0x01;
        assert!(matches!(b.decrypt(&ct), Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_oversized_plaintext_rejected() {
        let (mut a, _) = complete_pair();
        let big = vec![0u8; MAX_PLAINTEXT + 1];
        assert!(matches!(
            a.encrypt(&big),
            Err(CryptoError::MessageTooLarge { .. })
        ));
        assert!(a.encrypt(&big[..MAX_PLAINTEXT]).is_ok());
    }

    #[test]
    fn test_out_of_turn_rejected() {
        let mut responder = NoiseHandshake::new_responder().unwrap();
        assert!(matches!(
            responder.write_message(),
            Err(CryptoError::InvalidState)
        ));

        let initiator = NoiseHandshake::new_initiator().unwrap();
        assert!(matches!(
            initiator.into_transport(),
            Err(CryptoError::InvalidState)
        ));
    }

    #[test]
    fn test_verification_code_format() {
        let hash = [0xab, 0xcd, 0x01, 0x02, 0xff];
        assert_eq!(verification_code(&hash), "abcd-0102");
    }
}
