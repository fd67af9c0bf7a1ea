//! Session identity and message authentication.
//!
//! A session pairs a client identity (uuid) with the shared HMAC key the
//! kernel was launched with. Every message's four payload frames are signed
//! with HMAC-SHA256 and the hex digest travels in the signature frame. An
//! empty key disables signing (the signature frame is empty), matching the
//! reference protocol implementation.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::wire::protocol::{Header, MsgType};

type HmacSha256 = Hmac<Sha256>;

/// Client session: identity, signing key, and username stamped into headers.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    key: String,
    username: String,
}

impl Session {
    /// Fresh session with a newly generated key, for launching a kernel.
    pub fn new() -> Self {
        Self::from_key(uuid::Uuid::new_v4().to_string())
    }

    /// Session bound to an existing kernel's key, for connecting clients.
    pub fn from_key(key: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key: key.into(),
            username: std::env::var("USER").unwrap_or_else(|_| "kernelet".to_string()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// New message header stamped with this session's identity.
    pub fn header(&self, msg_type: MsgType) -> Header {
        Header::new(msg_type, self.id.clone(), self.username.clone())
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        HmacSha256::new_from_slice(self.key.as_bytes()).expect("hmac key")
    }

    /// Hex HMAC-SHA256 over the payload frames; empty when signing is off.
    pub fn sign(&self, frames: &[&[u8]]) -> String {
        if self.key.is_empty() {
            return String::new();
        }

        let mut mac = self.mac();
        for frame in frames {
            mac.update(frame);
        }
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time verification of a received signature.
    pub fn verify(&self, signature: &str, frames: &[&[u8]]) -> bool {
        if self.key.is_empty() {
            return true;
        }

        let Ok(raw) = hex::decode(signature) else {
            return false;
        };

        let mut mac = self.mac();
        for frame in frames {
            mac.update(frame);
        }
        mac.verify_slice(&raw).is_ok()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sessions_are_unique() {
        let a = Session::new();
        let b = Session::new();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.key(), b.key());
        assert!(!a.key().is_empty());
    }

    #[test]
    fn sign_produces_hex_sha256_digest() {
        let session = Session::from_key("secret");
        let sig = session.sign(&[b"header", b"parent", b"metadata", b"content"]);
        assert_eq!(sig.len(), 64);
        assert!(sig.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_verifies_and_rejects_tampering() {
        let session = Session::from_key("secret");
        let frames: [&[u8]; 2] = [b"alpha", b"beta"];
        let sig = session.sign(&frames);

        assert!(session.verify(&sig, &frames));
        assert!(!session.verify(&sig, &[b"alpha", b"tampered"]));
        assert!(!session.verify("zz-not-hex", &frames));
    }

    #[test]
    fn different_keys_produce_different_signatures() {
        let frames: [&[u8]; 1] = [b"payload"];
        let a = Session::from_key("one").sign(&frames);
        let b = Session::from_key("two").sign(&frames);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_key_disables_signing() {
        let session = Session::from_key("");
        let frames: [&[u8]; 1] = [b"payload"];
        assert_eq!(session.sign(&frames), "");
        assert!(session.verify("", &frames));
        assert!(session.verify("anything", &frames));
    }

    #[test]
    fn header_carries_session_identity() {
        let session = Session::from_key("secret");
        let header = session.header(MsgType::ExecuteRequest);
        assert_eq!(header.session, session.id());
        assert_eq!(header.msg_type, MsgType::ExecuteRequest);
        assert!(!header.msg_id.is_empty());
    }
}
