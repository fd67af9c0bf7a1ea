//! Signed multipart codec for kernel messages.
//!
//! Frame layout on every channel:
//!
//! ```text
//! identities... | <IDS|MSG> | signature | header | parent_header | metadata | content | buffers...
//! ```
//!
//! The signature is the hex HMAC-SHA256 of the four payload frames and is
//! verified before any payload JSON is parsed.

use bytes::Bytes;

use crate::session::Session;
use crate::wire::protocol::{Header, Message};

/// Frame separating routing identities from the signed payload.
pub const DELIMITER: &[u8] = b"<IDS|MSG>";

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("multipart message has no <IDS|MSG> delimiter")]
    MissingDelimiter,

    #[error("multipart message truncated ({frames} frames)")]
    Truncated { frames: usize },

    #[error("message signature rejected")]
    BadSignature,

    #[error("malformed message frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize and sign a message into wire frames.
pub fn encode(msg: &Message, session: &Session) -> Result<Vec<Bytes>, WireError> {
    let header = serde_json::to_vec(&msg.header)?;
    let parent_header = match &msg.parent_header {
        Some(parent) => serde_json::to_vec(parent)?,
        None => b"{}".to_vec(),
    };
    let metadata = serde_json::to_vec(&msg.metadata)?;
    let content = serde_json::to_vec(&msg.content)?;

    let signature = session.sign(&[
        header.as_slice(),
        parent_header.as_slice(),
        metadata.as_slice(),
        content.as_slice(),
    ]);

    let mut frames = Vec::with_capacity(msg.identities.len() + 6 + msg.buffers.len());
    frames.extend(msg.identities.iter().cloned());
    frames.push(Bytes::from_static(DELIMITER));
    frames.push(Bytes::from(signature.into_bytes()));
    frames.push(Bytes::from(header));
    frames.push(Bytes::from(parent_header));
    frames.push(Bytes::from(metadata));
    frames.push(Bytes::from(content));
    frames.extend(msg.buffers.iter().cloned());

    Ok(frames)
}

/// Verify and parse wire frames into a message.
pub fn decode(frames: Vec<Bytes>, session: &Session) -> Result<Message, WireError> {
    let delim = frames
        .iter()
        .position(|frame| frame.as_ref() == DELIMITER)
        .ok_or(WireError::MissingDelimiter)?;

    if frames.len() < delim + 6 {
        return Err(WireError::Truncated {
            frames: frames.len(),
        });
    }

    let signature =
        std::str::from_utf8(&frames[delim + 1]).map_err(|_| WireError::BadSignature)?;
    let payload = &frames[delim + 2..delim + 6];
    let payload_refs: [&[u8]; 4] = [&payload[0], &payload[1], &payload[2], &payload[3]];
    if !session.verify(signature, &payload_refs) {
        return Err(WireError::BadSignature);
    }

    let header: Header = serde_json::from_slice(&payload[0])?;
    let parent_header = decode_parent(&payload[1])?;
    let metadata = serde_json::from_slice(&payload[2])?;
    let content = serde_json::from_slice(&payload[3])?;

    Ok(Message {
        identities: frames[..delim].to_vec(),
        header,
        parent_header,
        metadata,
        content,
        buffers: frames[delim + 6..].to_vec(),
    })
}

// Kernels send `{}` for messages with no parent.
fn decode_parent(raw: &[u8]) -> Result<Option<Header>, WireError> {
    let value: serde_json::Value = serde_json::from_slice(raw)?;
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) if map.is_empty() => Ok(None),
        other => Ok(Some(serde_json::from_value(other)?)),
    }
}
