//! Message types for the Jupyter messaging protocol (v5.3).
//!
//! The envelope (`Message`) carries a typed header and untyped
//! metadata/content; content payloads for the types this crate sends or
//! renders are defined as structs and converted through
//! [`Message::content_as`]. Unknown inbound message types decode to
//! [`MsgType::Unknown`] so a chatty kernel never kills the channel.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version stamped into outgoing headers.
pub const PROTOCOL_VERSION: &str = "5.3";

/// Message types this crate sends or understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgType {
    ExecuteRequest,
    ExecuteReply,
    ExecuteInput,
    ExecuteResult,
    DisplayData,
    Stream,
    Status,
    Error,
    KernelInfoRequest,
    KernelInfoReply,
    ShutdownRequest,
    ShutdownReply,
    InterruptRequest,
    InterruptReply,
    InputRequest,
    InputReply,
    /// Anything else a kernel may emit.
    #[serde(other)]
    Unknown,
}

impl MsgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MsgType::ExecuteRequest => "execute_request",
            MsgType::ExecuteReply => "execute_reply",
            MsgType::ExecuteInput => "execute_input",
            MsgType::ExecuteResult => "execute_result",
            MsgType::DisplayData => "display_data",
            MsgType::Stream => "stream",
            MsgType::Status => "status",
            MsgType::Error => "error",
            MsgType::KernelInfoRequest => "kernel_info_request",
            MsgType::KernelInfoReply => "kernel_info_reply",
            MsgType::ShutdownRequest => "shutdown_request",
            MsgType::ShutdownReply => "shutdown_reply",
            MsgType::InterruptRequest => "interrupt_request",
            MsgType::InterruptReply => "interrupt_reply",
            MsgType::InputRequest => "input_request",
            MsgType::InputReply => "input_reply",
            MsgType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MsgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_version() -> String {
    PROTOCOL_VERSION.to_string()
}

/// Message header, one per frame 0 of the signed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub msg_id: String,
    pub session: String,
    pub username: String,
    #[serde(default = "Utc::now")]
    pub date: DateTime<Utc>,
    pub msg_type: MsgType,
    #[serde(default = "default_version")]
    pub version: String,
}

impl Header {
    pub fn new(msg_type: MsgType, session: String, username: String) -> Self {
        Self {
            msg_id: uuid::Uuid::new_v4().to_string(),
            session,
            username,
            date: Utc::now(),
            msg_type,
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// A full wire message: routing identities, the four payload documents, and
/// any trailing binary buffers.
#[derive(Debug, Clone)]
pub struct Message {
    pub identities: Vec<Bytes>,
    pub header: Header,
    pub parent_header: Option<Header>,
    pub metadata: Value,
    pub content: Value,
    pub buffers: Vec<Bytes>,
}

impl Message {
    pub fn new(header: Header, content: Value) -> Self {
        Self {
            identities: Vec::new(),
            header,
            parent_header: None,
            metadata: Value::Object(serde_json::Map::new()),
            content,
            buffers: Vec::new(),
        }
    }

    pub fn msg_type(&self) -> MsgType {
        self.header.msg_type
    }

    /// True when this message's parent is the request with `msg_id`.
    pub fn is_reply_to(&self, msg_id: &str) -> bool {
        self.parent_header
            .as_ref()
            .is_some_and(|parent| parent.msg_id == msg_id)
    }

    /// Deserialize the content payload as a concrete type.
    pub fn content_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, super::codec::WireError> {
        Ok(serde_json::from_value(self.content.clone())?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    pub silent: bool,
    pub store_history: bool,
    pub user_expressions: serde_json::Map<String, Value>,
    pub allow_stdin: bool,
    pub stop_on_error: bool,
}

impl ExecuteRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            silent: false,
            store_history: true,
            user_expressions: serde_json::Map::new(),
            allow_stdin: false,
            stop_on_error: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteReply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub execution_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteInput {
    pub code: String,
    pub execution_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResult {
    #[serde(default)]
    pub execution_count: i64,
    pub data: serde_json::Map<String, Value>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayData {
    pub data: serde_json::Map<String, Value>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub name: StreamName,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Starting,
    Busy,
    Idle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub execution_state: ExecutionState,
}

/// Content of both iopub `error` messages and errored `execute_reply`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    pub ename: String,
    pub evalue: String,
    #[serde(default)]
    pub traceback: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelInfoRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelInfoReply {
    pub protocol_version: String,
    #[serde(default)]
    pub implementation: String,
    #[serde(default)]
    pub implementation_version: String,
    #[serde(default)]
    pub banner: String,
    #[serde(default)]
    pub language_info: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownRequest {
    pub restart: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownReply {
    #[serde(default)]
    pub restart: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptRequest {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_type_uses_wire_names() {
        assert_eq!(
            serde_json::to_value(MsgType::ExecuteRequest).unwrap(),
            "execute_request"
        );
        assert_eq!(
            serde_json::to_value(MsgType::KernelInfoReply).unwrap(),
            "kernel_info_reply"
        );
        let parsed: MsgType = serde_json::from_value(serde_json::json!("status")).unwrap();
        assert_eq!(parsed, MsgType::Status);
    }

    #[test]
    fn unknown_msg_types_do_not_fail_decoding() {
        let parsed: MsgType = serde_json::from_value(serde_json::json!("comm_open")).unwrap();
        assert_eq!(parsed, MsgType::Unknown);
    }

    #[test]
    fn execute_request_has_expected_defaults() {
        let value = serde_json::to_value(ExecuteRequest::new("1 + 1")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "code": "1 + 1",
                "silent": false,
                "store_history": true,
                "user_expressions": {},
                "allow_stdin": false,
                "stop_on_error": true
            })
        );
    }

    #[test]
    fn header_roundtrips_through_json() {
        let header = Header::new(MsgType::Status, "sess".into(), "user".into());
        let json = serde_json::to_string(&header).unwrap();
        let parsed: Header = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.msg_id, header.msg_id);
        assert_eq!(parsed.msg_type, MsgType::Status);
        assert_eq!(parsed.version, PROTOCOL_VERSION);
        assert_eq!(parsed.date, header.date);
    }

    #[test]
    fn header_tolerates_missing_version_and_date() {
        let parsed: Header = serde_json::from_value(serde_json::json!({
            "msg_id": "1",
            "session": "s",
            "username": "u",
            "msg_type": "status"
        }))
        .unwrap();
        assert_eq!(parsed.version, PROTOCOL_VERSION);
    }

    #[test]
    fn status_content_parses_execution_state() {
        let status: Status =
            serde_json::from_value(serde_json::json!({"execution_state": "idle"})).unwrap();
        assert_eq!(status.execution_state, ExecutionState::Idle);
    }

    #[test]
    fn stream_content_parses_both_streams() {
        let out: Stream =
            serde_json::from_value(serde_json::json!({"name": "stdout", "text": "hi"})).unwrap();
        assert_eq!(out.name, StreamName::Stdout);
        let err: Stream =
            serde_json::from_value(serde_json::json!({"name": "stderr", "text": "oops"})).unwrap();
        assert_eq!(err.name, StreamName::Stderr);
    }

    #[test]
    fn execute_reply_ignores_extra_fields() {
        let reply: ExecuteReply = serde_json::from_value(serde_json::json!({
            "status": "ok",
            "execution_count": 3,
            "user_expressions": {},
            "payload": []
        }))
        .unwrap();
        assert_eq!(reply.status, ReplyStatus::Ok);
        assert_eq!(reply.execution_count, 3);
    }

    #[test]
    fn is_reply_to_matches_parent_msg_id() {
        let parent = Header::new(MsgType::ExecuteRequest, "s".into(), "u".into());
        let mut msg = Message::new(
            Header::new(MsgType::Status, "s".into(), "u".into()),
            serde_json::json!({"execution_state": "busy"}),
        );
        assert!(!msg.is_reply_to(&parent.msg_id));

        let parent_id = parent.msg_id.clone();
        msg.parent_header = Some(parent);
        assert!(msg.is_reply_to(&parent_id));
        assert!(!msg.is_reply_to("someone-else"));
    }
}
