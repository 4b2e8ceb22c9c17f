//! Protocol messages exchanged between peers.
//!
//! Every wire frame decodes to a [`Message`]: a kind tag, a send timestamp,
//! and a nested JSON payload whose schema is selected by the kind.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::ProtocolError;

/// Protocol version string announced in every [`Hello`].
///
/// Mismatched versions are still accepted; no negotiation is enforced.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Discriminant selecting the payload schema of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Handshake opener, sent by both sides on connect.
    Hello,
    /// Handshake acknowledgement.
    HelloAck,
    /// Pairing request (stub, always accepted).
    PairRequest,
    /// Pairing response.
    PairResponse,
    /// Full listing of one folder's files.
    FileList,
    /// Request for one file's content.
    FileRequest,
    /// One file's content and metadata.
    FileData,
    /// Notification that a file was deleted.
    FileDelete,
    /// Keepalive probe, answered inline with [`MessageKind::Pong`].
    Ping,
    /// Keepalive answer.
    Pong,
    /// Protocol-level error report.
    Error,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Hello => "Hello",
            Self::HelloAck => "HelloAck",
            Self::PairRequest => "PairRequest",
            Self::PairResponse => "PairResponse",
            Self::FileList => "FileList",
            Self::FileRequest => "FileRequest",
            Self::FileData => "FileData",
            Self::FileDelete => "FileDelete",
            Self::Ping => "Ping",
            Self::Pong => "Pong",
            Self::Error => "Error",
        };
        f.write_str(name)
    }
}

/// A single wire frame.
///
/// The payload is kept as raw JSON until the handler knows which schema to
/// decode it into, mirroring how frames arrive off the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Payload schema selector.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Sender-side send time.
    pub timestamp: DateTime<Utc>,
    /// Kind-specific payload, JSON-encoded.
    pub payload: serde_json::Value,
}

impl Message {
    /// Build a message around a typed payload.
    pub fn new<T: Serialize>(kind: MessageKind, payload: &T) -> Result<Self, ProtocolError> {
        Ok(Self {
            kind,
            timestamp: Utc::now(),
            payload: serde_json::to_value(payload).map_err(ProtocolError::Encode)?,
        })
    }

    /// Build a payload-less control message (Ping / Pong).
    pub fn control(kind: MessageKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }

    /// Decode the payload into the schema matching [`Message::kind`].
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.payload.clone()).map_err(ProtocolError::Decode)
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(ProtocolError::Encode)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
    }
}

/// Handshake opener carrying this device's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Human-readable device name.
    pub device_name: String,
    /// Stable device identifier (currently the device name).
    pub device_id: String,
    /// Protocol version string, see [`PROTOCOL_VERSION`].
    pub version: String,
}

/// Acknowledgement of a [`Hello`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloAck {
    /// Responder's device name.
    pub device_name: String,
    /// Responder's device identifier.
    pub device_id: String,
    /// Whether the responder accepts the session.
    pub accepted: bool,
    /// Rejection reason, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Pairing request. Key exchange is not implemented; the field exists for
/// wire compatibility and is always empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairRequest {
    /// Requester's device name.
    pub device_name: String,
    /// Requester's device identifier.
    pub device_id: String,
    /// Reserved for a future public key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<Vec<u8>>,
}

/// Response to a [`PairRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairResponse {
    /// Whether pairing was accepted.
    pub accepted: bool,
    /// Rejection reason, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Reserved for a future public key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<Vec<u8>>,
}

/// One file's metadata inside a [`FileList`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the folder root, `/`-separated.
    pub rel_path: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub mod_time: DateTime<Utc>,
    /// Lowercase SHA-256 hex of the content; empty for directories.
    pub hash: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Permission bits (low 9 bits on Unix).
    pub permission: u32,
    /// Absolute folder path on the sending side.
    pub folder_path: String,
}

/// Full listing of one folder, sent after the handshake and on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileList {
    /// Absolute folder path on the sending side.
    pub folder_path: String,
    /// Base name of the folder; the receiver maps it to a local folder.
    pub folder_name: String,
    /// Files under the folder, root excluded.
    pub files: Vec<FileEntry>,
}

/// Request for one file's content.
///
/// `folder_path` is the *sender-side* absolute path, taken from the
/// [`FileList`] that prompted the request, so the serving side can resolve
/// it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequest {
    /// Absolute folder path on the serving side.
    pub folder_path: String,
    /// Base name of the folder.
    pub folder_name: String,
    /// Path relative to the folder root.
    pub rel_path: String,
}

/// One file's content and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    /// Absolute folder path on the sending side.
    pub folder_path: String,
    /// Base name of the folder; the receiver maps it to a local folder.
    pub folder_name: String,
    /// Path relative to the folder root.
    pub rel_path: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, restored on the receiving side.
    pub mod_time: DateTime<Utc>,
    /// Permission bits, applied on the receiving side.
    pub permission: u32,
    /// Lowercase SHA-256 hex of `data`.
    pub hash: String,
    /// Raw file bytes, base64 in the JSON encoding.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// Whole-file transfer marker; chunking is not performed.
    pub is_chunked: bool,
    /// Chunk index, always 0.
    pub chunk_index: u32,
    /// Total chunk count, always 1.
    pub total_chunks: u32,
}

/// Notification that a file was deleted on the sending side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDelete {
    /// Absolute folder path on the sending side.
    pub folder_path: String,
    /// Base name of the folder.
    pub folder_name: String,
    /// Path relative to the folder root.
    pub rel_path: String,
}

/// Protocol-level error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    /// Numeric error code.
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

/// Raw bytes as base64 strings in JSON.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
