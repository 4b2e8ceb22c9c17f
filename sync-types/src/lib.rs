//! # lansync-types
//!
//! Wire format for the lansync folder-synchronization protocol.
//!
//! This crate provides the types shared by every lansync crate:
//! - [`Message`] and [`MessageKind`] - the outer frame and its payload tag
//! - Payload structs ([`Hello`], [`FileList`], [`FileData`], ...)
//! - [`read_message`] / [`write_message`] - length-prefixed framing
//! - [`ProtocolError`] - protocol-level error type
//!
//! ## Wire format
//!
//! Every frame is a 4-byte big-endian byte count followed by that many
//! bytes of JSON encoding a [`Message`]. Frames above [`MAX_FRAME_SIZE`]
//! are a protocol error that closes the session.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod codec;
mod error;
mod messages;

pub use codec::{read_message, write_message, MAX_FRAME_SIZE};
pub use error::ProtocolError;
pub use messages::{
    ErrorNotice, FileData, FileDelete, FileEntry, FileList, FileRequest, Hello, HelloAck,
    Message, MessageKind, PairRequest, PairResponse, PROTOCOL_VERSION,
};
