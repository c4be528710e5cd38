#![warn(missing_docs)]
//! # routeros-proto
//!
//! Sans-IO implementation of the MikroTik RouterOS API protocol.
//!
//! The API speaks in *sentences*: lists of length-prefixed *words* closed by an empty word.
//! This crate frames and parses them, classifies replies and drives the login handshake,
//! without owning a socket. Pair it with a transport such as `routeros-tokio`.
//!
//! - [`codec`]: word and length prefix encoding.
//! - [`sentence`]: sentences and [`pack`](sentence::pack).
//! - [`unpacker`]: incremental decoding of a received byte stream.
//! - [`reply`]: reply classification.
//! - [`challenge`]: MD5 challenge response for the legacy login.
//! - [`command`]: command word builder.
//! - [`connection`]: the connection state machine.

#[cfg(target_pointer_width = "16")]
compile_error!("This library supports 32-bit architectures or higher.");

/// Password challenge encoding.
pub mod challenge;
pub mod codec;
/// Command builder.
pub mod command;
pub mod connection;
/// Error types of the protocol core.
pub mod error;
/// Reply sentence parsing.
pub mod reply;
/// Sentence representation and packing.
pub mod sentence;
/// Incremental sentence decoding.
pub mod unpacker;

pub use command::{Command, CommandBuilder};
pub use connection::{
    Connection, ConnectionState, Credentials, DisconnectReason, Event, HostEvents, LoginMethod,
};
pub use error::ProtocolError;
pub use reply::{ParsedReply, ReplyType};
pub use sentence::Sentence;
