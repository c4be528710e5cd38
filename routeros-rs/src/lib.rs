#![warn(missing_docs)]
//! # routeros-rs
//!
//! `routeros-rs` is an asynchronous Rust client for the MikroTik RouterOS API, plus a small
//! interface traffic monitor built on top of it.
//!
//! ## Features
//! - Sans-IO protocol core ([`proto`]) with MD5 challenge and plain login
//! - Tokio client multiplexing tagged commands over one connection ([`Client`])
//! - Periodic interface traffic sampling ([`monitor`])
//!
//! ## Examples
//!
//! ```rust,no_run
//! use routeros_rs::{Client, ClientConfig, CommandBuilder, Credentials};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("192.168.88.1", 8728, Credentials::new("admin", "password"));
//!     let (client, _events) = Client::connect(config);
//!     client.logged_in().await?;
//!
//!     let command = CommandBuilder::new().command("/system/resource/print")?.build();
//!     if let Some(mut replies) = client.send_tagged("resources", command.into_words()).await? {
//!         while let Some(reply) = replies.recv().await {
//!             println!("{reply}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Note
//!
//! This library requires the `tokio` runtime. The API connection is not encrypted.

pub use routeros_proto as proto;
pub use routeros_tokio as client;

/// Monitor configuration.
pub mod config;
pub mod monitor;

pub use config::{ConfigError, MonitorConfig};
pub use monitor::{Monitor, TrafficSample};
pub use routeros_proto::{
    Command, CommandBuilder, Credentials, Event, LoginMethod, ParsedReply, ReplyType,
};
pub use routeros_tokio::{Client, ClientConfig, ClientError, ClientResult};
