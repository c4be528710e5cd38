#![warn(missing_docs)]
//! # routeros-tokio
//!
//! Tokio transport for [`routeros_proto`]: opens the TCP connection, runs the login handshake
//! and multiplexes tagged commands over it.
//!
//! ```rust,no_run
//! use routeros_proto::{CommandBuilder, Credentials};
//! use routeros_tokio::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("192.168.88.1", 8728, Credentials::new("admin", "password"));
//!     let (client, _events) = Client::connect(config);
//!     client.logged_in().await?;
//!
//!     let cmd = CommandBuilder::new().command("/interface/print")?.build();
//!     if let Some(mut replies) = client.send_tagged("interfaces", cmd.into_words()).await? {
//!         while let Some(reply) = replies.recv().await {
//!             println!("{reply}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod actor;
mod client;
/// Error types of the client.
pub mod error;

pub use actor::ConnectionStatus;
pub use client::{Client, ClientConfig, DEFAULT_PORT};
pub use error::{ClientError, ClientResult};
