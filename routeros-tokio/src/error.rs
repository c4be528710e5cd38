use routeros_proto::error::{CommandError, PackError};
use thiserror::Error;

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the tokio client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The device did not answer in time.
    #[error("timed out waiting for the device")]
    Timeout,
    /// The device refused the credentials.
    #[error("authentication error: {message}")]
    Authentication {
        /// Reason given by the device.
        message: String,
    },
    /// The device answered a command with `!trap`.
    #[error("command error (tag {tag}): {message}")]
    Command {
        /// Tag of the failed command.
        tag: String,
        /// Reason given by the device.
        message: String,
    },
    /// The command could not be built.
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] CommandError),
    /// The command could not be serialised.
    #[error("pack error: {0}")]
    Pack(#[from] PackError),
    /// The connection closed before the operation completed.
    #[error("disconnected")]
    Disconnected,
}
