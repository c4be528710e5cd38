use std::time::Duration;

use routeros_proto::connection::{ConnectionState, Credentials, Event};
use routeros_proto::{Connection, ParsedReply};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::actor::{ConnectionActor, ConnectionStatus, Request};
use crate::error::{ClientError, ClientResult};

/// Default RouterOS API port (plaintext).
pub const DEFAULT_PORT: u16 = 8728;

const REQUEST_CHANNEL_CAPACITY: usize = 16;

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Host name or IP address of the device.
    pub address: String,
    /// API port.
    pub port: u16,
    /// Login credentials.
    pub credentials: Credentials,
    /// Upper bound for opening the TCP connection.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Config with the default 10 second connect timeout.
    pub fn new(address: impl Into<String>, port: u16, credentials: Credentials) -> Self {
        Self {
            address: address.into(),
            port,
            credentials,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Overrides the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// A client for one RouterOS API connection.
///
/// The connection is driven by a background task that owns the socket and the protocol state.
/// `Client` is a cheap handle onto it and can be cloned to share the connection. A client
/// never reconnects: once [`is_connected`](Self::is_connected) and
/// [`is_connecting`](Self::is_connecting) are both `false`, build a new one.
///
/// # Attention 🚨
/// The connection to the device is not encrypted (plaintext API connection over 8728/tcp port).
#[derive(Clone)]
pub struct Client {
    requests: mpsc::Sender<Request>,
    status: watch::Receiver<ConnectionStatus>,
}

impl Client {
    /// Starts connecting to the device and returns immediately.
    ///
    /// Must be called from within a tokio runtime. Besides the handle, returns the event
    /// stream of the connection: state changes (connected, logged in, authentication failure,
    /// disconnected) and replies whose tag has no receiver, in arrival order. The stream ends
    /// when the connection does. Events are never dropped while the receiver is alive, so
    /// keep draining it or drop it.
    ///
    /// # Examples
    /// ```no_run
    /// let credentials = Credentials::new("admin", "password");
    /// let (client, mut events) = Client::connect(ClientConfig::new("192.168.88.1", 8728, credentials));
    /// client.logged_in().await?;
    /// ```
    pub fn connect(config: ClientConfig) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus {
            state: ConnectionState::Connecting,
            auth_error: false,
        });

        let ClientConfig {
            address,
            port,
            credentials,
            connect_timeout,
        } = config;
        let addr = format!("{address}:{port}");
        debug!(%addr, username = %credentials.username, "starting connection");

        let actor = ConnectionActor::new(Connection::new(credentials), event_tx, status_tx);
        tokio::spawn(actor.run(addr, connect_timeout, request_rx));

        (
            Self {
                requests: request_tx,
                status: status_rx,
            },
            event_rx,
        )
    }

    /// Current state and authentication flag.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.status().state
    }

    /// `true` while the TCP connection is open, logged in or not.
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::AwaitingLogin | ConnectionState::LoggedIn
        )
    }

    /// `true` while the TCP connection is being opened.
    pub fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    /// `true` once the login handshake completed.
    pub fn is_logged_in(&self) -> bool {
        self.state() == ConnectionState::LoggedIn
    }

    /// Waits until the login handshake completes.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Authentication`] if the device refuses the credentials.
    /// - [`ClientError::Disconnected`] if the connection ends first.
    pub async fn logged_in(&self) -> ClientResult<()> {
        let mut status = self.status.clone();
        let result = status
            .wait_for(|s| {
                s.auth_error
                    || matches!(
                        s.state,
                        ConnectionState::LoggedIn | ConnectionState::Disconnected
                    )
            })
            .await
            .map(|s| *s);

        match result {
            Ok(ConnectionStatus { auth_error: true, .. }) => Err(ClientError::Authentication {
                message: "credentials refused by the device".to_string(),
            }),
            Ok(ConnectionStatus {
                state: ConnectionState::LoggedIn,
                ..
            }) => Ok(()),
            _ => Err(ClientError::Disconnected),
        }
    }

    /// Sends a tagged command and returns the stream of its replies.
    ///
    /// Returns `Ok(None)` without sending anything unless the connection is logged in. The
    /// stream yields every `!re` for `tag` and ends after the terminal `!done`, `!trap` or
    /// `!fatal`, or when the connection closes. A listen-style command never terminates on
    /// its own: drop the receiver or call [`cancel`](Self::cancel). Replies queue up in the
    /// receiver until read; a slow reader never holds up other tags.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Pack`] if the words cannot be serialised.
    ///
    /// # Examples
    /// ```no_run
    /// let cmd = CommandBuilder::new().command("/interface/print")?.build();
    /// if let Some(mut replies) = client.send_tagged("interfaces", cmd.into_words()).await? {
    ///     while let Some(reply) = replies.recv().await {
    ///         println!("{reply}");
    ///     }
    /// }
    /// ```
    pub async fn send_tagged<I, W>(
        &self,
        tag: &str,
        words: I,
    ) -> ClientResult<Option<mpsc::UnboundedReceiver<ParsedReply>>>
    where
        I: IntoIterator<Item = W>,
        W: Into<String>,
    {
        let (respond_to, replies) = mpsc::unbounded_channel();
        let (ack, ack_rx) = oneshot::channel();

        let request = Request::Send {
            tag: tag.to_string(),
            words: words.into_iter().map(Into::into).collect(),
            respond_to,
            ack,
        };

        match self.request(request, ack_rx).await? {
            true => Ok(Some(replies)),
            false => Ok(None),
        }
    }

    /// Asks the device to stop the command running under `tag`.
    ///
    /// Returns `Ok(false)` if nothing was sent because the connection is not logged in.
    pub async fn cancel(&self, tag: &str) -> ClientResult<bool> {
        let (ack, ack_rx) = oneshot::channel();
        let request = Request::Cancel {
            tag: tag.to_string(),
            ack,
        };
        self.request(request, ack_rx).await
    }

    /// Closes the connection. Does nothing if it is already closed.
    pub async fn disconnect(&self) {
        let _ = self.requests.send(Request::Disconnect).await;
    }

    async fn request(
        &self,
        request: Request,
        ack: oneshot::Receiver<Result<bool, routeros_proto::error::PackError>>,
    ) -> ClientResult<bool> {
        // A finished connection task behaves like a connection that is not logged in
        if self.requests.send(request).await.is_err() {
            debug!("connection task is gone, dropping request");
            return Ok(false);
        }
        match ack.await {
            Ok(result) => Ok(result?),
            Err(_) => Ok(false),
        }
    }
}
