use std::time::Duration;

use hashbrown::HashMap;
use routeros_proto::connection::{ConnectionState, DisconnectReason, Event, HostEvents};
use routeros_proto::error::PackError;
use routeros_proto::{Connection, ParsedReply, ReplyType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace, warn};

const READ_BUFFER_SIZE: usize = 4096;

/// Observable state of the connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    /// Lifecycle state.
    pub state: ConnectionState,
    /// `true` once the device refused the credentials on the current connection.
    pub auth_error: bool,
}

/// Requests sent from a [`Client`](crate::Client) handle to the connection task.
pub(crate) enum Request {
    Send {
        tag: String,
        words: Vec<String>,
        respond_to: mpsc::UnboundedSender<ParsedReply>,
        ack: oneshot::Sender<Result<bool, PackError>>,
    },
    Cancel {
        tag: String,
        ack: oneshot::Sender<Result<bool, PackError>>,
    },
    Disconnect,
}

/// Owns the socket and the [`Connection`] state machine for the lifetime of one TCP connection.
///
/// Every byte read and every request goes through this single task, so the session state is
/// never touched concurrently. The task never waits on a consumer: replies and events go out
/// on unbounded channels, so a receiver that is not drained only holds its own backlog.
pub(crate) struct ConnectionActor {
    connection: Connection,
    routes: HashMap<String, mpsc::UnboundedSender<ParsedReply>>,
    events: mpsc::UnboundedSender<Event>,
    status: watch::Sender<ConnectionStatus>,
}

impl ConnectionActor {
    pub(crate) fn new(
        connection: Connection,
        events: mpsc::UnboundedSender<Event>,
        status: watch::Sender<ConnectionStatus>,
    ) -> Self {
        Self {
            connection,
            routes: HashMap::new(),
            events,
            status,
        }
    }

    /// Connect to the device, log in, then serve requests until the connection ends.
    pub(crate) async fn run(
        mut self,
        addr: String,
        connect_timeout: Duration,
        mut requests: mpsc::Receiver<Request>,
    ) {
        self.connection.connect();
        self.publish();

        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return self.connect_failed(&e.to_string()),
            Err(_) => return self.connect_failed("connection timed out"),
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "failed to set TCP_NODELAY");
        }
        debug!(%addr, "tcp connection established");

        // Split for independent read/write
        let (mut tcp_rx, mut tcp_tx) = stream.into_split();
        self.connection.on_connected(true, "");
        self.flush(&mut tcp_tx).await;

        let mut buf = vec![0_u8; READ_BUFFER_SIZE];

        while self.connection.state() != ConnectionState::Disconnected {
            tokio::select! {
                // Prefer reading from the device
                biased;

                bytes_read = tcp_rx.read(&mut buf) => match bytes_read {
                    Ok(0) => {
                        debug!("device closed connection");
                        self.connection.on_disconnected();
                    }
                    Ok(n) => {
                        trace!(bytes = n, "received");
                        self.connection.on_bytes_received(&buf[..n]);
                    }
                    Err(e) => {
                        warn!(error = %e, "error reading from device");
                        self.connection.on_disconnected();
                    }
                },

                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => {
                        // Every client handle is gone
                        debug!("request channel closed, disconnecting");
                        self.connection.disconnect();
                    }
                },
            }

            self.flush(&mut tcp_tx).await;
        }

        // Final attempt to gracefully close TCP
        let _ = tcp_tx.shutdown().await;
    }

    fn connect_failed(mut self, description: &str) {
        self.connection.on_connected(false, description);
        self.dispatch_events();
        self.publish();
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Send {
                tag,
                words,
                respond_to,
                ack,
            } => {
                let result = self.connection.send_tagged(&tag, &words);
                if let Ok(true) = result {
                    // The command is queued, store the channel to send the replies back
                    self.routes.insert(tag, respond_to);
                }
                let _ = ack.send(result);
            }
            Request::Cancel { tag, ack } => {
                let result = self.connection.cancel(&tag);
                if let Ok(true) = result {
                    self.routes.remove(&tag);
                }
                let _ = ack.send(result);
            }
            Request::Disconnect => {
                debug!("disconnect requested");
                self.connection.disconnect();
            }
        }
    }

    /// Write pending sentences, then deliver events and publish the state.
    async fn flush(&mut self, tcp_tx: &mut OwnedWriteHalf) {
        loop {
            while let Some(data) = self.connection.poll_transmit() {
                if let Err(e) = tcp_tx.write_all(&data).await {
                    warn!(error = %e, "error writing to device");
                    self.connection.on_disconnected();
                }
            }
            // Delivering replies can queue a /cancel for abandoned tags
            if !self.dispatch_events() {
                break;
            }
        }
        self.publish();
    }

    /// Returns `true` if new sentences were queued while dispatching.
    fn dispatch_events(&mut self) -> bool {
        let mut queued = false;
        while let Some(event) = self.connection.poll_event() {
            match event {
                Event::Reply(reply) => queued |= self.route(reply),
                Event::Disconnected { reason } => {
                    if reason != DisconnectReason::Requested {
                        debug!(?reason, "connection lost");
                    }
                    // Dropping the senders ends every reply stream of this connection
                    self.routes.clear();
                    self.notify(Event::Disconnected { reason });
                }
                event => self.notify(event),
            }
        }
        queued
    }

    /// Deliver a reply to the channel registered for its tag, or to the event stream.
    fn route(&mut self, reply: ParsedReply) -> bool {
        let Some(tag) = reply.tag.clone() else {
            self.notify(Event::Reply(reply));
            return false;
        };
        let Some(sender) = self.routes.get(&tag) else {
            self.notify(Event::Reply(reply));
            return false;
        };

        let terminal = reply.is_terminal();
        let streaming = reply.reply_type == ReplyType::Reply;

        if sender.send(reply).is_err() {
            // The receiver is gone, stop the command on the device
            self.routes.remove(&tag);
            if streaming {
                debug!(%tag, "reply receiver dropped, cancelling");
                return matches!(self.connection.cancel(&tag), Ok(true));
            }
            return false;
        }

        if terminal {
            self.routes.remove(&tag);
        }
        false
    }

    fn notify(&self, event: Event) {
        // Only fails once the event receiver is gone
        if self.events.send(event).is_err() {
            trace!("event receiver dropped, event discarded");
        }
    }

    fn publish(&self) {
        let status = ConnectionStatus {
            state: self.connection.state(),
            auth_error: self.connection.auth_error(),
        };
        self.status.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }
}
