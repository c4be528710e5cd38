//! Connection state machine.
//!
//! [`Connection`] is sans-IO: the driver that owns the socket reports what happened through
//! [`HostEvents`], writes whatever [`Connection::poll_transmit`] hands out and consumes
//! [`Connection::poll_event`] in order. Nothing here blocks or spawns.

use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};

use hashbrown::HashMap;
use tracing::{debug, error, trace, warn};

use crate::challenge::encode_response;
use crate::command::CommandBuilder;
use crate::error::{PackError, UnpackError};
use crate::reply::{ParsedReply, ReplyType, parse_sentence};
use crate::sentence::{Sentence, pack};
use crate::unpacker::Unpacker;

/// Tag of the first login step.
pub const INITIAL_LOGIN_TAG: &str = "initial_login";
/// Tag of the step that carries the credentials.
pub const AUTHORIZE_TAG: &str = "authorize";

/// Suffix appended to a tag to build the tag of its `/cancel` command.
const CANCEL_SUFFIX: &str = ".cancel";

/// Lifecycle of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport.
    #[default]
    Disconnected,
    /// The transport is being opened.
    Connecting,
    /// The transport is open and the login handshake is running (or has been refused).
    AwaitingLogin,
    /// Login completed. Only now are caller commands sent.
    LoggedIn,
}

/// How the login handshake authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginMethod {
    /// `/login`, then `/login =name= =response=` answering the MD5 challenge.
    ///
    /// Falls back to [`LoginMethod::Plain`] when the device sends no challenge.
    #[default]
    Challenge,
    /// A single `/login =name= =password=` (RouterOS 6.43 and later).
    Plain,
}

/// Login credentials.
#[derive(Clone)]
pub struct Credentials {
    /// API user name.
    pub username: String,
    /// API password.
    pub password: String,
    /// Handshake to perform.
    pub method: LoginMethod,
}

impl Credentials {
    /// Credentials using the default [`LoginMethod::Challenge`] handshake.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            method: LoginMethod::default(),
        }
    }

    /// Selects the handshake.
    pub fn with_method(mut self, method: LoginMethod) -> Self {
        self.method = method;
        self
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("method", &self.method)
            .finish()
    }
}

/// Why the connection went back to [`ConnectionState::Disconnected`].
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectReason {
    /// The transport was closed or failed.
    Closed,
    /// Closed locally through [`Connection::disconnect`] or a new [`Connection::connect`].
    Requested,
    /// The device sent `!fatal`.
    Fatal(String),
    /// The received byte stream could not be decoded.
    Malformed(UnpackError),
}

/// Something the driver or the caller should know about, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The transport is open and the login handshake started.
    Connected,
    /// The transport could not be opened.
    ConnectFailed {
        /// Description given by the transport.
        description: String,
    },
    /// The handshake completed; commands can be sent.
    LoggedIn,
    /// The device refused the credentials. Reported once per connection.
    AuthFailed {
        /// Reason given by the device.
        message: String,
    },
    /// A reply to a caller command, in arrival order.
    Reply(ParsedReply),
    /// The connection is gone. Every tag sent on it is void.
    Disconnected {
        /// Why it closed.
        reason: DisconnectReason,
    },
}

/// Event entry points the transport owner invokes.
pub trait HostEvents {
    /// The transport finished opening: `status` tells whether it succeeded.
    fn on_connected(&mut self, status: bool, description: &str);
    /// Bytes arrived, in any chunking.
    fn on_bytes_received(&mut self, chunk: &[u8]);
    /// The transport closed or failed.
    fn on_disconnected(&mut self);
}

#[derive(Debug, Default, Clone, Copy)]
struct TagState {
    replies: usize,
    cancelled: bool,
    trapped: bool,
}

/// Everything that lives exactly as long as one transport.
#[derive(Debug, Default)]
struct Session {
    auth_error: bool,
    unpacker: Unpacker,
    tags: HashMap<String, TagState>,
}

/// RouterOS API connection state machine.
///
/// # Examples
///
/// ```
/// use routeros_proto::connection::{Connection, ConnectionState, Credentials, HostEvents};
///
/// let mut conn = Connection::new(Credentials::new("admin", "secret"));
/// conn.connect();
/// conn.on_connected(true, "");
/// assert_eq!(conn.state(), ConnectionState::AwaitingLogin);
///
/// // The `/login` sentence is waiting to be written.
/// assert!(conn.poll_transmit().is_some());
/// ```
#[derive(Debug)]
pub struct Connection {
    credentials: Credentials,
    state: ConnectionState,
    session: Option<Session>,
    transmit: VecDeque<Vec<u8>>,
    events: VecDeque<Event>,
}

impl Connection {
    /// Creates a disconnected connection.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: ConnectionState::Disconnected,
            session: None,
            transmit: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// `true` while a transport is open, logged in or not.
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::AwaitingLogin | ConnectionState::LoggedIn
        )
    }

    /// `true` while the transport is being opened.
    pub fn is_connecting(&self) -> bool {
        self.state == ConnectionState::Connecting
    }

    /// `true` once the handshake completed.
    pub fn is_logged_in(&self) -> bool {
        self.state == ConnectionState::LoggedIn
    }

    /// `true` if the device refused the credentials on the current connection.
    pub fn auth_error(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.auth_error)
    }

    /// Tags sent on the current connection that have not received their `!done` yet.
    pub fn pending_tags(&self) -> impl Iterator<Item = &str> {
        self.session
            .iter()
            .flat_map(|s| s.tags.keys().map(String::as_str))
    }

    /// Starts a new connection attempt. Whatever belonged to the previous transport is dropped.
    pub fn connect(&mut self) {
        self.teardown(DisconnectReason::Requested);
        debug!("connecting");
        self.state = ConnectionState::Connecting;
    }

    /// Drops the transport and all its session state.
    pub fn disconnect(&mut self) {
        self.teardown(DisconnectReason::Requested);
    }

    /// Sends `words` tagged with `tag`.
    ///
    /// Returns `Ok(false)` without doing anything unless the connection is logged in: callers
    /// are expected to check the state rather than queue commands.
    ///
    /// # Errors
    ///
    /// Returns a [`PackError`] if the words cannot be framed. The connection state is untouched.
    pub fn send_tagged<I, W>(&mut self, tag: &str, words: I) -> Result<bool, PackError>
    where
        I: IntoIterator<Item = W>,
        W: AsRef<str>,
    {
        if !self.is_logged_in() {
            debug!(tag, state = ?self.state, "not logged in, dropping command");
            return Ok(false);
        }

        let data = tagged_sentence(tag, words).inspect_err(|e| {
            warn!(tag, error = %e, "failed to pack command");
        })?;

        if let Some(session) = self.session.as_mut() {
            // A reused tag starts over, whatever happened to its previous command
            session.tags.insert(tag.to_string(), TagState::default());
        }
        trace!(tag, bytes = data.len(), "command queued");
        self.transmit.push_back(data);
        Ok(true)
    }

    /// Asks the device to stop the command running under `tag`.
    ///
    /// The `/cancel` is sent under its own tag, `<tag>.cancel`, and its acknowledgement is an
    /// ordinary reply. Replies still arriving for `tag` are accepted and dropped.
    ///
    /// # Errors
    ///
    /// Same as [`send_tagged`](Self::send_tagged).
    pub fn cancel(&mut self, tag: &str) -> Result<bool, PackError> {
        let cancel_tag = format!("{tag}{CANCEL_SUFFIX}");
        let sent = self.send_tagged(&cancel_tag, CommandBuilder::cancel(tag).into_words())?;
        if sent {
            if let Some(state) = self.session.as_mut().and_then(|s| s.tags.get_mut(tag)) {
                state.cancelled = true;
            }
        }
        Ok(sent)
    }

    /// Next framed sentence to write to the transport.
    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        self.transmit.pop_front()
    }

    /// Next event, in the order they happened.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    fn start_login(&mut self) {
        let result = match self.credentials.method {
            LoginMethod::Challenge => {
                debug!("requesting login challenge");
                self.queue(INITIAL_LOGIN_TAG, CommandBuilder::login_challenge().into_words())
            }
            LoginMethod::Plain => self.send_plain_login(),
        };
        if let Err(e) = result {
            self.auth_failed(e.to_string());
        }
    }

    fn send_plain_login(&mut self) -> Result<(), PackError> {
        debug!(username = %self.credentials.username, "sending plain login");
        let cmd = CommandBuilder::login_plain(&self.credentials.username, &self.credentials.password);
        self.queue(AUTHORIZE_TAG, cmd.into_words())
    }

    /// Queues a tagged sentence regardless of the login state.
    fn queue(&mut self, tag: &str, words: Vec<String>) -> Result<(), PackError> {
        let data = tagged_sentence(tag, words)?;
        self.transmit.push_back(data);
        Ok(())
    }

    fn handle_sentence(&mut self, sentence: Sentence) {
        let reply = match parse_sentence(sentence.words()) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "dropping unparsable sentence");
                return;
            }
        };
        trace!(%reply, "reply received");

        if reply.reply_type == ReplyType::Fatal {
            let reason = reply.message().unwrap_or_default().to_string();
            warn!(tag = ?reply.tag, %reason, "fatal reply");
            self.events.push_back(Event::Reply(reply));
            self.teardown(DisconnectReason::Fatal(reason));
            return;
        }

        match reply.tag() {
            Some(INITIAL_LOGIN_TAG) => self.handle_challenge(&reply),
            Some(AUTHORIZE_TAG) => self.handle_authorize(&reply),
            _ => self.route(reply),
        }
    }

    fn handle_challenge(&mut self, reply: &ParsedReply) {
        if self.state != ConnectionState::AwaitingLogin {
            debug!(%reply, "ignoring late login reply");
            return;
        }
        match reply.reply_type {
            ReplyType::Done => {
                let result = match reply.get("ret") {
                    Some(challenge) => {
                        match encode_response(&self.credentials.password, challenge) {
                            Ok(response) => {
                                debug!(username = %self.credentials.username, "answering login challenge");
                                let cmd = CommandBuilder::login_response(
                                    &self.credentials.username,
                                    &response,
                                );
                                self.queue(AUTHORIZE_TAG, cmd.into_words())
                                    .map_err(|e| e.to_string())
                            }
                            Err(e) => Err(e.to_string()),
                        }
                    }
                    None => {
                        debug!("device sent no challenge, falling back to plain login");
                        self.send_plain_login().map_err(|e| e.to_string())
                    }
                };
                if let Err(message) = result {
                    self.auth_failed(message);
                }
            }
            ReplyType::Trap => {
                let message = reply.message().unwrap_or("login refused").to_string();
                self.auth_failed(message);
            }
            _ => trace!(%reply, "ignoring login reply"),
        }
    }

    fn handle_authorize(&mut self, reply: &ParsedReply) {
        if self.state != ConnectionState::AwaitingLogin {
            debug!(%reply, "ignoring late login reply");
            return;
        }
        match reply.reply_type {
            ReplyType::Done if !self.auth_error() => {
                debug!("logged in");
                self.state = ConnectionState::LoggedIn;
                self.events.push_back(Event::LoggedIn);
            }
            ReplyType::Trap => {
                let message = reply
                    .message()
                    .unwrap_or("invalid user name or password")
                    .to_string();
                self.auth_failed(message);
            }
            _ => trace!(%reply, "ignoring login reply"),
        }
    }

    fn auth_failed(&mut self, message: String) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.auth_error {
            return;
        }
        session.auth_error = true;
        error!(username = %self.credentials.username, %message, "authentication failed");
        self.events.push_back(Event::AuthFailed { message });
    }

    fn route(&mut self, reply: ParsedReply) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let deliver = match reply.tag().and_then(|tag| session.tags.get_mut(tag)) {
            Some(state) => {
                state.replies += 1;
                // A failed command ends with !trap followed by !done: the trap is the
                // caller's terminal reply, the trailing !done only retires the tag.
                let deliver = !state.cancelled && !state.trapped;
                if reply.reply_type == ReplyType::Trap {
                    state.trapped = true;
                }
                if !deliver {
                    trace!(%reply, replies = state.replies, "dropping reply for finished tag");
                }
                deliver
            }
            None => true,
        };

        if reply.reply_type == ReplyType::Done {
            if let Some(tag) = reply.tag() {
                session.tags.remove(tag);
            }
        }

        if deliver {
            self.events.push_back(Event::Reply(reply));
        }
    }

    fn teardown(&mut self, reason: DisconnectReason) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        debug!(from = ?self.state, ?reason, "disconnected");
        self.state = ConnectionState::Disconnected;
        self.session = None;
        self.transmit.clear();
        self.events.push_back(Event::Disconnected { reason });
    }
}

impl HostEvents for Connection {
    fn on_connected(&mut self, status: bool, description: &str) {
        if self.state != ConnectionState::Connecting {
            debug!(state = ?self.state, "ignoring connect result, no attempt in progress");
            return;
        }

        if !status {
            warn!(%description, "connection failed");
            self.state = ConnectionState::Disconnected;
            self.events.push_back(Event::ConnectFailed {
                description: description.to_string(),
            });
            return;
        }

        debug!("connected");
        self.state = ConnectionState::AwaitingLogin;
        self.session = Some(Session::default());
        self.transmit.clear();
        self.events.push_back(Event::Connected);
        self.start_login();
    }

    fn on_bytes_received(&mut self, chunk: &[u8]) {
        match self.session.as_mut() {
            Some(session) => session.unpacker.feed(chunk),
            None => {
                trace!(bytes = chunk.len(), "ignoring bytes, no session");
                return;
            }
        }

        loop {
            let next = match self.session.as_mut() {
                Some(session) => session.unpacker.sentences().next(),
                None => break,
            };
            match next {
                Some(Ok(sentence)) => self.handle_sentence(sentence),
                Some(Err(e)) => {
                    error!(error = %e, "malformed stream");
                    self.teardown(DisconnectReason::Malformed(e));
                    break;
                }
                None => break,
            }
        }
    }

    fn on_disconnected(&mut self) {
        self.teardown(DisconnectReason::Closed);
    }
}

fn tagged_sentence<I, W>(tag: &str, words: I) -> Result<Vec<u8>, PackError>
where
    I: IntoIterator<Item = W>,
    W: AsRef<str>,
{
    let mut words: Vec<String> = words.into_iter().map(|w| w.as_ref().to_string()).collect();
    if words.is_empty() {
        return Err(PackError::Empty);
    }
    words.push(format!(".tag={tag}"));
    pack(&words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unpacker::Unpacker;

    const RET: &str = "=ret=00112233445566778899aabbccddeeff";

    fn reply(words: &[&str]) -> Vec<u8> {
        pack(words).unwrap()
    }

    fn sent(conn: &mut Connection) -> Vec<Vec<String>> {
        let mut unpacker = Unpacker::new();
        while let Some(data) = conn.poll_transmit() {
            unpacker.feed(&data);
        }
        unpacker
            .sentences()
            .map(|s| {
                s.unwrap()
                    .into_words()
                    .into_iter()
                    .map(|w| String::from_utf8(w).unwrap())
                    .collect()
            })
            .collect()
    }

    fn events(conn: &mut Connection) -> Vec<Event> {
        std::iter::from_fn(|| conn.poll_event()).collect()
    }

    fn connected() -> Connection {
        let mut conn = Connection::new(Credentials::new("admin", "admin"));
        conn.connect();
        conn.on_connected(true, "");
        conn
    }

    fn logged_in() -> Connection {
        let mut conn = connected();
        conn.on_bytes_received(&reply(&["!done", ".tag=initial_login", RET]));
        conn.on_bytes_received(&reply(&["!done", ".tag=authorize"]));
        assert!(conn.is_logged_in());
        sent(&mut conn);
        events(&mut conn);
        conn
    }

    #[test]
    fn test_challenge_login() {
        let mut conn = connected();
        assert!(conn.is_connected());
        assert_eq!(sent(&mut conn), [["/login", ".tag=initial_login"]]);

        conn.on_bytes_received(&reply(&["!done", ".tag=initial_login", RET]));
        assert_eq!(conn.state(), ConnectionState::AwaitingLogin);
        assert_eq!(
            sent(&mut conn),
            [[
                "/login",
                "=name=admin",
                "=response=00ff417326e9b311dac9e798aa419644d8",
                ".tag=authorize"
            ]]
        );

        conn.on_bytes_received(&reply(&["!done", ".tag=authorize"]));
        assert_eq!(conn.state(), ConnectionState::LoggedIn);
        assert_eq!(events(&mut conn), [Event::Connected, Event::LoggedIn]);
    }

    #[test]
    fn test_challenge_without_ret_falls_back_to_plain() {
        let mut conn = connected();
        sent(&mut conn);

        conn.on_bytes_received(&reply(&["!done", ".tag=initial_login"]));
        assert_eq!(
            sent(&mut conn),
            [["/login", "=name=admin", "=password=admin", ".tag=authorize"]]
        );
    }

    #[test]
    fn test_plain_login() {
        let credentials = Credentials::new("api", "pw").with_method(LoginMethod::Plain);
        let mut conn = Connection::new(credentials);
        conn.connect();
        conn.on_connected(true, "");
        assert_eq!(
            sent(&mut conn),
            [["/login", "=name=api", "=password=pw", ".tag=authorize"]]
        );

        conn.on_bytes_received(&reply(&["!done", ".tag=authorize"]));
        assert!(conn.is_logged_in());
    }

    #[test]
    fn test_auth_failure_is_latched() {
        let mut conn = connected();
        conn.on_bytes_received(&reply(&["!done", ".tag=initial_login", RET]));
        conn.on_bytes_received(&reply(&[
            "!trap",
            ".tag=authorize",
            "=message=invalid user name or password (6)",
        ]));
        conn.on_bytes_received(&reply(&["!trap", ".tag=authorize", "=message=again"]));
        conn.on_bytes_received(&reply(&["!done", ".tag=authorize"]));

        assert!(conn.auth_error());
        assert!(conn.is_connected());
        assert!(!conn.is_logged_in());
        assert_eq!(
            events(&mut conn),
            [
                Event::Connected,
                Event::AuthFailed {
                    message: "invalid user name or password (6)".to_string()
                }
            ]
        );

        // A fresh connection starts clean
        conn.connect();
        conn.on_connected(true, "");
        assert!(!conn.auth_error());
    }

    #[test]
    fn test_invalid_challenge_fails_login() {
        let mut conn = connected();
        conn.on_bytes_received(&reply(&["!done", ".tag=initial_login", "=ret=zz"]));
        assert!(conn.auth_error());
        assert!(matches!(events(&mut conn)[..], [Event::Connected, Event::AuthFailed { .. }]));
    }

    #[test]
    fn test_send_requires_login() {
        let mut conn = Connection::new(Credentials::new("admin", "admin"));
        assert_eq!(conn.send_tagged("x", ["/interface/print"]), Ok(false));

        let mut conn = connected();
        sent(&mut conn);
        assert_eq!(conn.send_tagged("x", ["/interface/print"]), Ok(false));
        assert!(conn.poll_transmit().is_none());
    }

    #[test]
    fn test_send_tagged() {
        let mut conn = logged_in();
        assert_eq!(
            conn.send_tagged("x", ["/interface/print", "=detail="]),
            Ok(true)
        );
        assert_eq!(sent(&mut conn), [["/interface/print", "=detail=", ".tag=x"]]);
        assert_eq!(conn.pending_tags().collect::<Vec<_>>(), ["x"]);
    }

    #[test]
    fn test_send_pack_error_keeps_state() {
        let mut conn = logged_in();
        let words: [&str; 0] = [];
        assert_eq!(conn.send_tagged("x", words), Err(PackError::Empty));
        assert_eq!(conn.send_tagged("x", ["/a", ""]), Err(PackError::EmptyWord(1)));
        assert!(conn.is_logged_in());
        assert!(conn.poll_transmit().is_none());
    }

    #[test]
    fn test_multiplexing() {
        let mut conn = logged_in();
        conn.send_tagged("a", ["/interface/print"]).unwrap();
        conn.send_tagged("b", ["/ip/address/print"]).unwrap();

        let mut data = reply(&["!re", "=name=ether1", ".tag=a"]);
        data.extend(reply(&["!re", "=address=10.0.0.1/24", ".tag=b"]));
        data.extend(reply(&["!re", "=name=ether2", ".tag=a"]));
        data.extend(reply(&["!done", ".tag=b"]));
        data.extend(reply(&["!done", ".tag=a"]));
        conn.on_bytes_received(&data);

        let replies: Vec<_> = events(&mut conn)
            .into_iter()
            .filter_map(|e| match e {
                Event::Reply(r) => Some(r),
                _ => None,
            })
            .collect();

        let for_tag = |tag: &str| -> Vec<(ReplyType, Option<String>)> {
            replies
                .iter()
                .filter(|r| r.tag() == Some(tag))
                .map(|r| (r.reply_type, r.get("name").or(r.get("address")).map(String::from)))
                .collect()
        };

        assert_eq!(
            for_tag("a"),
            [
                (ReplyType::Reply, Some("ether1".to_string())),
                (ReplyType::Reply, Some("ether2".to_string())),
                (ReplyType::Done, None)
            ]
        );
        assert_eq!(
            for_tag("b"),
            [
                (ReplyType::Reply, Some("10.0.0.1/24".to_string())),
                (ReplyType::Done, None)
            ]
        );
        assert_eq!(conn.pending_tags().count(), 0);
    }

    #[test]
    fn test_trap_then_done_delivers_trap_only() {
        let mut conn = logged_in();
        conn.send_tagged("x", ["/interface/set", "=numbers=ether9"]).unwrap();
        conn.on_bytes_received(&reply(&["!trap", "=message=no such item", ".tag=x"]));
        conn.on_bytes_received(&reply(&["!done", ".tag=x"]));

        let events = events(&mut conn);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Reply(r) if r.reply_type == ReplyType::Trap));
        assert_eq!(conn.pending_tags().count(), 0);
    }

    #[test]
    fn test_unknown_tag_is_delivered() {
        let mut conn = logged_in();
        conn.on_bytes_received(&reply(&["!re", "=name=ether1", ".tag=stale"]));
        assert!(matches!(&events(&mut conn)[..], [Event::Reply(r)] if r.tag() == Some("stale")));
    }

    #[test]
    fn test_streaming_tag_stays_pending() {
        let mut conn = logged_in();
        conn.send_tagged("listen", ["/interface/listen"]).unwrap();
        for _ in 0..3 {
            conn.on_bytes_received(&reply(&["!re", "=name=ether1", ".tag=listen"]));
        }
        assert_eq!(events(&mut conn).len(), 3);
        assert_eq!(conn.pending_tags().collect::<Vec<_>>(), ["listen"]);
    }

    #[test]
    fn test_cancel_drops_late_replies() {
        let mut conn = logged_in();
        conn.send_tagged("listen", ["/interface/listen"]).unwrap();
        sent(&mut conn);

        assert_eq!(conn.cancel("listen"), Ok(true));
        assert_eq!(
            sent(&mut conn),
            [["/cancel", "=tag=listen", ".tag=listen.cancel"]]
        );

        conn.on_bytes_received(&reply(&["!re", "=name=ether1", ".tag=listen"]));
        conn.on_bytes_received(&reply(&[
            "!trap",
            "=category=2",
            "=message=interrupted",
            ".tag=listen",
        ]));
        conn.on_bytes_received(&reply(&["!done", ".tag=listen"]));
        conn.on_bytes_received(&reply(&["!done", ".tag=listen.cancel"]));

        let events = events(&mut conn);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Reply(r) if r.tag() == Some("listen.cancel")));
        assert_eq!(conn.pending_tags().count(), 0);
        assert!(conn.is_logged_in());
    }

    #[test]
    fn test_reused_tag_starts_fresh() {
        let mut conn = logged_in();
        conn.send_tagged("listen", ["/interface/listen"]).unwrap();
        assert_eq!(conn.cancel("listen"), Ok(true));
        conn.on_bytes_received(&reply(&["!trap", "=message=interrupted", ".tag=listen"]));

        // Sent again before the cancelled command's !done
        conn.send_tagged("listen", ["/interface/listen"]).unwrap();
        sent(&mut conn);
        events(&mut conn);

        conn.on_bytes_received(&reply(&["!re", "=name=ether1", ".tag=listen"]));
        let events = events(&mut conn);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Reply(r) if r.get("name") == Some("ether1")));
        assert_eq!(conn.pending_tags().collect::<Vec<_>>(), ["listen"]);
    }

    #[test]
    fn test_fatal_resets_connection() {
        let mut conn = logged_in();
        conn.send_tagged("x", ["/interface/print"]).unwrap();
        conn.on_bytes_received(&reply(&["!fatal", "session terminated on request"]));

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.is_logged_in());
        assert_eq!(conn.pending_tags().count(), 0);
        assert!(conn.poll_transmit().is_none());

        let events = events(&mut conn);
        assert!(matches!(&events[0], Event::Reply(r) if r.reply_type == ReplyType::Fatal));
        assert_eq!(
            events[1],
            Event::Disconnected {
                reason: DisconnectReason::Fatal("session terminated on request".to_string())
            }
        );
    }

    #[test]
    fn test_fatal_during_login() {
        let mut conn = connected();
        conn.on_bytes_received(&reply(&["!fatal", "not logged in"]));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.auth_error());
    }

    #[test]
    fn test_disconnect_from_any_state() {
        let mut conn = Connection::new(Credentials::new("admin", "admin"));
        conn.connect();
        conn.on_disconnected();
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let mut conn = connected();
        conn.on_disconnected();
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let mut conn = logged_in();
        conn.send_tagged("x", ["/interface/print"]).unwrap();
        conn.on_disconnected();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.is_logged_in());
        assert!(conn.poll_transmit().is_none());
        assert_eq!(
            events(&mut conn),
            [Event::Disconnected {
                reason: DisconnectReason::Closed
            }]
        );

        // Bytes from the old transport are ignored
        conn.on_bytes_received(&reply(&["!done", ".tag=x"]));
        assert!(conn.poll_event().is_none());
    }

    #[test]
    fn test_reconnect_discards_partial_data() {
        let mut conn = logged_in();
        let data = reply(&["!re", "=name=ether1", ".tag=x"]);
        conn.on_bytes_received(&data[..4]);

        conn.connect();
        conn.on_connected(true, "");
        events(&mut conn);

        conn.on_bytes_received(&reply(&["!done", ".tag=initial_login", RET]));
        assert!(conn.poll_event().is_none());
        assert!(!sent(&mut conn).is_empty());
    }

    #[test]
    fn test_connect_failure() {
        let mut conn = Connection::new(Credentials::new("admin", "admin"));
        conn.connect();
        assert!(conn.is_connecting());
        conn.on_connected(false, "connection refused");
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(
            events(&mut conn),
            [Event::ConnectFailed {
                description: "connection refused".to_string()
            }]
        );
    }

    #[test]
    fn test_malformed_stream_tears_down() {
        let mut conn = logged_in();
        conn.on_bytes_received(&[0xF8, 0x00]);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(matches!(
            events(&mut conn)[..],
            [Event::Disconnected {
                reason: DisconnectReason::Malformed(_)
            }]
        ));
    }

    #[test]
    fn test_empty_sentence_is_dropped() {
        let mut conn = logged_in();
        conn.send_tagged("x", ["/interface/print"]).unwrap();
        let mut data = vec![0x00];
        data.extend(reply(&["!done", ".tag=x"]));
        conn.on_bytes_received(&data);

        assert!(conn.is_logged_in());
        assert!(matches!(&events(&mut conn)[..], [Event::Reply(r)] if r.tag() == Some("x")));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let debug = format!("{:?}", Credentials::new("admin", "hunter2"));
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }
}
