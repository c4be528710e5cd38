//! Periodic interface traffic sampling.
//!
//! Every tick, each configured interface is polled with
//! `/interface/monitor-traffic =interface=<name> =once=`. The device answers one `!re` with the
//! current bit rates, which is turned into a [`TrafficSample`].

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use routeros_proto::connection::Event;
use routeros_proto::error::CommandError;
use routeros_proto::{Command, CommandBuilder, ParsedReply, ReplyType};
use routeros_tokio::{Client, ClientError, ClientResult};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MonitorConfig;

const RX_BITS: &str = "rx-bits-per-second";
const TX_BITS: &str = "tx-bits-per-second";

/// Current throughput of one interface.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficSample {
    /// Interface name.
    pub interface: String,
    /// Receive rate in Mbit/s.
    pub rx_mbps: f64,
    /// Transmit rate in Mbit/s.
    pub tx_mbps: f64,
}

impl TrafficSample {
    /// Builds a sample from a `monitor-traffic` reply. Missing or unparsable rates count as 0.
    pub fn from_reply(interface: impl Into<String>, reply: &ParsedReply) -> Self {
        let rate = |key: &str| {
            reply
                .get(key)
                .and_then(|value| value.parse::<u64>().ok())
                .map_or(0.0, bits_to_mbit)
        };
        Self {
            interface: interface.into(),
            rx_mbps: rate(RX_BITS),
            tx_mbps: rate(TX_BITS),
        }
    }
}

impl Display for TrafficSample {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: rx {:.2} Mbit/s, tx {:.2} Mbit/s",
            self.interface, self.rx_mbps, self.tx_mbps
        )
    }
}

/// Converts bits per second to Mbit/s, rounded up to two decimals.
pub fn bits_to_mbit(bits: u64) -> f64 {
    (bits as f64 / 1_000_000.0 * 100.0).ceil() / 100.0
}

/// The one-shot traffic query for `interface`.
pub fn traffic_command(interface: &str) -> Result<Command, CommandError> {
    Ok(CommandBuilder::new()
        .command("/interface/monitor-traffic")?
        .attribute("interface", Some(interface))
        .attribute("once", None)
        .build())
}

/// Waits for the answer to one traffic query.
///
/// # Errors
///
/// - [`ClientError::Command`] if the device answers with `!trap`.
/// - [`ClientError::Timeout`] if nothing arrives within `wait`.
/// - [`ClientError::Disconnected`] if the stream ends without a sample.
pub async fn read_sample(
    interface: &str,
    tag: &str,
    replies: &mut mpsc::UnboundedReceiver<ParsedReply>,
    wait: Duration,
) -> ClientResult<TrafficSample> {
    loop {
        let reply = timeout(wait, replies.recv())
            .await
            .map_err(|_| ClientError::Timeout)?
            .ok_or(ClientError::Disconnected)?;

        match reply.reply_type {
            ReplyType::Reply => return Ok(TrafficSample::from_reply(interface, &reply)),
            ReplyType::Trap | ReplyType::Fatal => {
                return Err(ClientError::Command {
                    tag: tag.to_string(),
                    message: reply.message().unwrap_or("unknown error").to_string(),
                });
            }
            // A !done before any !re carries no data
            ReplyType::Done => return Err(ClientError::Disconnected),
            ReplyType::Unknown => debug!(%reply, "ignoring unexpected reply"),
        }
    }
}

/// Polls the configured interfaces until the sample receiver is dropped.
///
/// The monitor owns its [`Client`]. When the connection is lost it logs an error and connects
/// again on the next tick. A refused login is not retried: the connection stays open, the
/// refusal is logged once, and nothing is polled until the monitor is restarted.
pub struct Monitor {
    config: MonitorConfig,
    client: Option<Client>,
    samples: mpsc::Sender<TrafficSample>,
}

impl Monitor {
    /// Creates a monitor delivering its samples to `samples`.
    pub fn new(config: MonitorConfig, samples: mpsc::Sender<TrafficSample>) -> Self {
        Self {
            config,
            client: None,
            samples,
        }
    }

    /// Connects, then polls every `interval_secs` until the sample receiver is dropped.
    pub async fn run(mut self) {
        self.connect();

        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately, give the login a head start
        ticker.tick().await;

        while !self.samples.is_closed() {
            ticker.tick().await;
            self.tick().await;
        }

        if let Some(client) = self.client.take() {
            client.disconnect().await;
        }
        debug!("sample receiver dropped, monitor stopped");
    }

    /// Runs one poll: reconnects if needed, otherwise queries every interface.
    pub async fn tick(&mut self) {
        let alive = self
            .client
            .as_ref()
            .filter(|client| client.is_connected() || client.is_connecting())
            .cloned();
        let Some(client) = alive else {
            error!(address = %self.config.address, "no connection to device, reconnecting");
            self.connect();
            return;
        };

        if client.status().auth_error {
            // Refused credentials stay refused: keep the connection and skip polling
            debug!("credentials refused, not polling");
            return;
        }
        if !client.is_logged_in() {
            debug!("login in progress, skipping poll");
            return;
        }

        for interface in &self.config.interfaces {
            if let Err(e) = self.poll(&client, interface).await {
                warn!(%interface, error = %e, "traffic poll failed");
            }
        }
    }

    fn connect(&mut self) {
        let (client, events) = Client::connect(self.config.to_client_config());
        tokio::spawn(log_events(events));
        self.client = Some(client);
    }

    async fn poll(&self, client: &Client, interface: &str) -> ClientResult<()> {
        let command = traffic_command(interface)?;
        let tag = format!("traffic-{}", Uuid::new_v4());

        let Some(mut replies) = client.send_tagged(&tag, command.into_words()).await? else {
            debug!(%interface, "not logged in, poll skipped");
            return Ok(());
        };

        let interface = interface.to_string();
        let samples = self.samples.clone();
        let wait = self.config.interval();
        tokio::spawn(async move {
            match read_sample(&interface, &tag, &mut replies, wait).await {
                Ok(sample) => {
                    info!(
                        interface = %sample.interface,
                        rx_mbps = sample.rx_mbps,
                        tx_mbps = sample.tx_mbps,
                        "traffic sample"
                    );
                    let _ = samples.send(sample).await;
                }
                Err(e) => warn!(%interface, error = %e, "no traffic sample"),
            }
        });
        Ok(())
    }
}

async fn log_events(mut events: mpsc::UnboundedReceiver<Event>) {
    while let Some(event) = events.recv().await {
        match event {
            Event::ConnectFailed { description } => error!(%description, "connect failed"),
            Event::Disconnected { reason } => warn!(?reason, "disconnected"),
            Event::LoggedIn => info!("logged in"),
            event => debug!(?event, "connection event"),
        }
    }
}
