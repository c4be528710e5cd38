use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use routeros_rs::proto::reply::parse_sentence;
use routeros_rs::proto::sentence::pack;
use routeros_rs::proto::unpacker::Unpacker;
use routeros_rs::{Monitor, MonitorConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

/// Accepts connections forever, answering plain logins and traffic queries.
async fn spawn_router() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut connections = 0_u32;
        while let Ok((stream, _)) = listener.accept().await {
            connections += 1;
            // The first connection is dropped right after login to force a reconnect
            tokio::spawn(serve(stream, connections == 1));
        }
    });
    addr
}

fn reply(words: &[&str], tag: &str) -> Vec<u8> {
    let tag = format!(".tag={tag}");
    let mut all: Vec<&str> = words.to_vec();
    all.push(&tag);
    pack(&all).unwrap()
}

async fn serve(mut stream: TcpStream, drop_after_login: bool) {
    let mut unpacker = Unpacker::new();
    let mut buf = [0_u8; 1024];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        unpacker.feed(&buf[..n]);
        let requests: Vec<_> = unpacker.sentences().map(Result::unwrap).collect();

        for request in requests {
            let command = String::from_utf8_lossy(&request.words()[0]).into_owned();
            let request = parse_sentence(request.words()).unwrap();
            let tag = request.tag().unwrap_or_default().to_string();

            let out = match command.as_str() {
                "/login" => reply(&["!done"], &tag),
                "/interface/monitor-traffic" => match request.get("interface") {
                    Some("ether1") => [
                        reply(
                            &[
                                "!re",
                                "=name=ether1",
                                "=rx-bits-per-second=12345678",
                                "=tx-bits-per-second=2000000",
                            ],
                            &tag,
                        ),
                        reply(&["!done"], &tag),
                    ]
                    .concat(),
                    _ => [
                        reply(&["!trap", "=message=no such item"], &tag),
                        reply(&["!done"], &tag),
                    ]
                    .concat(),
                },
                _ => reply(&["!trap", "=message=no such command"], &tag),
            };

            if stream.write_all(&out).await.is_err() {
                return;
            }
            if drop_after_login && command == "/login" {
                return;
            }
        }
    }
}

/// Accepts connections forever and refuses every login, counting the attempts.
async fn spawn_refusing_router() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let logins = Arc::new(AtomicUsize::new(0));
    let counter = logins.clone();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let counter = counter.clone();
            tokio::spawn(async move {
                let mut unpacker = Unpacker::new();
                let mut buf = [0_u8; 1024];
                loop {
                    let n = match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    unpacker.feed(&buf[..n]);
                    let requests: Vec<_> = unpacker.sentences().map(Result::unwrap).collect();
                    for request in requests {
                        let request = parse_sentence(request.words()).unwrap();
                        counter.fetch_add(1, Ordering::SeqCst);
                        let out = reply(
                            &["!trap", "=message=invalid user name or password (6)"],
                            request.tag().unwrap_or_default(),
                        );
                        if stream.write_all(&out).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });
    (addr, logins)
}

fn config(addr: SocketAddr) -> MonitorConfig {
    format!(
        r#"
        address = "{}"
        port = {}
        username = "api"
        password = "secret"
        interfaces = ["ether1", "ether9"]
        interval_secs = 1
        login = "plain"
        "#,
        addr.ip(),
        addr.port()
    )
    .parse()
    .unwrap()
}

#[tokio::test]
async fn test_monitor_reconnects_and_samples() {
    let addr = spawn_router().await;
    let (samples_tx, mut samples) = mpsc::channel(8);
    let monitor = tokio::spawn(Monitor::new(config(addr), samples_tx).run());

    let sample = timeout(WAIT, samples.recv()).await.unwrap().unwrap();
    assert_eq!(sample.interface, "ether1");
    assert_eq!(sample.rx_mbps, 12.35);
    assert_eq!(sample.tx_mbps, 2.0);

    // ether9 traps on every poll and never produces a sample
    let sample = timeout(WAIT, samples.recv()).await.unwrap().unwrap();
    assert_eq!(sample.interface, "ether1");

    drop(samples);
    timeout(WAIT, monitor).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_monitor_survives_unreachable_device() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (samples_tx, mut samples) = mpsc::channel(8);
    let monitor = tokio::spawn(Monitor::new(config(addr), samples_tx).run());

    // Reconnect attempts keep failing without ending the monitor
    assert!(timeout(Duration::from_millis(2500), samples.recv()).await.is_err());
    assert!(!monitor.is_finished());

    drop(samples);
    timeout(WAIT, monitor).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_monitor_does_not_retry_refused_login() {
    let (addr, logins) = spawn_refusing_router().await;
    let (samples_tx, mut samples) = mpsc::channel(8);
    let monitor = tokio::spawn(Monitor::new(config(addr), samples_tx).run());

    // Several ticks pass on the single refused connection
    assert!(timeout(Duration::from_millis(3500), samples.recv()).await.is_err());
    assert_eq!(logins.load(Ordering::SeqCst), 1);
    assert!(!monitor.is_finished());

    drop(samples);
    timeout(WAIT, monitor).await.unwrap().unwrap();
}
