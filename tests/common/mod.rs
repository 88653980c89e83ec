#![allow(dead_code)]

use std::time::Duration;

use quietwire::{ClientConfig, MessageReceiver, TcpMessage};
use tokio::net::{TcpListener, TcpStream};

pub const IDLE_MS: u64 = 50;

/// Long enough for any buffered frame to be emitted: one tick period to
/// cross the threshold plus one more for the tick itself, with headroom.
pub const SETTLE: Duration = Duration::from_millis(IDLE_MS * 5);

pub async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

pub fn config(port: u16) -> ClientConfig {
    ClientConfig::new("127.0.0.1", port).with_idle_timeout_ms(IDLE_MS)
}

pub async fn accept(listener: &TcpListener) -> TcpStream {
    let (socket, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("client did not connect")
        .unwrap();
    // small writes must leave immediately for the timing assertions
    socket.set_nodelay(true).unwrap();
    socket
}

pub async fn recv_within(rx: &MessageReceiver, within: Duration) -> Option<TcpMessage> {
    tokio::time::timeout(within, rx.recv()).await.ok()?.ok()
}

pub async fn next_message(rx: &MessageReceiver) -> TcpMessage {
    recv_within(rx, Duration::from_secs(2))
        .await
        .expect("expected a message")
}
