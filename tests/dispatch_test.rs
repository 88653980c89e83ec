mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use quietwire::{
    ClientHost, ConsumerError, DisconnectReason, Dispatcher, HostExit, MessageObserver,
    MessageSource, MessageSubscriber, ObserverEvent, ObserverStream, TcpClient, TcpMessage,
};
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tokio_stream::StreamExt;

use common::{accept, config, listener, SETTLE};

struct AlwaysFails;

#[async_trait]
impl MessageSubscriber for AlwaysFails {
    async fn handle(
        &self,
        _source: &MessageSource,
        _message: &TcpMessage,
    ) -> Result<(), ConsumerError> {
        Err("cannot handle anything".into())
    }
}

#[derive(Default)]
struct Collect {
    seen: Mutex<Vec<(String, u64)>>,
}

#[async_trait]
impl MessageSubscriber for Collect {
    async fn handle(
        &self,
        source: &MessageSource,
        message: &TcpMessage,
    ) -> Result<(), ConsumerError> {
        self.seen
            .lock()
            .push((message.content().to_string(), source.session_id));
        Ok(())
    }
}

#[derive(Default)]
struct ThrowingObserver {
    errors: AtomicUsize,
    completed: AtomicUsize,
}

impl MessageObserver for ThrowingObserver {
    fn on_next(&self, _message: &TcpMessage) -> Result<(), ConsumerError> {
        Err("observer rejects everything".into())
    }

    fn on_error(&self, _error: &ConsumerError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn on_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

struct Accepting;

impl MessageObserver for Accepting {
    fn on_next(&self, _message: &TcpMessage) -> Result<(), ConsumerError> {
        Ok(())
    }

    fn on_error(&self, _error: &ConsumerError) {}

    fn on_completed(&self) {}
}

#[tokio::test]
async fn failing_consumers_never_starve_healthy_ones() {
    let (listener, port) = listener().await;
    let client_config = config(port);
    let collect = Arc::new(Collect::default());
    let throwing = Arc::new(ThrowingObserver::default());
    let streamed = Arc::new(ObserverStream::new(Accepting, 16));
    let mut events = streamed.stream();

    let dispatcher = Dispatcher::builder(client_config.address())
        .subscriber(Arc::new(AlwaysFails))
        .subscriber(collect.clone())
        .observer(throwing.clone())
        .observer(streamed.clone())
        .build();
    let mut host = ClientHost::new(TcpClient::new(client_config).unwrap(), dispatcher);
    host.start().await.unwrap();
    let mut server = accept(&listener).await;

    server.write_all(b"first").await.unwrap();
    sleep(SETTLE).await;
    server.write_all(b"second").await.unwrap();
    sleep(SETTLE).await;

    host.stop().await.unwrap();

    let seen = collect.seen.lock().clone();
    let contents: Vec<&str> = seen.iter().map(|(content, _)| content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second"]);
    assert!(seen.iter().all(|(_, session_id)| *session_id == seen[0].1));

    assert_eq!(throwing.errors.load(Ordering::SeqCst), 2);
    // completed once, when the client was disposed
    assert_eq!(throwing.completed.load(Ordering::SeqCst), 1);

    let mut kinds = Vec::new();
    while let Some(Ok(event)) = events.next().await {
        let done = event == ObserverEvent::Completed;
        kinds.push(event);
        if done {
            break;
        }
    }
    assert_eq!(kinds.len(), 3);
    assert!(matches!(&kinds[0], ObserverEvent::Next(m) if m.content() == "first"));
    assert!(matches!(&kinds[1], ObserverEvent::Next(m) if m.content() == "second"));
}

#[tokio::test]
async fn callback_sees_messages_with_their_source() {
    let (listener, port) = listener().await;
    let client_config = config(port);
    let address = client_config.address();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler_seen = seen.clone();

    let dispatcher = Dispatcher::builder(address.clone())
        .handler(move |source, message| {
            handler_seen
                .lock()
                .push(format!("{} {}", source.address, message.content()));
            Ok(())
        })
        .build();
    let mut host = ClientHost::new(TcpClient::new(client_config).unwrap(), dispatcher);
    host.start().await.unwrap();
    let mut server = accept(&listener).await;

    server.write_all(b"ping").await.unwrap();
    sleep(SETTLE).await;
    host.stop().await.unwrap();

    assert_eq!(*seen.lock(), vec![format!("{address} ping")]);
}

#[tokio::test]
async fn host_returns_when_the_connection_is_lost() {
    let (listener, port) = listener().await;
    let client_config = config(port);
    let dispatcher = Dispatcher::builder(client_config.address()).build();
    let mut host = ClientHost::new(TcpClient::new(client_config).unwrap(), dispatcher);
    host.start().await.unwrap();
    let server = accept(&listener).await;
    drop(server);

    let exit = tokio::time::timeout(
        Duration::from_secs(2),
        host.run_until(std::future::pending::<()>()),
    )
    .await
    .expect("host should notice the lost connection");
    assert!(matches!(exit, HostExit::ConnectionLost(_)));
    assert!(matches!(exit.reason(), Some(DisconnectReason::RemoteClosed)));

    host.stop().await.unwrap();
}

#[tokio::test]
async fn host_returns_on_shutdown_signal() {
    let (listener, port) = listener().await;
    let client_config = config(port);
    let dispatcher = Dispatcher::builder(client_config.address()).build();
    let mut host = ClientHost::new(TcpClient::new(client_config).unwrap(), dispatcher);
    host.start().await.unwrap();
    let _server = accept(&listener).await;

    let exit = host.run_until(sleep(Duration::from_millis(20))).await;
    assert!(matches!(exit, HostExit::Signal));
    host.stop().await.unwrap();
}
