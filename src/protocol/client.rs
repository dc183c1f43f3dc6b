//! Connection Manager.
//!
//! Owns the single logical connection for a paired device. A background
//! worker task connects, pumps frames through the decoder into the
//! [`EventDispatcher`] and reconnects with backoff until [`disconnect`] is
//! called or the server ends the session for good (replaced or logged out).
//! The manager talks to the worker only through a command channel; state is
//! published on a `watch` channel and as dispatcher events.
//!
//! [`disconnect`]: ConnectionManager::disconnect

use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::config::ClientConfig;
use crate::protocol::backoff::Backoff;
use crate::protocol::dispatch::EventDispatcher;
use crate::protocol::message::decode;
use crate::socket::{Link, Transport};
use crate::store::{CredentialStore, SessionRecord, StoreError};
use crate::types::{ConnectionEvent, ConnectionState, InboundEvent, StreamSignal};

/// Errors returned by [`ConnectionManager::connect`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectError {
    #[error("no paired device, run the qr command first")]
    NotPaired,
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("connection attempt timed out")]
    Timeout,
    #[error("disconnected before the first attempt finished")]
    Cancelled,
    #[error(transparent)]
    Store(#[from] StoreError),
}

enum Command {
    Disconnect(oneshot::Sender<()>),
}

struct Worker {
    commands: mpsc::Sender<Command>,
    handle: JoinHandle<()>,
}

/// Handle to the connection worker.
pub struct ConnectionManager {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    dispatcher: EventDispatcher,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    worker: Mutex<Option<Worker>>,
}

impl ConnectionManager {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            dispatcher: EventDispatcher::new(config.dispatcher_capacity),
            config,
            transport,
            store,
            state_tx: Arc::new(state_tx),
            state_rx,
            worker: Mutex::new(None),
        }
    }

    /// Start the connection worker for `record` and wait for its first
    /// attempt.
    ///
    /// Returns `Ok` once connected. If the first attempt fails its error is
    /// returned, but the worker keeps retrying in the background until
    /// [`disconnect`](Self::disconnect).
    pub async fn connect(&self, record: SessionRecord) -> Result<(), ConnectError> {
        if !record.is_paired() {
            return Err(ConnectError::NotPaired);
        }
        self.disconnect().await;

        let (commands, command_rx) = mpsc::channel(4);
        let (first_tx, first_rx) = oneshot::channel();
        let supervisor = Supervisor {
            backoff: Backoff::from_config(&self.config),
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            store: Arc::clone(&self.store),
            dispatcher: self.dispatcher.clone(),
            state_tx: Arc::clone(&self.state_tx),
            commands: command_rx,
            first_result: Some(first_tx),
        };
        let handle = tokio::spawn(supervisor.run(record));
        *self.lock_worker() = Some(Worker { commands, handle });

        first_rx.await.unwrap_or(Err(ConnectError::Cancelled))
    }

    /// Load the stored record and [`connect`](Self::connect) with it.
    pub async fn connect_stored(&self) -> Result<(), ConnectError> {
        match load_record(&self.store).await? {
            Some(record) => self.connect(record).await,
            None => Err(ConnectError::NotPaired),
        }
    }

    /// Stop the worker and close the connection. Safe to call repeatedly
    /// and from any state; once this returns no more frames are published.
    pub async fn disconnect(&self) {
        let Some(worker) = self.lock_worker().take() else {
            return;
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if worker.commands.send(Command::Disconnect(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        if let Err(e) = worker.handle.await {
            error!(target: "Client", "Connection worker failed: {e}");
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every state the manager moves into.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn load_record(store: &Arc<dyn CredentialStore>) -> Result<Option<SessionRecord>, StoreError> {
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || store.load())
        .await
        .unwrap_or_else(|e| Err(StoreError::Io(e.to_string())))
}

/// How a connected session ended.
enum SessionEnd {
    Disconnect(Option<oneshot::Sender<()>>),
    Terminal,
    Dropped,
}

enum AttemptStep {
    Command(Option<Command>),
    Opened(Result<Result<Box<dyn Link>, crate::socket::SocketError>, tokio::time::error::Elapsed>),
}

enum PumpStep {
    Command(Option<Command>),
    Frame(Result<Option<Vec<u8>>, crate::socket::SocketError>),
}

fn into_ack(command: Option<Command>) -> Option<oneshot::Sender<()>> {
    command.map(|Command::Disconnect(ack)| ack)
}

/// Worker task state.
struct Supervisor {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    dispatcher: EventDispatcher,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    commands: mpsc::Receiver<Command>,
    backoff: Backoff,
    first_result: Option<oneshot::Sender<Result<(), ConnectError>>>,
}

impl Supervisor {
    async fn run(mut self, mut record: SessionRecord) {
        let ack = loop {
            self.set_state(ConnectionState::Connecting);
            let transport = Arc::clone(&self.transport);
            let step = tokio::select! {
                biased;
                command = self.commands.recv() => AttemptStep::Command(command),
                opened = timeout(self.config.handshake_timeout, transport.open(&record)) => AttemptStep::Opened(opened),
            };

            match step {
                AttemptStep::Command(command) => break into_ack(command),
                AttemptStep::Opened(Ok(Ok(link))) => {
                    info!(target: "Client", "Connected as {}", record.identity);
                    record.rekey(link.session_state());
                    self.persist(&record).await;
                    self.backoff.reset();
                    self.set_state(ConnectionState::Connected);
                    self.report_first(Ok(()));

                    match self.pump(link).await {
                        SessionEnd::Disconnect(ack) => break ack,
                        SessionEnd::Terminal => break None,
                        SessionEnd::Dropped => {}
                    }
                }
                AttemptStep::Opened(Ok(Err(e))) => {
                    warn!(target: "Client", "Connection attempt failed: {e}");
                    self.report_first(Err(ConnectError::HandshakeFailed(e.to_string())));
                }
                AttemptStep::Opened(Err(_)) => {
                    warn!(
                        target: "Client",
                        "Connection attempt timed out after {:?}",
                        self.config.handshake_timeout
                    );
                    self.report_first(Err(ConnectError::Timeout));
                }
            }

            self.set_state(ConnectionState::Disconnected);
            let delay = self.backoff.next_delay();
            info!(
                target: "Client",
                "Reconnecting in {delay:?} (attempt {})",
                self.backoff.attempts()
            );
            tokio::select! {
                biased;
                command = self.commands.recv() => break into_ack(command),
                _ = sleep(delay) => {}
            }

            match load_record(&self.store).await {
                Ok(Some(fresh)) if fresh.is_paired() => record = fresh,
                Ok(_) => {
                    warn!(target: "Client", "Stored credentials are gone, giving up");
                    self.set_state(ConnectionState::LoggedOut);
                    break None;
                }
                Err(e) => {
                    warn!(target: "Client", "Failed to reload credentials, reusing previous: {e}");
                }
            }
        };

        if !self.state().is_terminal() {
            self.set_state(ConnectionState::Disconnected);
        }
        self.report_first(Err(ConnectError::Cancelled));
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
        debug!(target: "Client", "Connection worker stopped");
    }

    /// Read frames until the connection ends.
    async fn pump(&mut self, mut link: Box<dyn Link>) -> SessionEnd {
        let end = loop {
            let step = tokio::select! {
                biased;
                command = self.commands.recv() => PumpStep::Command(command),
                frame = link.next_frame() => PumpStep::Frame(frame),
            };

            let frame = match step {
                PumpStep::Command(command) => break SessionEnd::Disconnect(into_ack(command)),
                PumpStep::Frame(Ok(Some(frame))) => frame,
                PumpStep::Frame(Ok(None)) => {
                    info!(target: "Client", "Server closed the connection");
                    break SessionEnd::Dropped;
                }
                PumpStep::Frame(Err(e)) => {
                    warn!(target: "Client", "Connection lost: {e}");
                    break SessionEnd::Dropped;
                }
            };

            let event = decode(&frame);
            let signal = match &event {
                InboundEvent::Connection(ConnectionEvent::Stream(signal)) => Some(signal.clone()),
                _ => None,
            };
            self.dispatcher.publish(event);

            match signal {
                Some(StreamSignal::Replaced) => {
                    warn!(target: "Client", "Session was replaced by another client");
                    self.set_state(ConnectionState::Replaced);
                    break SessionEnd::Terminal;
                }
                Some(StreamSignal::LoggedOut { reason }) => {
                    warn!(target: "Client", "Logged out by server (reason {reason}), clearing credentials");
                    let store = Arc::clone(&self.store);
                    match tokio::task::spawn_blocking(move || store.clear()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => error!(target: "Client", "Failed to clear credentials: {e}"),
                        Err(e) => error!(target: "Client", "Failed to clear credentials: {e}"),
                    }
                    self.set_state(ConnectionState::LoggedOut);
                    break SessionEnd::Terminal;
                }
                Some(StreamSignal::RestartRequired) => {
                    info!(target: "Client", "Server requested a reconnect");
                    break SessionEnd::Dropped;
                }
                Some(StreamSignal::ServiceUnavailable) => {
                    info!(target: "Client", "Service unavailable, will reconnect");
                    break SessionEnd::Dropped;
                }
                Some(StreamSignal::Other { code }) => {
                    debug!(target: "Client", "Unhandled stream signal {code}");
                }
                Some(StreamSignal::Authenticated) | None => {}
            }
        };

        link.close().await;
        end
    }

    /// Write the refreshed record before the connection is reported.
    async fn persist(&self, record: &SessionRecord) {
        let store = Arc::clone(&self.store);
        let record = record.clone();
        match tokio::task::spawn_blocking(move || store.save(&record)).await {
            Ok(Ok(())) => debug!(target: "Client", "Session record updated"),
            Ok(Err(e)) => error!(target: "Client", "Failed to save session record: {e}"),
            Err(e) => error!(target: "Client", "Failed to save session record: {e}"),
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, to: ConnectionState) {
        let from = self.state_tx.send_replace(to);
        if from == to {
            return;
        }
        info!(target: "Client", "Connection state: {from} -> {to}");
        self.dispatcher
            .publish(InboundEvent::Connection(ConnectionEvent::StateChanged { from, to }));
    }

    fn report_first(&mut self, result: Result<(), ConnectError>) {
        if let Some(tx) = self.first_result.take() {
            let _ = tx.send(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{self, kind, Envelope, Message};
    use crate::protocol::dispatch::{Subscription, TryRecv};
    use crate::socket::{PairingLink, SocketError};
    use crate::store::{DeviceIdentity, DeviceKeys, MemoryStore};
    use crate::types::JID;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use prost::Message as ProstMessage;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    const SERVER_STATE: &[u8] = b"server-static";

    enum Script {
        Fail,
        Hang,
        Channel(mpsc::UnboundedReceiver<Vec<u8>>),
    }

    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Script>>,
        opened_at: Mutex<Vec<Instant>>,
        seen_states: Mutex<Vec<Vec<u8>>>,
        closed: Arc<AtomicUsize>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            })
        }

        fn opens(&self) -> Vec<Instant> {
            self.opened_at.lock().unwrap().clone()
        }
    }

    struct ChannelLink {
        frames: mpsc::UnboundedReceiver<Vec<u8>>,
        closed: Arc<AtomicUsize>,
    }

    impl Link for ChannelLink {
        fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Vec<u8>>, SocketError>> {
            async move { Ok(self.frames.recv().await) }.boxed()
        }

        fn session_state(&self) -> Vec<u8> {
            SERVER_STATE.to_vec()
        }

        fn close(&mut self) -> BoxFuture<'_, ()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            async {}.boxed()
        }
    }

    impl Transport for ScriptedTransport {
        fn open<'a>(
            &'a self,
            record: &'a SessionRecord,
        ) -> BoxFuture<'a, Result<Box<dyn Link>, SocketError>> {
            self.opened_at.lock().unwrap().push(Instant::now());
            self.seen_states
                .lock()
                .unwrap()
                .push(record.session_state.clone());
            let next = self.script.lock().unwrap().pop_front().unwrap_or(Script::Hang);
            let closed = Arc::clone(&self.closed);
            async move {
                match next {
                    Script::Fail => Err(SocketError::ConnectionFailed("refused".to_string())),
                    Script::Hang => futures::future::pending().await,
                    Script::Channel(frames) => Ok(Box::new(ChannelLink { frames, closed }) as Box<dyn Link>),
                }
            }
            .boxed()
        }

        fn open_pairing<'a>(
            &'a self,
            _keys: &'a DeviceKeys,
        ) -> BoxFuture<'a, Result<Box<dyn PairingLink>, SocketError>> {
            async { Err(SocketError::ConnectionFailed("not scripted".to_string())) }.boxed()
        }
    }

    fn record() -> SessionRecord {
        SessionRecord::new(
            DeviceIdentity::new(JID::new_device("491701234567", 3)),
            DeviceKeys::generate(),
        )
    }

    fn config() -> ClientConfig {
        ClientConfig::default()
            .with_backoff(Duration::from_secs(1), Duration::from_secs(8), 0.5)
            .with_handshake_timeout(Duration::from_secs(5))
            .with_dispatcher_capacity(64)
    }

    fn manager(transport: Arc<ScriptedTransport>, store: Arc<MemoryStore>) -> ConnectionManager {
        ConnectionManager::new(config(), transport, store)
    }

    fn text_frame(id: &str, body: &str) -> Vec<u8> {
        Envelope {
            kind: kind::MESSAGE.to_string(),
            info: Some(proto::MessageInfo {
                id: id.to_string(),
                sender: "491709999999@s.whatsapp.net".to_string(),
                timestamp: 1_700_000_000,
                ..Default::default()
            }),
            message: Some(Message {
                conversation: Some(body.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
        .encode_to_vec()
    }

    fn stream_error(code: &str, conflict: &str) -> Vec<u8> {
        Envelope {
            kind: kind::STREAM_ERROR.to_string(),
            code: Some(code.to_string()),
            conflict: Some(conflict.to_string()),
            ..Default::default()
        }
        .encode_to_vec()
    }

    async fn wait_for_state(manager: &ConnectionManager, state: ConnectionState) {
        let mut changes = manager.state_changes();
        changes.wait_for(|s| *s == state).await.unwrap();
    }

    fn texts(sub: &mut Subscription) -> Vec<String> {
        let mut bodies = Vec::new();
        while let TryRecv::Event(event) = sub.try_recv() {
            if let InboundEvent::Text { body, .. } = event {
                bodies.push(body);
            }
        }
        bodies
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_two_failures() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let transport = ScriptedTransport::new(vec![Script::Fail, Script::Fail, Script::Channel(rx)]);
        let store = Arc::new(MemoryStore::with_record(record()));
        let manager = manager(transport.clone(), store);

        let first = manager.connect_stored().await;
        assert!(matches!(first, Err(ConnectError::HandshakeFailed(_))));

        wait_for_state(&manager, ConnectionState::Connected).await;
        let opens = transport.opens();
        assert_eq!(opens.len(), 3);
        let gaps: Vec<_> = opens.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps[0] >= Duration::from_secs(1));
        assert!(gaps[0] <= gaps[1]);
        assert!(gaps[1] <= Duration::from_secs(8) + Duration::from_millis(50));

        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_requires_pairing() {
        let transport = ScriptedTransport::new(Vec::new());
        let manager = manager(transport.clone(), Arc::new(MemoryStore::new()));

        assert_eq!(manager.connect_stored().await, Err(ConnectError::NotPaired));

        let unpaired = SessionRecord::new(DeviceIdentity::new(JID::default()), DeviceKeys::generate());
        assert_eq!(manager.connect(unpaired).await, Err(ConnectError::NotPaired));
        assert!(transport.opens().is_empty());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_twice() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let transport = ScriptedTransport::new(vec![Script::Channel(rx)]);
        let manager = manager(transport.clone(), Arc::new(MemoryStore::new()));

        manager.disconnect().await;
        manager.connect(record()).await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);

        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_frames_in_order_and_none_after_disconnect() {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = ScriptedTransport::new(vec![Script::Channel(rx)]);
        let manager = manager(transport, Arc::new(MemoryStore::new()));
        let mut sub = manager.dispatcher().subscribe();

        manager.connect(record()).await.unwrap();
        for (i, body) in ["one", "two", "three"].iter().enumerate() {
            tx.send(text_frame(&i.to_string(), body)).unwrap();
        }

        let mut received = Vec::new();
        while received.len() < 3 {
            match sub.recv().await {
                Some(InboundEvent::Text { body, .. }) => received.push(body),
                Some(_) => {}
                None => break,
            }
        }
        assert_eq!(received, vec!["one", "two", "three"]);

        manager.disconnect().await;
        let _ = tx.send(text_frame("late", "too late"));
        assert!(texts(&mut sub).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_is_terminal() {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = ScriptedTransport::new(vec![Script::Channel(rx)]);
        let manager = manager(transport.clone(), Arc::new(MemoryStore::new()));

        manager.connect(record()).await.unwrap();
        tx.send(stream_error("", "replaced")).unwrap();
        wait_for_state(&manager, ConnectionState::Replaced).await;

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.opens().len(), 1);

        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Replaced);
    }

    #[tokio::test]
    async fn test_logged_out_clears_store() {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = ScriptedTransport::new(vec![Script::Channel(rx)]);
        let store = Arc::new(MemoryStore::with_record(record()));
        let manager = manager(transport, store.clone());

        manager.connect_stored().await.unwrap();
        tx.send(stream_error("401", "device_removed")).unwrap();
        wait_for_state(&manager, ConnectionState::LoggedOut).await;
        manager.disconnect().await;

        assert_eq!(store.load().unwrap(), None);
        assert_eq!(manager.connect_stored().await, Err(ConnectError::NotPaired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_reloads_record() {
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (_tx2, rx2) = mpsc::unbounded_channel();
        let transport = ScriptedTransport::new(vec![Script::Channel(rx1), Script::Channel(rx2)]);
        let mut stored = record();
        let store = Arc::new(MemoryStore::with_record(stored.clone()));
        let manager = manager(transport.clone(), store.clone());

        manager.connect_stored().await.unwrap();
        stored.rekey(vec![4, 2]);
        store.save(&stored).unwrap();

        let mut changes = manager.state_changes();
        tx1.send(stream_error("515", "")).unwrap();
        changes
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;

        assert_eq!(transport.opens().len(), 2);
        assert_eq!(
            *transport.seen_states.lock().unwrap(),
            vec![Vec::new(), vec![4, 2]]
        );
        manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_connect_persists_session_state() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let transport = ScriptedTransport::new(vec![Script::Channel(rx)]);
        let original = record();
        let store = Arc::new(MemoryStore::with_record(original.clone()));
        let manager = manager(transport, store.clone());

        manager.connect_stored().await.unwrap();

        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.identity, original.identity);
        assert_eq!(saved.session_state, SERVER_STATE);
        assert!(saved.updated_at >= original.updated_at);
        manager.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let transport = ScriptedTransport::new(vec![Script::Hang]);
        let manager = manager(transport, Arc::new(MemoryStore::new()));

        assert_eq!(manager.connect(record()).await, Err(ConnectError::Timeout));
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_backoff() {
        let transport = ScriptedTransport::new(vec![Script::Fail]);
        let config = config().with_backoff(Duration::from_secs(600), Duration::from_secs(600), 0.0);
        let manager = ConnectionManager::new(config, transport.clone(), Arc::new(MemoryStore::new()));

        let start = Instant::now();
        assert!(manager.connect(record()).await.is_err());
        manager.disconnect().await;

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(transport.opens().len(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_state_changes_published() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let transport = ScriptedTransport::new(vec![Script::Channel(rx)]);
        let manager = manager(transport, Arc::new(MemoryStore::new()));
        let mut sub = manager.dispatcher().subscribe();

        manager.connect(record()).await.unwrap();
        manager.disconnect().await;

        let mut transitions = Vec::new();
        while let TryRecv::Event(event) = sub.try_recv() {
            if let InboundEvent::Connection(ConnectionEvent::StateChanged { to, .. }) = event {
                transitions.push(to);
            }
        }
        assert_eq!(
            transitions,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Disconnected
            ]
        );
    }
}
