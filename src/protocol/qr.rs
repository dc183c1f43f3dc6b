//! QR code pairing session.
//!
//! A session asks the server for a batch of pairing refs and turns each
//! into a [`PairingTicket`] that lives until the next one is due. It ends
//! with exactly one terminal event: [`PairingEvent::Paired`] once the scan
//! is confirmed and the new identity is saved, or [`PairingEvent::Expired`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::Stream;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::time::{sleep, sleep_until, timeout, Instant};

use crate::config::ClientConfig;
use crate::protocol::backoff::Backoff;
use crate::socket::{PairSignal, PairingLink, SocketError, Transport};
use crate::store::{CredentialStore, DeviceIdentity, DeviceKeys, SessionRecord, StoreError};

/// One scannable code.
#[derive(Debug, Clone, PartialEq)]
pub struct PairingTicket {
    /// Payload to render as a QR code.
    pub code: String,
    /// Position in the session, starting at 0.
    pub index: usize,
    pub issued_at: Instant,
    pub ttl: Duration,
}

/// Stand-in deadline for TTLs too large to represent as an instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

impl PairingTicket {
    pub fn expires_at(&self) -> Instant {
        self.issued_at
            .checked_add(self.ttl)
            .unwrap_or_else(|| self.issued_at + FAR_FUTURE)
    }
}

/// Why a pairing session ended without a paired device.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpiryReason {
    #[error("no scan before the last code expired")]
    Timeout,
    #[error("could not generate pairing codes: {0}")]
    TicketGeneration(String),
    #[error("pairing rejected by server (reason {0})")]
    Rejected(String),
    #[error("paired but failed to save credentials: {0}")]
    Store(StoreError),
    #[error("connection lost during pairing: {0}")]
    ConnectionLost(String),
}

/// Item produced by a [`PairingSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum PairingEvent {
    Ticket(PairingTicket),
    Paired(DeviceIdentity),
    Expired(ExpiryReason),
}

/// Pairing failure as seen by callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PairingError {
    #[error("pairing expired: {0}")]
    Expired(ExpiryReason),
    #[error("pairing rejected (reason {0})")]
    Rejected(String),
}

impl From<ExpiryReason> for PairingError {
    fn from(reason: ExpiryReason) -> Self {
        match reason {
            ExpiryReason::Rejected(code) => PairingError::Rejected(code),
            other => PairingError::Expired(other),
        }
    }
}

/// Build the QR payload for one ref.
pub fn ticket_code(reference: &str, keys: &DeviceKeys) -> String {
    format!(
        "{},{},{},{}",
        reference,
        STANDARD.encode(keys.noise_key.public),
        STANDARD.encode(keys.identity_key.public),
        STANDARD.encode(keys.adv_secret_key)
    )
}

/// Pairing state machine over a [`PairingLink`].
pub struct PairingSession {
    keys: DeviceKeys,
    link: Box<dyn PairingLink>,
    store: Arc<dyn CredentialStore>,
    config: ClientConfig,
    refs: Option<VecDeque<String>>,
    issued: usize,
    deadline: Option<Instant>,
    done: bool,
}

impl PairingSession {
    /// Generate fresh device keys and open a pairing connection.
    pub async fn begin(
        transport: &dyn Transport,
        store: Arc<dyn CredentialStore>,
        config: &ClientConfig,
    ) -> Result<Self, PairingError> {
        let keys = DeviceKeys::generate();
        let link = match timeout(config.handshake_timeout, transport.open_pairing(&keys)).await {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => return Err(ExpiryReason::TicketGeneration(e.to_string()).into()),
            Err(_) => {
                return Err(ExpiryReason::TicketGeneration("handshake timed out".to_string()).into())
            }
        };
        Ok(Self::new(keys, link, store, config.clone()))
    }

    pub fn new(
        keys: DeviceKeys,
        link: Box<dyn PairingLink>,
        store: Arc<dyn CredentialStore>,
        config: ClientConfig,
    ) -> Self {
        Self {
            keys,
            link,
            store,
            config,
            refs: None,
            issued: 0,
            deadline: None,
            done: false,
        }
    }

    /// Next event, or `None` after the terminal event was returned.
    pub async fn next_event(&mut self) -> Option<PairingEvent> {
        if self.done {
            return None;
        }

        if self.refs.is_none() {
            match self.fetch_refs().await {
                Ok(refs) => self.refs = Some(refs),
                Err(reason) => return Some(self.finish(PairingEvent::Expired(reason)).await),
            }
        }

        if let Some(deadline) = self.deadline.take() {
            let outcome = tokio::select! {
                signal = self.link.next_signal() => Some(signal),
                _ = sleep_until(deadline) => None,
            };
            if let Some(signal) = outcome {
                let event = self.on_signal(signal).await;
                return Some(self.finish(event).await);
            }
            debug!(target: "Pairing", "Code {} expired", self.issued - 1);
        }

        let next = self.refs.as_mut().and_then(VecDeque::pop_front);
        match next {
            Some(reference) => Some(PairingEvent::Ticket(self.issue(&reference))),
            None => {
                info!(target: "Pairing", "All {} pairing codes expired without a scan", self.issued);
                Some(self.finish(PairingEvent::Expired(ExpiryReason::Timeout)).await)
            }
        }
    }

    /// Abandon the session and close its connection. Later calls to
    /// [`next_event`](Self::next_event) return `None`.
    pub async fn cancel(&mut self) {
        if self.done {
            return;
        }
        info!(target: "Pairing", "Pairing cancelled after {} code(s)", self.issued);
        self.done = true;
        self.deadline = None;
        self.link.close().await;
    }

    /// Consume the session as a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = PairingEvent> {
        futures::stream::unfold(self, |mut session| async move {
            session.next_event().await.map(|event| (event, session))
        })
    }

    fn issue(&mut self, reference: &str) -> PairingTicket {
        let ttl = if self.issued == 0 {
            self.config.first_ticket_ttl
        } else {
            self.config.ticket_ttl
        };
        let ticket = PairingTicket {
            code: ticket_code(reference, &self.keys),
            index: self.issued,
            issued_at: Instant::now(),
            ttl,
        };
        self.issued += 1;
        self.deadline = Some(ticket.expires_at());
        info!(target: "Pairing", "Issued pairing code {} (valid for {:?})", ticket.index, ttl);
        ticket
    }

    async fn fetch_refs(&mut self) -> Result<VecDeque<String>, ExpiryReason> {
        let attempts = self.config.pairing_ref_attempts.max(1);
        let mut backoff = Backoff::from_config(&self.config);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.link.request_refs().await {
                Ok(refs) if !refs.is_empty() => {
                    debug!(target: "Pairing", "Received {} pairing refs", refs.len());
                    return Ok(refs.into());
                }
                Ok(_) => last_error = "server sent no pairing refs".to_string(),
                Err(e) => last_error = e.to_string(),
            }
            warn!(target: "Pairing", "Pairing code generation failed (attempt {attempt}/{attempts}): {last_error}");
            if attempt < attempts {
                sleep(backoff.next_delay()).await;
            }
        }
        Err(ExpiryReason::TicketGeneration(last_error))
    }

    async fn on_signal(&mut self, signal: Result<PairSignal, SocketError>) -> PairingEvent {
        match signal {
            Ok(PairSignal::Scanned {
                jid,
                push_name,
                business_name,
                platform,
            }) => {
                let identity = DeviceIdentity::new(jid);
                let mut record = SessionRecord::new(identity.clone(), self.keys.clone());
                record.push_name = push_name.or_else(|| self.config.push_name.clone());
                record.business_name = business_name;
                record.platform = platform;

                let store = Arc::clone(&self.store);
                let saved = tokio::task::spawn_blocking(move || store.save(&record))
                    .await
                    .unwrap_or_else(|e| Err(StoreError::Io(e.to_string())));
                match saved {
                    Ok(()) => {
                        info!(target: "Pairing", "Successfully paired {identity}");
                        PairingEvent::Paired(identity)
                    }
                    Err(e) => {
                        warn!(target: "Pairing", "Paired {identity} but saving failed: {e}");
                        PairingEvent::Expired(ExpiryReason::Store(e))
                    }
                }
            }
            Ok(PairSignal::Rejected { reason }) => {
                warn!(target: "Pairing", "Server rejected pairing with reason {reason}");
                PairingEvent::Expired(ExpiryReason::Rejected(reason))
            }
            Err(e) => PairingEvent::Expired(ExpiryReason::ConnectionLost(e.to_string())),
        }
    }

    async fn finish(&mut self, event: PairingEvent) -> PairingEvent {
        self.done = true;
        self.deadline = None;
        self.link.close().await;
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreResult};
    use crate::types::JID;
    use futures::future::BoxFuture;
    use futures::{FutureExt, StreamExt};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ScriptedLink {
        refs: VecDeque<Result<Vec<String>, SocketError>>,
        signal: Option<(Instant, Result<PairSignal, SocketError>)>,
        closed: Arc<AtomicBool>,
    }

    impl PairingLink for ScriptedLink {
        fn request_refs(&mut self) -> BoxFuture<'_, Result<Vec<String>, SocketError>> {
            let next = self
                .refs
                .pop_front()
                .unwrap_or(Err(SocketError::ConnectionClosed));
            async move { next }.boxed()
        }

        fn next_signal(&mut self) -> BoxFuture<'_, Result<PairSignal, SocketError>> {
            async move {
                let Some(at) = self.signal.as_ref().map(|(at, _)| *at) else {
                    return futures::future::pending().await;
                };
                sleep_until(at).await;
                match self.signal.take() {
                    Some((_, signal)) => signal,
                    None => futures::future::pending().await,
                }
            }
            .boxed()
        }

        fn close(&mut self) -> BoxFuture<'_, ()> {
            self.closed.store(true, Ordering::SeqCst);
            async {}.boxed()
        }
    }

    struct FailingStore;

    impl CredentialStore for FailingStore {
        fn load(&self) -> StoreResult<Option<SessionRecord>> {
            Ok(None)
        }
        fn save(&self, _record: &SessionRecord) -> StoreResult<()> {
            Err(StoreError::Io("disk full".to_string()))
        }
        fn clear(&self) -> StoreResult<()> {
            Ok(())
        }
    }

    fn refs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("2@ref{i}")).collect()
    }

    fn session(
        refs: Vec<Result<Vec<String>, SocketError>>,
        signal: Option<(Duration, Result<PairSignal, SocketError>)>,
        store: Arc<dyn CredentialStore>,
    ) -> (PairingSession, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        let link = ScriptedLink {
            refs: refs.into(),
            signal: signal.map(|(after, signal)| (Instant::now() + after, signal)),
            closed: Arc::clone(&closed),
        };
        let config = ClientConfig::default()
            .with_backoff(Duration::from_secs(1), Duration::from_secs(4), 0.0);
        (
            PairingSession::new(DeviceKeys::generate(), Box::new(link), store, config),
            closed,
        )
    }

    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(50),
            "elapsed {elapsed:?}, expected {expected:?}"
        );
    }

    fn scanned() -> PairSignal {
        PairSignal::Scanned {
            jid: JID::new_device("491701234567", 7),
            push_name: Some("Phone".to_string()),
            business_name: None,
            platform: "android".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_scan_expires_after_last_ticket() {
        let store = Arc::new(MemoryStore::new());
        let (mut session, closed) = session(vec![Ok(refs(3))], None, store.clone());
        let start = Instant::now();

        let mut ttls = Vec::new();
        while let Some(PairingEvent::Ticket(ticket)) = session.next_event().await {
            assert_eq!(ticket.index, ttls.len());
            assert!(ticket.code.starts_with(&format!("2@ref{},", ticket.index)));
            ttls.push(ticket.ttl.as_secs());
            if ttls.len() == 3 {
                break;
            }
        }
        assert_eq!(ttls, vec![60, 20, 20]);

        assert_eq!(
            session.next_event().await,
            Some(PairingEvent::Expired(ExpiryReason::Timeout))
        );
        assert_elapsed(start, Duration::from_secs(100));
        assert_eq!(session.next_event().await, None);
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(store.load().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_closes_link_and_ends_session() {
        let store = Arc::new(MemoryStore::new());
        let (mut session, closed) = session(vec![Ok(refs(3))], None, store.clone());

        assert!(matches!(session.next_event().await, Some(PairingEvent::Ticket(_))));
        session.cancel().await;
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(session.next_event().await, None);
        assert_eq!(store.load().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_saves_before_paired() {
        let store = Arc::new(MemoryStore::new());
        let (session, closed) = session(
            vec![Ok(refs(5))],
            Some((Duration::from_secs(70), Ok(scanned()))),
            store.clone(),
        );

        let events: Vec<_> = session.into_stream().collect().await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], PairingEvent::Ticket(ref t) if t.index == 0));
        assert!(matches!(events[1], PairingEvent::Ticket(ref t) if t.index == 1));

        let identity = DeviceIdentity::new(JID::new_device("491701234567", 7));
        assert_eq!(events[2], PairingEvent::Paired(identity.clone()));

        let record = store.load().unwrap().unwrap();
        assert_eq!(record.identity, identity);
        assert_eq!(record.push_name.as_deref(), Some("Phone"));
        assert_eq!(record.platform, "android");
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_ends_session() {
        let (session, _closed) = session(
            vec![Ok(refs(2))],
            Some((
                Duration::from_secs(5),
                Ok(PairSignal::Rejected {
                    reason: "401".to_string(),
                }),
            )),
            Arc::new(MemoryStore::new()),
        );

        let events: Vec<_> = session.into_stream().collect().await;
        let last = events.last().cloned().unwrap();
        assert_eq!(
            last,
            PairingEvent::Expired(ExpiryReason::Rejected("401".to_string()))
        );
        if let PairingEvent::Expired(reason) = last {
            assert_eq!(
                PairingError::from(reason),
                PairingError::Rejected("401".to_string())
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ref_generation_retried_then_succeeds() {
        let (mut session, _closed) = session(
            vec![
                Err(SocketError::ConnectionClosed),
                Ok(Vec::new()),
                Ok(refs(1)),
            ],
            None,
            Arc::new(MemoryStore::new()),
        );
        let start = Instant::now();

        let event = session.next_event().await;
        assert!(matches!(event, Some(PairingEvent::Ticket(_))));
        assert_elapsed(start, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ref_generation_gives_up() {
        let (mut session, closed) = session(Vec::new(), None, Arc::new(MemoryStore::new()));

        let event = session.next_event().await;
        assert!(matches!(
            event,
            Some(PairingEvent::Expired(ExpiryReason::TicketGeneration(_)))
        ));
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(session.next_event().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_failure_is_not_paired() {
        let (session, _closed) = session(
            vec![Ok(refs(1))],
            Some((Duration::from_secs(1), Ok(scanned()))),
            Arc::new(FailingStore),
        );

        let events: Vec<_> = session.into_stream().collect().await;
        assert!(!events
            .iter()
            .any(|event| matches!(event, PairingEvent::Paired(_))));
        assert!(matches!(
            events.last(),
            Some(PairingEvent::Expired(ExpiryReason::Store(_)))
        ));
    }

    #[test]
    fn test_huge_ttl_gets_distant_deadline() {
        let config: ClientConfig = serde_json::from_str(r#"{ "first_ticket_ttl": 1e19 }"#).unwrap();
        let ticket = PairingTicket {
            code: String::new(),
            index: 0,
            issued_at: Instant::now(),
            ttl: config.first_ticket_ttl,
        };
        assert!(ticket.expires_at() >= ticket.issued_at + Duration::from_secs(86400 * 365));
    }

    #[test]
    fn test_ticket_code_format() {
        let keys = DeviceKeys::generate();
        let code = ticket_code("2@abc", &keys);
        let parts: Vec<_> = code.split(',').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "2@abc");
        assert_eq!(STANDARD.decode(parts[1]).unwrap(), keys.noise_key.public);
        assert_eq!(STANDARD.decode(parts[3]).unwrap(), keys.adv_secret_key);
    }
}
