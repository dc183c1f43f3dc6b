//! WebSocket transport built on tokio-tungstenite.

use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use log::{debug, warn};
use prost::Message as ProstMessage;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::ClientConfig;
use crate::crypto::{Cipher, KeyPair};
use crate::proto::{self, kind, ClientPayload, Envelope};
use crate::socket::{
    encode_frame, ClientHandshake, FrameDecoder, Link, PairSignal, PairingLink, SocketError,
    Transport, WA_HEADER,
};
use crate::store::{DeviceKeys, SessionRecord};
use crate::types::JID;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to the WhatsApp websocket endpoint.
#[derive(Debug, Clone)]
pub struct WsTransport {
    endpoint: String,
    origin: String,
    push_name: Option<String>,
}

impl WsTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            origin: config.origin.clone(),
            push_name: config.push_name.clone(),
        }
    }

    async fn dial(&self, static_key: &KeyPair, payload: ClientPayload) -> Result<NoiseConn, SocketError> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| SocketError::ConnectionFailed(e.to_string()))?;
        let origin = HeaderValue::from_str(&self.origin)
            .map_err(|e| SocketError::ConnectionFailed(e.to_string()))?;
        request.headers_mut().insert(header::ORIGIN, origin);

        debug!(target: "Client", "Dialing {}", self.endpoint);
        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| SocketError::ConnectionFailed(e.to_string()))?;

        let mut conn = NoiseConn {
            ws,
            decoder: FrameDecoder::new(),
            ciphers: None,
            server_static: Vec::new(),
        };

        let mut handshake = ClientHandshake::new(static_key.clone());
        conn.send_raw(encode_frame(&handshake.client_hello(), Some(&WA_HEADER))?)
            .await?;

        let server_hello = conn.recv_raw().await?.ok_or(SocketError::ConnectionClosed)?;
        handshake.read_server_hello(&server_hello)?;

        let finish = handshake.client_finish(&payload)?;
        conn.send_raw(encode_frame(&finish, None)?).await?;

        conn.server_static = handshake.server_static().map(|key| key.to_vec()).unwrap_or_default();
        conn.ciphers = Some(handshake.into_transport()?);
        debug!(target: "Client", "Noise handshake complete");
        Ok(conn)
    }
}

impl Transport for WsTransport {
    fn open<'a>(&'a self, record: &'a SessionRecord) -> BoxFuture<'a, Result<Box<dyn Link>, SocketError>> {
        async move {
            let push_name = self.push_name.as_deref().or(record.push_name.as_deref());
            let payload = proto::make_login_payload(record.identity.jid(), push_name);
            let conn = self.dial(&record.keys.noise_key, payload).await?;
            Ok(Box::new(WsLink { conn }) as Box<dyn Link>)
        }
        .boxed()
    }

    fn open_pairing<'a>(
        &'a self,
        keys: &'a DeviceKeys,
    ) -> BoxFuture<'a, Result<Box<dyn PairingLink>, SocketError>> {
        async move {
            let payload = proto::make_registration_payload(keys, self.push_name.as_deref());
            let conn = self.dial(&keys.noise_key, payload).await?;
            Ok(Box::new(WsPairingLink { conn }) as Box<dyn PairingLink>)
        }
        .boxed()
    }
}

/// Websocket plus the transport ciphers once the handshake is done.
struct NoiseConn {
    ws: WsStream,
    decoder: FrameDecoder,
    ciphers: Option<(Cipher, Cipher)>,
    /// Server static key learned in the handshake.
    server_static: Vec<u8>,
}

impl NoiseConn {
    async fn send_raw(&mut self, frame: Vec<u8>) -> Result<(), SocketError> {
        self.ws
            .send(Message::Binary(frame))
            .await
            .map_err(|e| SocketError::ConnectionFailed(e.to_string()))
    }

    /// Next raw frame, or `None` once the server closed the socket.
    async fn recv_raw(&mut self) -> Result<Option<Vec<u8>>, SocketError> {
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return Ok(Some(frame));
            }
            match self.ws.next().await {
                Some(Ok(Message::Binary(data))) => self.decoder.push(&data),
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        debug!(target: "Client", "Server closed socket: {} {}", frame.code, frame.reason);
                    }
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(SocketError::ConnectionFailed(e.to_string())),
                None => return Ok(None),
            }
        }
    }

    async fn send_payload(&mut self, plaintext: &[u8]) -> Result<(), SocketError> {
        let (write, _) = self
            .ciphers
            .as_mut()
            .ok_or_else(|| SocketError::HandshakeFailed("not connected".to_string()))?;
        let sealed = write.encrypt(plaintext, &[])?;
        self.send_raw(encode_frame(&sealed, None)?).await
    }

    async fn recv_payload(&mut self) -> Result<Option<Vec<u8>>, SocketError> {
        let Some(sealed) = self.recv_raw().await? else {
            return Ok(None);
        };
        let (_, read) = self
            .ciphers
            .as_mut()
            .ok_or_else(|| SocketError::HandshakeFailed("not connected".to_string()))?;
        Ok(Some(read.decrypt(&sealed, &[])?))
    }

    async fn recv_envelope(&mut self) -> Result<Envelope, SocketError> {
        let frame = self.recv_payload().await?.ok_or(SocketError::ConnectionClosed)?;
        Ok(Envelope::decode(frame.as_slice())?)
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            debug!(target: "Client", "Error closing websocket: {e}");
        }
    }
}

struct WsLink {
    conn: NoiseConn,
}

impl Link for WsLink {
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Vec<u8>>, SocketError>> {
        self.conn.recv_payload().boxed()
    }

    fn session_state(&self) -> Vec<u8> {
        self.conn.server_static.clone()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        self.conn.close().boxed()
    }
}

struct WsPairingLink {
    conn: NoiseConn,
}

impl PairingLink for WsPairingLink {
    fn request_refs(&mut self) -> BoxFuture<'_, Result<Vec<String>, SocketError>> {
        async move {
            let request = Envelope {
                kind: kind::PAIR_REQUEST.to_string(),
                ..Default::default()
            };
            self.conn.send_payload(&request.encode_to_vec()).await?;

            loop {
                let envelope = self.conn.recv_envelope().await?;
                match envelope.kind.as_str() {
                    kind::PAIR_DEVICE if envelope.refs.is_empty() => {
                        return Err(SocketError::Protocol("pair-device without refs".to_string()))
                    }
                    kind::PAIR_DEVICE => return Ok(envelope.refs),
                    kind::FAILURE => {
                        return Err(SocketError::Protocol(format!(
                            "pairing refused with reason {}",
                            envelope.reason.unwrap_or_default()
                        )))
                    }
                    other => debug!(target: "Pairing", "Ignoring {other} while waiting for refs"),
                }
            }
        }
        .boxed()
    }

    fn next_signal(&mut self) -> BoxFuture<'_, Result<PairSignal, SocketError>> {
        async move {
            loop {
                let envelope = self.conn.recv_envelope().await?;
                match envelope.kind.as_str() {
                    kind::PAIR_SUCCESS => {
                        let raw = envelope.jid.unwrap_or_default();
                        let jid: JID = raw
                            .parse()
                            .map_err(|e| SocketError::Protocol(format!("bad device JID {raw:?}: {e}")))?;
                        return Ok(PairSignal::Scanned {
                            jid,
                            push_name: envelope.name,
                            business_name: envelope.business_name,
                            platform: envelope.platform.unwrap_or_default(),
                        });
                    }
                    kind::FAILURE => {
                        return Ok(PairSignal::Rejected {
                            reason: envelope.reason.unwrap_or_default().to_string(),
                        })
                    }
                    other => warn!(target: "Pairing", "Unexpected {other} during pairing"),
                }
            }
        }
        .boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        self.conn.close().boxed()
    }
}
