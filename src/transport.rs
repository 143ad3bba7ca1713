//! Secure WebSocket transport adapter.
//!
//! The core only needs four synchronous operations -- connect, send a text
//! frame, read a text frame, close -- so they live behind the [`Transport`]
//! trait and the rest of the pipeline never names the concrete socket type.
//! Tests substitute a scripted in-memory transport.
//!
//! [`WsTransport`] is the production adapter: blocking `tungstenite` over
//! `native-tls`. The receiver reads and the sender writes concurrently, so
//! the socket sits behind a mutex and carries a short read timeout; the
//! reader re-acquires the lock between polls, which bounds how long a write
//! can be held up and lets `close()` from any thread unblock an in-flight
//! read within one poll interval.

use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use native_tls::TlsConnector;
use tracing::{debug, info, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Connector, Message, WebSocket};

use crate::error::Result;

/// Production Deribit endpoint.
pub const MAINNET_HOST: &str = "www.deribit.com";

/// Testnet endpoint. Served with a certificate chain that fails strict
/// verification, so the testnet constructor disables it.
pub const TESTNET_HOST: &str = "test.deribit.com";

/// JSON-RPC v2 WebSocket path, common to both endpoints.
pub const API_PATH: &str = "/ws/api/v2";

/// Read poll interval. Upper bound on sender lock wait and on close latency.
const READ_POLL: Duration = Duration::from_millis(50);

/// Synchronous text-frame transport used by the receiver and sender workers.
pub trait Transport: Send + Sync {
    /// Establish the connection. Fails on TCP, TLS, or handshake errors.
    fn connect(&self) -> Result<()>;

    /// Write one UTF-8 text frame. Transient errors are logged and swallowed.
    fn send_text(&self, msg: &str);

    /// Block until one text frame arrives. Returns an empty string on error
    /// or when the transport is shutting down.
    fn read_text(&self) -> String;

    /// Initiate a normal close. Idempotent; unblocks a pending read.
    fn close(&self);
}

type WsStream = WebSocket<MaybeTlsStream<TcpStream>>;

/// Blocking WebSocket client for a single Deribit endpoint.
pub struct WsTransport {
    host: &'static str,
    verify_certs: bool,
    socket: Mutex<Option<WsStream>>,
    open: AtomicBool,
}

impl WsTransport {
    /// Adapter for `www.deribit.com` with certificate verification on.
    #[must_use]
    pub fn mainnet() -> Self {
        Self::with_host(MAINNET_HOST, true)
    }

    /// Adapter for `test.deribit.com` with certificate verification off.
    #[must_use]
    pub fn testnet() -> Self {
        Self::with_host(TESTNET_HOST, false)
    }

    fn with_host(host: &'static str, verify_certs: bool) -> Self {
        Self {
            host,
            verify_certs,
            socket: Mutex::new(None),
            open: AtomicBool::new(false),
        }
    }
}

impl Transport for WsTransport {
    fn connect(&self) -> Result<()> {
        info!(host = self.host, "connecting");

        let tcp = TcpStream::connect((self.host, 443))?;
        tcp.set_nodelay(true)?;

        let tls = TlsConnector::builder()
            .danger_accept_invalid_certs(!self.verify_certs)
            .build()?;

        let request = format!("wss://{}{}", self.host, API_PATH).into_client_request()?;
        let (ws, response) =
            tungstenite::client_tls_with_config(request, tcp, None, Some(Connector::NativeTls(tls)))
                .map_err(|e| match e {
                    tungstenite::HandshakeError::Failure(err) => err,
                    tungstenite::HandshakeError::Interrupted(_) => tungstenite::Error::Io(
                        std::io::Error::new(std::io::ErrorKind::WouldBlock, "handshake interrupted"),
                    ),
                })?;
        debug!(status = %response.status(), "websocket handshake complete");

        // Installed only after the handshakes: a blocking handshake read must
        // not trip the poll timeout. The timeout is what lets read and write
        // share one socket and turns close() into a prompt read unblock.
        match ws.get_ref() {
            MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(READ_POLL))?,
            MaybeTlsStream::NativeTls(stream) => {
                stream.get_ref().set_read_timeout(Some(READ_POLL))?;
            }
            _ => {}
        }

        *self.socket.lock().unwrap() = Some(ws);
        self.open.store(true, Ordering::Release);
        info!(host = self.host, "websocket connected");
        Ok(())
    }

    fn send_text(&self, msg: &str) {
        let mut guard = self.socket.lock().unwrap();
        let Some(ws) = guard.as_mut() else {
            warn!("send on unconnected transport, frame dropped");
            return;
        };
        if let Err(e) = ws.send(Message::Text(msg.to_owned())) {
            warn!(error = %e, "websocket send failed");
        }
    }

    fn read_text(&self) -> String {
        loop {
            if !self.open.load(Ordering::Acquire) {
                return String::new();
            }
            let mut guard = self.socket.lock().unwrap();
            let Some(ws) = guard.as_mut() else {
                return String::new();
            };
            match ws.read() {
                Ok(Message::Text(text)) => return text,
                Ok(Message::Close(_)) | Err(tungstenite::Error::ConnectionClosed) => {
                    self.open.store(false, Ordering::Release);
                    return String::new();
                }
                // Ping/pong/binary carry nothing for the dispatcher;
                // tungstenite queues pong replies internally.
                Ok(_) => {}
                Err(tungstenite::Error::Io(e))
                    if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
                {
                    // Poll expired: release the lock so a pending send runs.
                    drop(guard);
                }
                Err(e) => {
                    if self.open.swap(false, Ordering::AcqRel) {
                        warn!(error = %e, "websocket read failed");
                    }
                    return String::new();
                }
            }
        }
    }

    fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut guard = self.socket.lock().unwrap();
        if let Some(ws) = guard.as_mut() {
            if let Err(e) = ws.close(None) {
                debug!(error = %e, "close handshake did not complete");
            }
        }
        info!("websocket closed");
    }
}
