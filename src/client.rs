//! Client façade: wires transport, queues, workers, and dispatcher into a
//! single connected session and owns the lifecycle.
//!
//! Thread layout once connected:
//! - receiver thread: transport reads -> inbound queue (producer)
//! - sender thread: outbound queue (consumer) -> rate gate -> transport
//! - dispatcher thread: inbound queue (consumer) -> handler routing
//! - application threads: `subscribe` / `send_rpc` -> outbound queue (producer)
//!
//! The access token is written by the dispatcher thread (auth continuation)
//! and read by the sender, so it lives behind a read-mostly lock in shared
//! state; the sender reaches it through the [`AccessTokenProvider`]
//! capability and never names this type. Shutdown is cooperative: a cleared
//! atomic connected flag plus an empty-string sentinel through the inbound
//! queue, then joins in dependency order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::Credentials;
use crate::dispatch::{Callback, Dispatcher, ParsedMessage};
use crate::error::{Error, Result};
use crate::rate_limit::TokenBucket;
use crate::receiver::Receiver;
use crate::sender::{AccessTokenProvider, Sender};
use crate::spsc::SpscQueue;
use crate::transport::Transport;

/// Reserved RPC id for the `public/auth` exchange.
const AUTH_ID: u64 = 9001;

/// Fixed RPC id used by [`DeribitClient::subscribe`].
const SUBSCRIBE_ID: u64 = 1001;

/// Inbound queue slots. Sized for notification bursts; the receiver drops
/// frames (with a warning) rather than block the socket when it fills.
const INBOUND_CAPACITY: usize = 4096;

/// Outbound queue slots. Requests are rate-gated upstream, so this rarely
/// holds more than a handful of frames.
const OUTBOUND_CAPACITY: usize = 1024;

/// Grace period for the receiver's in-flight socket read during `close`.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// State shared between the façade, the dispatcher thread, and the sender.
struct SharedState {
    /// Written once by the auth continuation, read per private flush.
    access_token: RwLock<String>,
    connected: AtomicBool,
}

impl AccessTokenProvider for SharedState {
    fn current_token(&self) -> String {
        self.access_token.read().unwrap().clone()
    }
}

/// A single-connection Deribit JSON-RPC session.
pub struct DeribitClient {
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    inbound: Arc<SpscQueue<String>>,
    outbound: Arc<SpscQueue<String>>,
    receiver: Receiver,
    sender: Sender,
    /// Admission gate for caller-side requests. Mutex because any
    /// application thread may call `send_rpc`/`subscribe`.
    rate: Mutex<TokenBucket>,
    credentials: Credentials,
    shared: Arc<SharedState>,
    dispatch_thread: Option<JoinHandle<()>>,
    closed: AtomicBool,
}

impl DeribitClient {
    /// Wire the pipeline around a transport. Nothing runs until
    /// [`connect`](Self::connect).
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, credentials: Credentials) -> Self {
        let inbound = Arc::new(SpscQueue::new(INBOUND_CAPACITY));
        let outbound = Arc::new(SpscQueue::new(OUTBOUND_CAPACITY));
        let shared = Arc::new(SharedState {
            access_token: RwLock::new(String::new()),
            connected: AtomicBool::new(false),
        });

        let receiver = Receiver::new(Arc::clone(&transport), Arc::clone(&inbound));
        let sender = Sender::new(
            Arc::clone(&transport),
            Arc::clone(&outbound),
            Arc::clone(&shared) as Arc<dyn AccessTokenProvider>,
        );

        Self {
            transport,
            dispatcher: Arc::new(Dispatcher::new()),
            inbound,
            outbound,
            receiver,
            sender,
            rate: Mutex::new(TokenBucket::new()),
            credentials,
            shared,
            dispatch_thread: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Connect the transport, start all three worker threads, and kick off
    /// authentication.
    pub fn connect(&mut self) -> Result<()> {
        self.transport.connect()?;
        self.shared.connected.store(true, Ordering::Release);

        self.receiver.start()?;
        self.sender.start()?;

        let dispatcher = Arc::clone(&self.dispatcher);
        let inbound = Arc::clone(&self.inbound);
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("dispatch".into())
            .spawn(move || {
                loop {
                    let frame = inbound.wait_and_pop();
                    // Empty string doubles as the shutdown sentinel.
                    if frame.is_empty() || !shared.connected.load(Ordering::Acquire) {
                        break;
                    }
                    dispatcher.dispatch(&frame);
                }
                info!("dispatcher thread exiting");
            })
            .map_err(Error::Spawn)?;
        self.dispatch_thread = Some(handle);

        self.authenticate()
    }

    /// Send `public/auth` with the client-credentials grant. The success
    /// continuation stores the returned access token in shared state for
    /// the sender to splice into private RPCs.
    pub fn authenticate(&self) -> Result<()> {
        if self.credentials.client_id.is_empty() || self.credentials.client_secret.is_empty() {
            return Err(Error::Config("client credentials are not loaded".into()));
        }

        let shared = Arc::clone(&self.shared);
        self.dispatcher.register_rpc(
            AUTH_ID,
            Some(Arc::new(move |pm: &ParsedMessage<'_>| {
                if pm.access_token.is_empty() {
                    error!("auth response carried no access_token");
                    return;
                }
                *shared.access_token.write().unwrap() = pm.access_token.clone();
                info!("authenticated, access token stored");
            })),
            Some(Arc::new(|pm: &ParsedMessage<'_>| {
                error!(
                    code = pm.error_code,
                    message = pm.error_msg,
                    "authentication failed"
                );
            })),
        );

        let params = serde_json::json!({
            "grant_type": "client_credentials",
            "client_id": self.credentials.client_id,
            "client_secret": self.credentials.client_secret,
        })
        .to_string();

        if self.send_rpc(AUTH_ID, "public/auth", &params) {
            info!("auth request sent");
        } else {
            warn!("auth request denied by rate gate");
        }
        Ok(())
    }

    /// Register a handler for a subscription channel. May be called before
    /// or after `connect`; before [`subscribe`](Self::subscribe) in either
    /// case, or the first notifications race the registration.
    pub fn register_subscription(&self, channel: &str, handler: Callback) {
        self.dispatcher.register_subscription(channel, handler);
    }

    /// Enqueue a `public/subscribe` for one channel at the fixed id 1001.
    ///
    /// Returns false when the rate gate denies or the outbound queue is
    /// full; the subscription was not sent and the caller may retry.
    pub fn subscribe(&self, channel: &str) -> bool {
        if !self.rate.lock().unwrap().allow() {
            warn!(channel, "rate limit exceeded, subscribe dropped");
            return false;
        }
        let params = serde_json::json!({ "channels": [channel] }).to_string();
        let frame = format!(
            r#"{{"jsonrpc":"2.0","id":{SUBSCRIBE_ID},"method":"public/subscribe","params":{params}}}"#
        );
        self.enqueue(frame)
    }

    /// Format and enqueue a JSON-RPC request. `params_json` must be a
    /// preformatted JSON value.
    ///
    /// Returns false when the rate gate denies or the outbound queue is
    /// full; nothing was queued. Delivery to the socket is asynchronous --
    /// callers correlate the response through a handler registered at `id`.
    pub fn send_rpc(&self, id: u64, method: &str, params_json: &str) -> bool {
        if !self.rate.lock().unwrap().allow() {
            warn!(id, method, "rate limit hit, request denied");
            return false;
        }
        let frame = format!(
            r#"{{"jsonrpc":"2.0","id":{id},"method":"{method}","params":{params_json}}}"#
        );
        self.enqueue(frame)
    }

    fn enqueue(&self, frame: String) -> bool {
        if self.outbound.push(frame).is_err() {
            warn!("outbound queue full, dropping request");
            return false;
        }
        true
    }

    /// Current access token; empty until authentication completes.
    #[must_use]
    pub fn access_token(&self) -> String {
        self.shared.current_token()
    }

    /// The dispatcher, for direct handler registration (used by the
    /// historical fetcher and advanced callers).
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Shut everything down and join every worker. Idempotent; also runs on
    /// drop. Safe to call from any thread that owns the client.
    pub fn close(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shared.connected.store(false, Ordering::Release);

        // Unblock the dispatcher. A full inbound queue is fine: the next
        // popped frame hits the cleared connected flag and exits anyway.
        let _ = self.inbound.push(String::new());

        self.receiver.request_stop();
        // Let an in-flight socket read return before tearing down.
        std::thread::sleep(CLOSE_GRACE);

        self.sender.stop();
        self.receiver.stop();

        if let Some(handle) = self.dispatch_thread.take() {
            let _ = handle.join();
        }
        info!("client closed");
    }
}

impl Drop for DeribitClient {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::transport::Transport;

    /// Transport that never connects -- enough to exercise the façade's
    /// pure-bookkeeping paths.
    struct NullTransport;

    impl Transport for NullTransport {
        fn connect(&self) -> Result<()> {
            Ok(())
        }
        fn send_text(&self, _msg: &str) {}
        fn read_text(&self) -> String {
            String::new()
        }
        fn close(&self) {}
    }

    fn test_client() -> DeribitClient {
        DeribitClient::new(
            Arc::new(NullTransport),
            Credentials {
                client_id: "id".into(),
                client_secret: "secret".into(),
            },
        )
    }

    #[test]
    fn burst_of_25_admits_exactly_20() {
        let client = test_client();
        let results: Vec<bool> = (0..25)
            .map(|i| client.send_rpc(i, "public/ping", "{}"))
            .collect();

        assert_eq!(results.iter().filter(|&&ok| ok).count(), 20);
        assert!(results[..20].iter().all(|&ok| ok));
        assert!(results[20..].iter().all(|&ok| !ok));
    }

    #[test]
    fn send_rpc_formats_jsonrpc_envelope() {
        let client = test_client();
        assert!(client.send_rpc(42, "public/ping", "{}"));
        let frame = client.outbound.pop().expect("frame queued");
        assert_eq!(
            frame,
            r#"{"jsonrpc":"2.0","id":42,"method":"public/ping","params":{}}"#
        );
    }

    #[test]
    fn subscribe_uses_fixed_id() {
        let client = test_client();
        assert!(client.subscribe("deribit_price_index.btc_usd"));
        let frame = client.outbound.pop().expect("frame queued");
        assert!(frame.starts_with(r#"{"jsonrpc":"2.0","id":1001,"method":"public/subscribe""#));
        assert!(frame.contains(r#""channels":["deribit_price_index.btc_usd"]"#));
    }

    #[test]
    fn authenticate_without_credentials_is_fatal() {
        let client = DeribitClient::new(
            Arc::new(NullTransport),
            Credentials {
                client_id: String::new(),
                client_secret: String::new(),
            },
        );
        assert!(matches!(client.authenticate(), Err(Error::Config(_))));
    }

    #[test]
    fn access_token_starts_empty() {
        let client = test_client();
        assert!(client.access_token().is_empty());
    }

    #[test]
    fn close_before_connect_is_harmless_and_idempotent() {
        let mut client = test_client();
        client.close();
        client.close();
    }
}
