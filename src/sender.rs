//! Sender worker: flushes the outbound queue to the transport.
//!
//! Frames for `private/...` methods get the current access token spliced
//! into their params object just before the closing brace. The token comes
//! through the narrow [`AccessTokenProvider`] capability so this module
//! never names the client type.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use memchr::memmem;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::rate_limit::TokenBucket;
use crate::spsc::SpscQueue;
use crate::transport::Transport;

/// Read-side capability for the current OAuth access token.
///
/// Returns an owned copy; an empty string means not authenticated yet.
pub trait AccessTokenProvider: Send + Sync {
    fn current_token(&self) -> String;
}

/// Interval between rate-gate polls while the flush bucket is empty.
const GATE_POLL: Duration = Duration::from_millis(1);

/// Background worker that pops the outbound queue (it is the queue's sole
/// consumer), paces flushes with its own token bucket, injects the access
/// token into private RPCs, and writes to the transport.
///
/// Admission control proper happens at the façade before enqueue; the
/// bucket here only paces what is already queued. The sender never closes
/// the transport.
pub struct Sender {
    transport: Arc<dyn Transport>,
    outbound: Arc<SpscQueue<String>>,
    auth: Arc<dyn AccessTokenProvider>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Sender {
    pub fn new(
        transport: Arc<dyn Transport>,
        outbound: Arc<SpscQueue<String>>,
        auth: Arc<dyn AccessTokenProvider>,
    ) -> Self {
        Self {
            transport,
            outbound,
            auth,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Spawn the flush loop.
    pub fn start(&mut self) -> Result<()> {
        self.running.store(true, Ordering::Release);

        let transport = Arc::clone(&self.transport);
        let outbound = Arc::clone(&self.outbound);
        let auth = Arc::clone(&self.auth);
        let running = Arc::clone(&self.running);

        let handle = std::thread::Builder::new()
            .name("ws-sender".into())
            .spawn(move || {
                info!("sender thread started");
                let mut bucket = TokenBucket::new();

                'run: while running.load(Ordering::Acquire) {
                    while !bucket.allow() {
                        if !running.load(Ordering::Acquire) {
                            break 'run;
                        }
                        std::thread::sleep(GATE_POLL);
                    }

                    let Some(mut frame) = outbound.pop() else {
                        std::thread::yield_now();
                        continue;
                    };

                    if is_private(&frame) {
                        let token = auth.current_token();
                        if token.is_empty() {
                            warn!("private RPC queued before auth completed, sending without token");
                        } else {
                            frame = splice_token(frame, &token);
                        }
                    }

                    transport.send_text(&frame);
                }
                info!("sender thread exiting");
            })
            .map_err(Error::Spawn)?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Stop and join. Leaves the transport open for the receiver side.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        info!("sender stopped");
    }
}

/// Does the frame invoke a `private/...` method?
fn is_private(frame: &str) -> bool {
    use std::sync::OnceLock;
    static PATTERN: OnceLock<memmem::Finder<'static>> = OnceLock::new();
    PATTERN
        .get_or_init(|| memmem::Finder::new(b"\"private/"))
        .find(frame.as_bytes())
        .is_some()
}

/// Splice `"access_token":"<token>"` into the params object, just before
/// its terminating brace.
///
/// `params` is the last field of every outbound frame, so its closing brace
/// is the last `}` before the frame's final one. Frames that do not look
/// like that are passed through untouched.
fn splice_token(mut frame: String, token: &str) -> String {
    let Some(outer) = frame.rfind('}') else {
        return frame;
    };
    let Some(inner) = frame[..outer].rfind('}') else {
        return frame;
    };
    let sep = if frame[..inner].ends_with('{') { "" } else { "," };
    frame.insert_str(inner, &format!("{sep}\"access_token\":\"{token}\""));
    frame
}
