//! Frame classification and O(1) handler routing.
//!
//! One inbound JSON-RPC frame is parsed exactly once, classified as an RPC
//! response (an `id` field is present) or a subscription notification
//! (`method == "subscription"`), and routed to at most one pre-registered
//! handler. Everything else is ignored.
//!
//! Routing state is two fixed power-of-two tables indexed by `id & mask`
//! for RPC continuations and `fnv1a_32(channel) & mask` for subscription
//! handlers. Registration overwrites; collisions silently alias -- callers
//! pick IDs and channel namespaces that do not collide concurrently, and
//! the one layer that reuses an ID (the historical fetcher) serializes its
//! requests.
//!
//! Parsing borrows straight out of the frame buffer: `#[serde(borrow)]`
//! string views plus `&RawValue` ranges for `result` and `params.data`, so
//! the hot path does not allocate for payload text. [`ParsedMessage`]
//! carries those views with the frame's lifetime -- a handler that tries to
//! stash one fails to compile; handlers copy what they keep. The only owned
//! field is `access_token`, lifted eagerly because the auth continuation
//! always needs it past the call.

use std::sync::{Arc, Mutex, OnceLock};

use memchr::memmem;
use serde::Deserialize;
use serde_json::value::RawValue;
use tracing::debug;

/// RPC continuation table size. Bounds distinct concurrently in-flight IDs.
pub const MAX_INFLIGHT: usize = 4096;

/// Subscription handler table size.
pub const SUB_TABLE: usize = 4096;

/// Handler value stored in the dispatch tables.
///
/// A closure carrying its own captured state -- registration site owns the
/// state, the dispatcher borrows it for the duration of each call.
pub type Callback = Arc<dyn Fn(&ParsedMessage<'_>) + Send + Sync>;

/// Immutable view of one classified inbound frame.
///
/// Text fields borrow from the frame buffer and are valid only while the
/// handler runs. `access_token` is owned and may be kept.
#[derive(Default)]
pub struct ParsedMessage<'a> {
    /// Response to a previously sent RPC (an `id` field was present).
    pub is_rpc: bool,
    /// Server-pushed subscription notification.
    pub is_subscription: bool,
    /// The response carried an `error` object.
    pub is_error: bool,
    /// Correlation identifier; valid only when `is_rpc`.
    pub id: u64,
    /// Server error code when `is_error`.
    pub error_code: i64,
    /// Server error text when `is_error`.
    pub error_msg: &'a str,
    /// Channel name for notifications.
    pub channel: &'a str,
    /// Raw JSON payload for notifications.
    pub data: &'a str,
    /// Raw JSON result for successful responses.
    pub result: &'a str,
    /// Token lifted from `result.access_token`, when present.
    pub access_token: String,
    /// Server receive timestamp, microseconds.
    pub us_in: u64,
    /// Server send timestamp, microseconds.
    pub us_out: u64,
    /// Server processing time, microseconds.
    pub us_diff: u64,
}

/// FNV-1a over the channel name: offset basis 2166136261, prime 16777619.
#[inline]
#[must_use]
pub fn fnv1a_32(s: &str) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for &b in s.as_bytes() {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

/// Continuations for one in-flight RPC id. Active iff either side is set.
#[derive(Default)]
struct RpcSlot {
    on_success: Option<Callback>,
    on_error: Option<Callback>,
}

/// Parses frames and routes them to registered handlers.
///
/// A single dispatcher thread consumes frames; handlers execute
/// synchronously on it and must not block it for long. Registration may
/// happen from any thread: each slot sits behind its own mutex, and the
/// callback `Arc` is cloned out before invocation, so a handler may freely
/// re-register IDs or channels (including its own).
pub struct Dispatcher {
    rpc_table: Box<[Mutex<RpcSlot>]>,
    sub_table: Box<[Mutex<Option<Callback>>]>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rpc_table: (0..MAX_INFLIGHT)
                .map(|_| Mutex::new(RpcSlot::default()))
                .collect(),
            sub_table: (0..SUB_TABLE).map(|_| Mutex::new(None)).collect(),
        }
    }

    /// Register continuations for an RPC id, overwriting the slot at
    /// `id & (MAX_INFLIGHT - 1)`. Passing `None` for both deactivates it.
    pub fn register_rpc(
        &self,
        id: u64,
        on_success: Option<Callback>,
        on_error: Option<Callback>,
    ) {
        let mut slot = self.rpc_table[(id as usize) & (MAX_INFLIGHT - 1)]
            .lock()
            .unwrap();
        slot.on_success = on_success;
        slot.on_error = on_error;
    }

    /// Register a handler for a channel, overwriting the slot at
    /// `fnv1a_32(channel) & (SUB_TABLE - 1)`.
    pub fn register_subscription(&self, channel: &str, handler: Callback) {
        let idx = (fnv1a_32(channel) as usize) & (SUB_TABLE - 1);
        *self.sub_table[idx].lock().unwrap() = Some(handler);
    }

    /// Parse one frame and invoke at most one handler.
    ///
    /// Malformed JSON returns silently (logged at debug). A response with
    /// neither `result` nor `error` is dropped after its timing fields are
    /// consumed. Notifications for unregistered channels route nowhere.
    pub fn dispatch<'a>(&self, frame: &'a str) {
        let parsed: Frame<'a> = match serde_json::from_str(frame) {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, "dropping unparseable frame");
                return;
            }
        };

        let mut pm = ParsedMessage {
            us_in: parsed.us_in.unwrap_or(0),
            us_out: parsed.us_out.unwrap_or(0),
            us_diff: parsed.us_diff.unwrap_or(0),
            ..ParsedMessage::default()
        };

        if let Some(id) = parsed.id {
            pm.is_rpc = true;
            pm.id = id;
            self.route_rpc(&mut pm, &parsed);
        } else if parsed.method == Some("subscription") {
            pm.is_subscription = true;
            self.route_subscription(&mut pm, &parsed);
        }
    }

    fn route_rpc<'a>(&self, pm: &mut ParsedMessage<'a>, frame: &Frame<'a>) {
        let idx = (pm.id as usize) & (MAX_INFLIGHT - 1);

        if let Some(err) = &frame.error {
            pm.is_error = true;
            pm.error_code = err.code.unwrap_or(0);
            pm.error_msg = err.message.unwrap_or("");
            let cb = self.rpc_table[idx].lock().unwrap().on_error.clone();
            if let Some(cb) = cb {
                cb(pm);
            }
        } else if let Some(result) = frame.result {
            pm.result = result.get();
            if let Some(token) = extract_access_token(pm.result) {
                pm.access_token = token;
            }
            let cb = self.rpc_table[idx].lock().unwrap().on_success.clone();
            if let Some(cb) = cb {
                cb(pm);
            }
        }
        // Neither result nor error: timing fields were consumed, nothing to route.
    }

    fn route_subscription<'a>(&self, pm: &mut ParsedMessage<'a>, frame: &Frame<'a>) {
        let Some(params) = &frame.params else { return };
        let (Some(channel), Some(data)) = (params.channel, params.data) else {
            return;
        };
        pm.channel = channel;
        pm.data = data.get();

        let idx = (fnv1a_32(channel) as usize) & (SUB_TABLE - 1);
        let cb = self.sub_table[idx].lock().unwrap().clone();
        if let Some(cb) = cb {
            cb(pm);
        }
    }
}

/// Wire shape of one inbound frame. Unknown fields (`jsonrpc`, `testnet`,
/// ...) are skipped by serde.
#[derive(Deserialize)]
struct Frame<'a> {
    id: Option<u64>,
    #[serde(borrow)]
    method: Option<&'a str>,
    #[serde(borrow)]
    error: Option<WireError<'a>>,
    #[serde(borrow)]
    result: Option<&'a RawValue>,
    #[serde(borrow)]
    params: Option<WireParams<'a>>,
    #[serde(rename = "usIn")]
    us_in: Option<u64>,
    #[serde(rename = "usOut")]
    us_out: Option<u64>,
    #[serde(rename = "usDiff")]
    us_diff: Option<u64>,
}

#[derive(Deserialize)]
struct WireError<'a> {
    code: Option<i64>,
    #[serde(borrow)]
    message: Option<&'a str>,
}

#[derive(Deserialize)]
struct WireParams<'a> {
    #[serde(borrow)]
    channel: Option<&'a str>,
    #[serde(borrow)]
    data: Option<&'a RawValue>,
}

/// Lift `"access_token":"..."` out of an object result (cold path -- only
/// the auth response carries one).
///
/// Pattern seek + escape-aware scan instead of a second full parse. The
/// needle can in principle false-match inside a nested string value; no
/// Deribit result embeds that text outside the auth response, and a miss
/// there only costs a skipped token copy.
fn extract_access_token(result: &str) -> Option<String> {
    if !result.trim_start().starts_with('{') {
        return None;
    }

    static PATTERN: OnceLock<memmem::Finder<'static>> = OnceLock::new();
    let finder = PATTERN.get_or_init(|| memmem::Finder::new(b"\"access_token\":"));

    let buf = result.as_bytes();
    let mut pos = finder.find(buf)? + finder.needle().len();
    while pos < buf.len() && matches!(buf[pos], b' ' | b'\t' | b'\n' | b'\r') {
        pos += 1;
    }
    if pos >= buf.len() || buf[pos] != b'"' {
        return None;
    }
    pos += 1;
    let start = pos;
    while pos < buf.len() {
        match buf[pos] {
            b'"' => return result.get(start..pos).map(str::to_owned),
            b'\\' => pos += 2,
            _ => pos += 1,
        }
    }
    None
}
