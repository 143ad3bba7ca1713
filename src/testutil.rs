//! Shared test fixtures.
//!
//! Inbound frame builders used across multiple `#[cfg(test)]` modules.

/// Successful RPC response frame carrying a raw-JSON `result`.
pub(crate) fn rpc_ok_frame(id: u64, result: &str) -> String {
    format!(r#"{{"jsonrpc":"2.0","id":{id},"result":{result},"usIn":1,"usOut":2,"usDiff":1}}"#)
}

/// Error RPC response frame.
pub(crate) fn rpc_error_frame(id: u64, code: i64, message: &str) -> String {
    format!(
        r#"{{"jsonrpc":"2.0","id":{id},"error":{{"code":{code},"message":"{message}"}}}}"#
    )
}

/// Subscription notification frame.
pub(crate) fn sub_frame(channel: &str, data: &str) -> String {
    format!(
        r#"{{"jsonrpc":"2.0","method":"subscription","params":{{"channel":"{channel}","data":{data}}}}}"#
    )
}

/// `get_tradingview_chart_data` result with `count` contiguous candles
/// starting at `start_ts` and spaced `period_ms` apart.
pub(crate) fn chart_result(start_ts: i64, count: usize, period_ms: i64) -> String {
    let join = |f: &dyn Fn(usize) -> String| {
        (0..count).map(f).collect::<Vec<_>>().join(",")
    };
    let ticks = join(&|i| (start_ts + i as i64 * period_ms).to_string());
    let open = join(&|i| format!("{}.0", 100 + i));
    let high = join(&|i| format!("{}.5", 101 + i));
    let low = join(&|i| format!("{}.5", 99 + i));
    let close = join(&|i| format!("{}.25", 100 + i));
    let volume = join(&|i| format!("{}.1", 10 + i % 7));
    let cost = join(&|i| format!("{}.0", 1000 + i));
    format!(
        r#"{{"ticks":[{ticks}],"open":[{open}],"high":[{high}],"low":[{low}],"close":[{close}],"volume":[{volume}],"cost":[{cost}]}}"#
    )
}
