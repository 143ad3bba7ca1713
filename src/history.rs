//! Paginated retrieval of historical OHLCV candles.
//!
//! `public/get_tradingview_chart_data` caps each response, so a request for
//! N candles walks backwards from now in windows of up to 1000, re-using a
//! single sentinel RPC id. The caller thread blocks on a condvar while the
//! dispatcher thread runs the batch continuations; batches are strictly
//! serialized, so the sentinel id never aliases itself.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::client::DeribitClient;
use crate::dispatch::{Callback, ParsedMessage};
use crate::error::{Error, Result};
use crate::types::{Ohlcv, now_ms, resolution_period_ms};

/// Server-side cap on candles per response.
const CHUNK: usize = 1000;

/// Sentinel RPC id reserved for chart-data batches.
const FETCH_ID: u64 = 0x00C0_FFEE;

/// Per-batch wait on the dispatcher delivering the response.
const BATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Backoff before re-sending a batch the rate gate denied.
const DENIED_BACKOFF: Duration = Duration::from_millis(200);

/// Batch rendezvous between the caller thread and the dispatcher thread.
struct FetchState {
    progress: Mutex<Progress>,
    batch_done: Condvar,
}

struct Progress {
    candles: Vec<Ohlcv>,
    done: bool,
}

/// Wire shape of a chart-data result: column arrays of equal length.
#[derive(Deserialize)]
struct ChartData {
    ticks: Vec<i64>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
    cost: Vec<f64>,
}

/// Fetch exactly `n` candles for `(instrument, resolution)`, oldest first.
///
/// Pages backwards from the current wall clock. Returns fewer than `n`
/// candles only when the server runs out of history or a batch times out;
/// over-fetch at the oldest edge is trimmed so the most recent `n` survive.
/// `resolution` must be one of `"1"`, `"5"`, `"15"`, `"60"`, `"1D"`.
///
/// Blocks the calling thread; the client's dispatcher thread must be
/// running (i.e. the client is connected).
pub fn fetch_n_ohlcv(
    client: &DeribitClient,
    instrument: &str,
    resolution: &str,
    n: usize,
) -> Result<Vec<Ohlcv>> {
    let period_ms = resolution_period_ms(resolution)
        .ok_or_else(|| Error::Resolution(resolution.to_owned()))?;
    if n == 0 {
        return Ok(Vec::new());
    }

    let state = Arc::new(FetchState {
        progress: Mutex::new(Progress {
            candles: Vec::with_capacity(n + CHUNK),
            done: false,
        }),
        batch_done: Condvar::new(),
    });

    let mut current_end_ts = now_ms();
    let mut last_len = 0usize;

    loop {
        let collected = state.progress.lock().unwrap().candles.len();
        if collected >= n {
            break;
        }
        let batch = (n - collected).min(CHUNK);
        // The window is inclusive on both ends: `batch` candles span
        // `batch - 1` periods.
        let current_start_ts = current_end_ts - (batch as i64 - 1) * period_ms;

        state.progress.lock().unwrap().done = false;

        let on_success: Callback = {
            let state = Arc::clone(&state);
            Arc::new(move |pm: &ParsedMessage<'_>| on_batch(&state, pm))
        };
        let on_error: Callback = {
            let state = Arc::clone(&state);
            Arc::new(move |pm: &ParsedMessage<'_>| {
                warn!(
                    code = pm.error_code,
                    message = pm.error_msg,
                    "chart data request failed"
                );
                finish_batch(&state);
            })
        };
        client
            .dispatcher()
            .register_rpc(FETCH_ID, Some(on_success), Some(on_error));

        // The wire resolution stays in its original spelling ("1D" included).
        let params = serde_json::json!({
            "instrument_name": instrument,
            "resolution": resolution,
            "start_timestamp": current_start_ts,
            "end_timestamp": current_end_ts,
        })
        .to_string();

        if !client.send_rpc(FETCH_ID, "public/get_tradingview_chart_data", &params) {
            // Rate-gated: retry the same window; the registration stays armed.
            std::thread::sleep(DENIED_BACKOFF);
            continue;
        }

        let guard = state.progress.lock().unwrap();
        let (guard, wait) = state
            .batch_done
            .wait_timeout_while(guard, BATCH_TIMEOUT, |p| !p.done)
            .unwrap();
        let len = guard.candles.len();
        drop(guard);

        if wait.timed_out() {
            warn!(collected = len, requested = n, "batch timed out, stopping pagination");
            break;
        }
        if len == last_len {
            debug!(collected = len, "server returned no further candles");
            break;
        }
        last_len = len;

        // Step past the window boundary so the edge candle is not fetched twice.
        current_end_ts = current_start_ts - 1;
    }

    let mut out = std::mem::take(&mut state.progress.lock().unwrap().candles);
    out.sort_by_key(|c| c.ts_ms);
    if out.len() > n {
        // Over-fetch lands at the oldest edge; keep the most recent n.
        let excess = out.len() - n;
        out.drain(..excess);
    }
    Ok(out)
}

/// Success continuation: decode the column arrays, append one candle per
/// index, and release the waiting caller.
fn on_batch(state: &FetchState, pm: &ParsedMessage<'_>) {
    match serde_json::from_str::<ChartData>(pm.result) {
        Ok(chart) => {
            let mut progress = state.progress.lock().unwrap();
            append_candles(&mut progress.candles, &chart);
            progress.done = true;
        }
        Err(e) => {
            // "no_data" and friends arrive as a result without the arrays.
            debug!(error = %e, "chart payload had no candle arrays");
            state.progress.lock().unwrap().done = true;
        }
    }
    state.batch_done.notify_one();
}

fn finish_batch(state: &FetchState) {
    state.progress.lock().unwrap().done = true;
    state.batch_done.notify_one();
}

fn append_candles(out: &mut Vec<Ohlcv>, chart: &ChartData) {
    let len = chart.ticks.len();
    if chart.open.len() != len
        || chart.high.len() != len
        || chart.low.len() != len
        || chart.close.len() != len
        || chart.volume.len() != len
        || chart.cost.len() != len
    {
        warn!(len, "ragged chart arrays, skipping batch");
        return;
    }
    for i in 0..len {
        out.push(Ohlcv {
            ts_ms: chart.ticks[i],
            open: chart.open[i],
            high: chart.high[i],
            low: chart.low[i],
            close: chart.close[i],
            volume: chart.volume[i],
            cost: chart.cost[i],
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::chart_result;

    fn decode(json: &str) -> ChartData {
        serde_json::from_str(json).expect("chart fixture decodes")
    }

    #[test]
    fn append_emits_one_candle_per_index() {
        let chart = decode(&chart_result(1_700_000_000_000, 3, 60_000));
        let mut out = Vec::new();
        append_candles(&mut out, &chart);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].ts_ms, 1_700_000_000_000);
        assert_eq!(out[1].ts_ms, 1_700_000_060_000);
        assert_eq!(out[2].ts_ms, 1_700_000_120_000);
        assert_eq!(out[0].open, 100.0);
        assert_eq!(out[2].close, 102.25);
    }

    #[test]
    fn ragged_arrays_append_nothing() {
        let json = r#"{"ticks":[1,2,3],"open":[1.0],"high":[1.0,2.0,3.0],
                       "low":[1.0,2.0,3.0],"close":[1.0,2.0,3.0],
                       "volume":[1.0,2.0,3.0],"cost":[1.0,2.0,3.0]}"#;
        let chart = decode(json);
        let mut out = Vec::new();
        append_candles(&mut out, &chart);
        assert!(out.is_empty());
    }

    #[test]
    fn empty_arrays_are_a_valid_empty_batch() {
        let chart = decode(&chart_result(0, 0, 60_000));
        let mut out = Vec::new();
        append_candles(&mut out, &chart);
        assert!(out.is_empty());
    }
}
