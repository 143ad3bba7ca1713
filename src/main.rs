//! Historical candle downloader.
//!
//! Connects to Deribit, pages down N OHLCV candles for one instrument, and
//! optionally persists them as CSV and/or raw binary.
//!
//! ```bash
//! DERIBIT_CLIENT_ID=... DERIBIT_CLIENT_SECRET=... \
//!     cargo run --release -- -i BTC-PERPETUAL -r 60 -n 20000 --csv candles.csv
//! ```

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use deribit_ws::client::DeribitClient;
use deribit_ws::config::{Config, Credentials};
use deribit_ws::history::fetch_n_ohlcv;
use deribit_ws::persist;
use deribit_ws::transport::WsTransport;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    let credentials = Credentials::from_env()?;

    let transport = Arc::new(if config.testnet {
        WsTransport::testnet()
    } else {
        WsTransport::mainnet()
    });

    let mut client = DeribitClient::new(transport, credentials);
    client.connect()?;

    info!(
        instrument = %config.instrument,
        resolution = %config.resolution,
        count = config.count,
        "fetching history"
    );
    let candles = fetch_n_ohlcv(&client, &config.instrument, &config.resolution, config.count)?;
    info!(fetched = candles.len(), "history downloaded");

    if let (Some(first), Some(last)) = (candles.first(), candles.last()) {
        info!(
            from_ts_ms = first.ts_ms,
            to_ts_ms = last.ts_ms,
            first_open = first.open,
            last_close = last.close,
            "range"
        );
    }

    if let Some(path) = &config.csv {
        persist::save_csv(&candles, path)?;
        info!(path = %path.display(), "csv written");
    }
    if let Some(path) = &config.bin {
        persist::save_bin(&candles, path)?;
        info!(path = %path.display(), "binary written");
    }

    client.close();
    Ok(())
}
