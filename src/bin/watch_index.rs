//! Price index watcher.
//!
//! Subscribes to one channel and prints incoming ticks until the requested
//! number has arrived.
//!
//! ```bash
//! DERIBIT_CLIENT_ID=... DERIBIT_CLIENT_SECRET=... \
//!     cargo run --release --bin watch-index -- --ticks 10
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use clap::Parser;
use tracing::info;

use deribit_ws::client::DeribitClient;
use deribit_ws::config::Credentials;
use deribit_ws::transport::WsTransport;

#[derive(Parser, Debug)]
#[command(name = "watch-index")]
#[command(about = "Streams subscription ticks for one Deribit channel")]
struct Args {
    /// Subscription channel
    #[arg(short, long, default_value = "deribit_price_index.btc_usd")]
    channel: String,

    /// Number of ticks to print before exiting
    #[arg(short, long, default_value_t = 10)]
    ticks: u64,

    /// Connect to test.deribit.com instead of production
    #[arg(long)]
    testnet: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let credentials = Credentials::from_env()?;

    let transport = Arc::new(if args.testnet {
        WsTransport::testnet()
    } else {
        WsTransport::mainnet()
    });
    let mut client = DeribitClient::new(transport, credentials);

    // The handler runs on the dispatcher thread; the main thread sleeps on
    // the condvar until enough ticks came through.
    let seen = Arc::new((AtomicU64::new(0), Mutex::new(()), Condvar::new()));
    {
        let seen = Arc::clone(&seen);
        let want = args.ticks;
        client.register_subscription(
            &args.channel,
            Arc::new(move |pm| {
                info!(channel = pm.channel, data = pm.data, "tick");
                let n = seen.0.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= want {
                    drop(seen.1.lock().unwrap());
                    seen.2.notify_one();
                }
            }),
        );
    }

    client.connect()?;
    if !client.subscribe(&args.channel) {
        return Err("subscription denied by rate gate".into());
    }
    info!(channel = %args.channel, "subscribed, waiting for ticks");

    let mut guard = seen.1.lock().unwrap();
    while seen.0.load(Ordering::SeqCst) < args.ticks {
        guard = seen.2.wait(guard).unwrap();
    }
    drop(guard);

    info!(ticks = args.ticks, "done");
    client.close();
    Ok(())
}
