//! CLI configuration and API credentials.

use std::path::PathBuf;

use clap::Parser;

use crate::error::{Error, Result};

/// CLI options shared by the demo binaries.
#[derive(Parser, Debug, Clone)]
#[command(name = "fetch-history")]
#[command(about = "Downloads historical OHLCV candles from Deribit over a JSON-RPC WebSocket")]
pub struct Config {
    /// Instrument name (e.g., BTC-PERPETUAL)
    #[arg(short, long, default_value = "BTC-PERPETUAL")]
    pub instrument: String,

    /// Candle resolution: 1, 5, 15, 60, or 1D
    #[arg(short, long, default_value = "60")]
    pub resolution: String,

    /// Number of candles to fetch
    #[arg(short = 'n', long, default_value_t = 20_000)]
    pub count: usize,

    /// Connect to test.deribit.com instead of production
    #[arg(long)]
    pub testnet: bool,

    /// Write the candles to this CSV file
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Write the candles to this binary file
    #[arg(long)]
    pub bin: Option<PathBuf>,
}

/// OAuth2 client-credentials pair.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    /// Load from `DERIBIT_CLIENT_ID` / `DERIBIT_CLIENT_SECRET`. Either
    /// variable missing is a fatal configuration error.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            client_id: require_env("DERIBIT_CLIENT_ID")?,
            client_secret: require_env("DERIBIT_CLIENT_SECRET")?,
        })
    }
}

fn require_env(var: &'static str) -> Result<String> {
    std::env::var(var).map_err(|_| Error::Config(format!("missing environment variable: {var}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_env_var_is_config_error() {
        let err = require_env("DERIBIT_WS_TEST_UNSET_VARIABLE").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("DERIBIT_WS_TEST_UNSET_VARIABLE"));
    }
}
