//! Candle persistence: CSV for inspection, raw binary for fast reloads.
//!
//! The binary layout is a little-endian `u64` record count followed by
//! fixed 56-byte records (`i64` timestamp, six `f64` fields) -- no parsing
//! on load, one allocation for the whole vector.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::types::Ohlcv;

/// Bytes per on-disk record.
const RECORD_SIZE: usize = 56;

/// Write candles as CSV with a header row.
pub fn save_csv(candles: &[Ohlcv], path: &Path) -> io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "ts_ms,open,high,low,close,volume,cost")?;
    for c in candles {
        writeln!(
            w,
            "{},{},{},{},{},{},{}",
            c.ts_ms, c.open, c.high, c.low, c.close, c.volume, c.cost
        )?;
    }
    w.flush()
}

/// Write candles in the raw binary layout.
pub fn save_bin(candles: &[Ohlcv], path: &Path) -> io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(&(candles.len() as u64).to_le_bytes())?;
    for c in candles {
        w.write_all(&c.ts_ms.to_le_bytes())?;
        w.write_all(&c.open.to_le_bytes())?;
        w.write_all(&c.high.to_le_bytes())?;
        w.write_all(&c.low.to_le_bytes())?;
        w.write_all(&c.close.to_le_bytes())?;
        w.write_all(&c.volume.to_le_bytes())?;
        w.write_all(&c.cost.to_le_bytes())?;
    }
    w.flush()
}

/// Load candles written by [`save_bin`]. Fails on short reads.
pub fn load_bin(path: &Path) -> io::Result<Vec<Ohlcv>> {
    let mut r = BufReader::new(File::open(path)?);

    let mut count_buf = [0u8; 8];
    r.read_exact(&mut count_buf)?;
    let count = usize::try_from(u64::from_le_bytes(count_buf))
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record count overflow"))?;

    let mut candles = Vec::with_capacity(count);
    let mut record = [0u8; RECORD_SIZE];
    for _ in 0..count {
        r.read_exact(&mut record)?;
        let f = |i: usize| f64::from_le_bytes(record[i..i + 8].try_into().unwrap());
        candles.push(Ohlcv {
            ts_ms: i64::from_le_bytes(record[0..8].try_into().unwrap()),
            open: f(8),
            high: f(16),
            low: f(24),
            close: f(32),
            volume: f(40),
            cost: f(48),
        });
    }
    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Ohlcv> {
        vec![
            Ohlcv {
                ts_ms: 1_700_000_000_000,
                open: 97000.0,
                high: 97500.5,
                low: 96800.25,
                close: 97400.0,
                volume: 12.75,
                cost: 1_238_000.0,
            },
            Ohlcv {
                ts_ms: 1_700_000_060_000,
                open: 97400.0,
                high: 97450.0,
                low: 97100.0,
                close: 97200.0,
                volume: 3.5,
                cost: 340_000.0,
            },
        ]
    }

    #[test]
    fn bin_round_trip() {
        let dir = std::env::temp_dir();
        let path = dir.join("deribit_ws_persist_test.bin");
        let candles = sample();

        save_bin(&candles, &path).unwrap();
        let loaded = load_bin(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, candles);
    }

    #[test]
    fn truncated_bin_is_an_error() {
        let dir = std::env::temp_dir();
        let path = dir.join("deribit_ws_persist_truncated.bin");

        save_bin(&sample(), &path).unwrap();
        let full = std::fs::read(&path).unwrap();
        std::fs::write(&path, &full[..full.len() - 10]).unwrap();

        let err = load_bin(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn csv_has_header_and_rows() {
        let dir = std::env::temp_dir();
        let path = dir.join("deribit_ws_persist_test.csv");

        save_csv(&sample(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("ts_ms,open,high,low,close,volume,cost"));
        assert_eq!(
            lines.next(),
            Some("1700000000000,97000,97500.5,96800.25,97400,12.75,1238000")
        );
        assert_eq!(lines.count(), 1);
    }
}
