//! Receiver worker: drains the transport into the inbound queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::spsc::SpscQueue;
use crate::transport::Transport;

/// Background worker that reads text frames from the transport and pushes
/// them into the inbound queue (it is the queue's sole producer).
///
/// A full queue drops the frame with a warning: blocking here would starve
/// the socket and eventually get the connection dropped server-side.
pub struct Receiver {
    transport: Arc<dyn Transport>,
    inbound: Arc<SpscQueue<String>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Receiver {
    pub fn new(transport: Arc<dyn Transport>, inbound: Arc<SpscQueue<String>>) -> Self {
        Self {
            transport,
            inbound,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Spawn the read loop.
    ///
    /// The loop exits when the running flag clears or when the transport
    /// yields an empty frame -- a read unblocked by `close()` and a genuine
    /// end-of-stream look identical, and both mean stop.
    pub fn start(&mut self) -> Result<()> {
        self.running.store(true, Ordering::Release);

        let transport = Arc::clone(&self.transport);
        let inbound = Arc::clone(&self.inbound);
        let running = Arc::clone(&self.running);

        let handle = std::thread::Builder::new()
            .name("ws-receiver".into())
            .spawn(move || {
                info!("receiver thread started");
                while running.load(Ordering::Acquire) {
                    let frame = transport.read_text();
                    if frame.is_empty() {
                        debug!("empty read, treating as end of stream");
                        break;
                    }
                    if inbound.push(frame).is_err() {
                        warn!("inbound queue full, dropping frame");
                    }
                }
                info!("receiver thread exiting");
            })
            .map_err(Error::Spawn)?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Ask the loop to exit at its next iteration boundary. Does not touch
    /// the transport, so an in-flight read keeps blocking until it returns.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Stop and join. Closes the transport, which unblocks a pending read.
    pub fn stop(&mut self) {
        self.request_stop();
        self.transport.close();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        info!("receiver stopped");
    }
}
