// In: src/sampling/transport.rs

//! Cross-thread transport: moves any observation stream onto a dedicated
//! producer thread behind a bounded channel.
//!
//! The producer pulls the wrapped stream and sends each item; the bounded
//! channel applies backpressure, so a slow consumer stalls the producer
//! instead of growing a queue. Shutdown is explicit and race-free: dropping
//! the consumer endpoint disconnects the channel, the producer's next send
//! fails, and it exits; `stop` then joins the thread. Delivery order is the
//! producer's draw order.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};

use crate::error::MinibenchError;
use crate::sampling::samplers::Observation;
use crate::traits::Element;

/// Default bound for the transport channel. Large enough to keep a producer
/// busy across consumer hiccups, small enough that a stalled consumer holds
/// at most this many decoded windows in memory.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// The consumer end of a streamed pipeline: an iterator over the producer's
/// items plus explicit shutdown.
pub struct StreamChannel<T: Element> {
    rx: Option<Receiver<Result<Observation<T>, MinibenchError>>>,
    handle: Option<JoinHandle<()>>,
}

/// Spawns a named producer thread that drains `stream` into a bounded
/// channel and returns the consumer end.
pub fn channel_stream<T, S>(stream: S, capacity: usize) -> Result<StreamChannel<T>, MinibenchError>
where
    T: Element,
    S: Iterator<Item = Result<Observation<T>, MinibenchError>> + Send + 'static,
{
    let (tx, rx) = bounded(capacity);

    let handle = thread::Builder::new()
        .name("minibench-stream".to_string())
        .spawn(move || {
            for item in stream {
                // A send fails only on disconnect: the consumer hung up, so
                // stop pulling the stream.
                if tx.send(item).is_err() {
                    break;
                }
            }
        })
        .map_err(|e| {
            MinibenchError::ChannelError(format!("failed to spawn producer thread: {}", e))
        })?;

    Ok(StreamChannel {
        rx: Some(rx),
        handle: Some(handle),
    })
}

impl<T: Element> StreamChannel<T> {
    /// Disconnects from the producer and joins its thread. Safe to call
    /// more than once; iteration after `stop` yields nothing.
    pub fn stop(&mut self) {
        self.rx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl<T: Element> Iterator for StreamChannel<T> {
    type Item = Result<Observation<T>, MinibenchError>;

    fn next(&mut self) -> Option<Self::Item> {
        // recv errors only when the producer finished and the channel
        // drained; that is the end of the stream.
        self.rx.as_ref().and_then(|rx| rx.recv().ok())
    }
}

impl<T: Element> Drop for StreamChannel<T> {
    fn drop(&mut self) {
        self.stop();
    }
}
