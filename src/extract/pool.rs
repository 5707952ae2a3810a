//! Bounded worker pool for value decompression and type conversion.
//!
//! Frame consumption must never wait on a conversion, so the extractor hands
//! each channel's compressed payload to this pool and carries on. Results are
//! keyed by channel identity through the returned [`PendingValue`], never by
//! completion order. Each worker owns its own scratch allocator; the
//! scheduler passes buffers to exactly one worker, so reuse never crosses a
//! thread boundary.

use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::buffer::ScratchAllocator;
use crate::compression::decompress_data;
use crate::error::{Result, StreamError};
use crate::schema::ChannelConfig;
use crate::types::{ChannelValue, Timestamp};

struct Job {
    config: ChannelConfig,
    payload: Bytes,
    reply: oneshot::Sender<Result<ChannelValue>>,
}

/// Shared, process-wide pool of conversion workers.
///
/// Tasks are independent, side-effect-free conversions; the pool makes no
/// ordering promises across tasks.
pub struct ConversionPool {
    queues: Vec<mpsc::UnboundedSender<Job>>,
    next: AtomicUsize,
    cancel: CancellationToken,
}

impl ConversionPool {
    /// Spawn a pool sized to available parallelism, but never fewer than two
    /// workers.
    ///
    /// Workers are spawned immediately, so this must be called from within a
    /// Tokio runtime and panics outside one.
    pub fn new() -> Self {
        Self::with_workers(default_workers())
    }

    /// Spawn a pool with an explicit worker count (minimum one).
    ///
    /// Same runtime requirement as [`new`](ConversionPool::new).
    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        let cancel = CancellationToken::new();
        let mut queues = Vec::with_capacity(workers);
        for id in 0..workers {
            let (tx, rx) = mpsc::unbounded_channel();
            queues.push(tx);
            tokio::spawn(worker_loop(id, rx, cancel.clone()));
        }
        debug!(workers, "conversion pool started");
        Self { queues, next: AtomicUsize::new(0), cancel }
    }

    /// Number of workers.
    pub fn workers(&self) -> usize {
        self.queues.len()
    }

    /// Schedule one channel's payload for decompression and conversion.
    ///
    /// Never blocks. The result is resolved on first access through the
    /// returned [`PendingValue`].
    pub fn schedule(
        &self,
        config: ChannelConfig,
        payload: Bytes,
        timestamp: Timestamp,
    ) -> PendingValue {
        let (reply, rx) = oneshot::channel();
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.queues.len();
        // A closed queue drops the reply sender, which resolves as Closed.
        let _ = self.queues[slot].send(Job { config, payload, reply });
        PendingValue { timestamp, rx }
    }

    /// Stop the workers. Conversions already running may finish, but their
    /// results become unreachable; nothing is published after close.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Default for ConversionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConversionPool {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2).max(2)
}

async fn worker_loop(id: usize, mut rx: mpsc::UnboundedReceiver<Job>, cancel: CancellationToken) {
    let mut scratch = ScratchAllocator::new();
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let result = convert(&job.config, &job.payload, &mut scratch);
        trace!(worker = id, channel = %job.config.name, ok = result.is_ok(), "conversion done");
        if cancel.is_cancelled() {
            break;
        }
        // Receiver may have given up waiting; that is not an error here.
        let _ = job.reply.send(result);
    }
    debug!(worker = id, "conversion worker stopped");
}

fn convert(
    config: &ChannelConfig,
    payload: &Bytes,
    scratch: &mut ScratchAllocator,
) -> Result<ChannelValue> {
    let raw = decompress_data(config, payload, scratch)?;
    ChannelValue::decode(
        &config.name,
        &raw,
        config.ty,
        config.byte_order,
        config.encoding,
        &config.shape,
    )
}

/// A value whose conversion is still in flight.
///
/// Handlers that need the materialized value wait on [`resolve`]; the
/// frame-consuming path never does.
///
/// [`resolve`]: PendingValue::resolve
#[derive(Debug)]
pub struct PendingValue {
    timestamp: Timestamp,
    rx: oneshot::Receiver<Result<ChannelValue>>,
}

impl PendingValue {
    /// The channel's per-value timestamp, available without waiting.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Wait for the conversion result.
    pub async fn resolve(self) -> Result<(Timestamp, ChannelValue)> {
        match self.rx.await {
            Ok(Ok(value)) => Ok((self.timestamp, value)),
            Ok(Err(e)) => Err(e),
            // Pool closed before the result was published.
            Err(_) => Err(StreamError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Compression;
    use crate::types::{ByteOrder, ChannelType};

    fn f64_config(name: &str) -> ChannelConfig {
        ChannelConfig::scalar(name, ChannelType::Float64)
    }

    #[tokio::test]
    async fn scheduled_conversion_resolves_to_the_decoded_value() {
        let pool = ConversionPool::with_workers(2);
        let payload = Bytes::from(41.5f64.to_le_bytes().to_vec());
        let ts = Timestamp::new(100, 5);
        let pending = pool.schedule(f64_config("energy"), payload, ts);
        let (got_ts, value) = pending.resolve().await.unwrap();
        assert_eq!(got_ts, ts);
        assert_eq!(value, ChannelValue::Float64(41.5));
    }

    #[tokio::test]
    async fn results_are_keyed_by_channel_not_completion_order() {
        let pool = ConversionPool::with_workers(4);
        let mut pendings = Vec::new();
        for i in 0..32u64 {
            let payload = Bytes::from((i as f64).to_le_bytes().to_vec());
            pendings.push((i, pool.schedule(f64_config("ch"), payload, Timestamp::new(0, 0))));
        }
        for (i, pending) in pendings {
            let (_, value) = pending.resolve().await.unwrap();
            assert_eq!(value, ChannelValue::Float64(i as f64));
        }
    }

    #[tokio::test]
    async fn compressed_payloads_are_decompressed_before_decode() {
        let pool = ConversionPool::with_workers(2);
        let config = ChannelConfig::array("wave", ChannelType::Int16, vec![4])
            .with_compression(Compression::Lz4)
            .with_byte_order(ByteOrder::Big);

        let raw: Vec<u8> = [1i16, -2, 3, -4].iter().flat_map(|v| v.to_be_bytes()).collect();
        let mut alloc = crate::buffer::ThresholdAllocator::default();
        let compressed =
            crate::compression::compress_data(&config, &Bytes::from(raw), &mut alloc).unwrap();

        let (_, value) =
            pool.schedule(config, compressed, Timestamp::new(0, 0)).resolve().await.unwrap();
        assert_eq!(
            value,
            ChannelValue::Array(vec![
                ChannelValue::Int16(1),
                ChannelValue::Int16(-2),
                ChannelValue::Int16(3),
                ChannelValue::Int16(-4),
            ])
        );
    }

    #[tokio::test]
    async fn conversion_errors_surface_through_resolve() {
        let pool = ConversionPool::with_workers(1);
        // Three bytes cannot be a float64 scalar.
        let pending =
            pool.schedule(f64_config("bad"), Bytes::from_static(&[1, 2, 3]), Timestamp::new(0, 0));
        assert!(matches!(pending.resolve().await, Err(StreamError::Codec { .. })));
    }

    #[tokio::test]
    async fn closed_pool_never_publishes() {
        let pool = ConversionPool::with_workers(1);
        pool.close();
        // Give the worker a moment to observe cancellation.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let pending = pool.schedule(
            f64_config("late"),
            Bytes::from(1.0f64.to_le_bytes().to_vec()),
            Timestamp::new(0, 0),
        );
        assert!(matches!(pending.resolve().await, Err(StreamError::Closed)));
    }
}
