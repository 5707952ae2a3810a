//! Transport abstraction: multipart units and the source/sink traits.
//!
//! The socket itself (connect/bind/send/receive) belongs to the underlying
//! pub/sub library and stays outside this crate. Sessions talk to it through
//! [`FrameSource`] and [`FrameSink`], which move whole [`Multipart`] units:
//! the transport's atomic delivery granularity. An in-memory [`channel`] pair
//! stands in for the real transport in tests, the same way a file replay
//! stands in for a live feed.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{Result, StreamError};

/// One transport-level multipart unit: an ordered run of frames that arrive
/// (and are consumed) together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Multipart {
    frames: VecDeque<Bytes>,
}

impl Multipart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_frames(frames: Vec<Bytes>) -> Self {
        Self { frames: frames.into() }
    }

    /// Append a frame at the end of the unit.
    pub fn push(&mut self, frame: Bytes) {
        self.frames.push_back(frame);
    }

    /// Consume the next frame, front to back.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        self.frames.pop_front()
    }

    /// Frames not yet consumed.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Discard every remaining frame, returning how many were dropped.
    ///
    /// Used on fatal framing errors and on protocol commands so the next
    /// receive starts at a unit boundary.
    pub fn drain(&mut self) -> usize {
        let dropped = self.frames.len();
        self.frames.clear();
        dropped
    }
}

impl FromIterator<Bytes> for Multipart {
    fn from_iter<I: IntoIterator<Item = Bytes>>(iter: I) -> Self {
        Self { frames: iter.into_iter().collect() }
    }
}

/// Consuming side of a transport.
///
/// `recv` blocks until a unit arrives; that block is the stream's natural
/// backpressure. `Ok(None)` means the peer closed the stream normally.
#[async_trait]
pub trait FrameSource: Send + 'static {
    async fn recv(&mut self) -> Result<Option<Multipart>>;
}

/// Producing side of a transport.
#[async_trait]
pub trait FrameSink: Send + 'static {
    async fn send(&mut self, unit: Multipart) -> Result<()>;
}

/// Create a bounded in-memory transport pair.
///
/// `capacity` is the number of whole multipart units the channel buffers
/// before the sender blocks.
pub fn channel(capacity: usize) -> (ChannelSink, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelSink { tx }, ChannelSource { rx })
}

/// In-memory [`FrameSink`] half.
pub struct ChannelSink {
    tx: mpsc::Sender<Multipart>,
}

/// In-memory [`FrameSource`] half.
pub struct ChannelSource {
    rx: mpsc::Receiver<Multipart>,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, unit: Multipart) -> Result<()> {
        self.tx.send(unit).await.map_err(|_| StreamError::Closed)
    }
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<Multipart>> {
        Ok(self.rx.recv().await)
    }
}
