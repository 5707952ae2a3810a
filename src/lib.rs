//! Type-safe Rust library for per-pulse binary measurement streaming.
//!
//! Pulsewire moves synchronized measurement data, one multipart unit per
//! machine pulse, between a sender and any number of receivers, with a
//! schema-hash cached data header, pluggable compression and off-thread
//! value conversion.
//!
//! # Features
//!
//! - **Schema caching**: the per-stream data header is parsed once per
//!   revision and shared by `Arc` across every message of that revision
//! - **Pluggable compression**: none, LZ4 and bitshuffle-LZ4, selected per
//!   channel and carried as numeric wire tags
//! - **Non-blocking extraction**: frame consumption never waits on a value
//!   conversion; results are joined per pulse through [`PendingMessage`]
//! - **Stream validation**: pulse-id/timestamp monotonicity checking with
//!   analyzer and strict policy profiles
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use pulsewire::{
//!     ChannelConfig, ChannelType, ChannelValue, Compression, DataHeader,
//!     Receiver, Sender, Timestamp, Value,
//! };
//!
//! #[tokio::main]
//! async fn main() -> pulsewire::Result<()> {
//!     let (sink, source) = pulsewire::transport::channel(16);
//!
//!     let schema =
//!         DataHeader::new(vec![ChannelConfig::scalar("energy", ChannelType::Float64)])?;
//!     let mut sender = Sender::new(sink, schema, Compression::None)?;
//!
//!     let mut receiver = Receiver::new(source);
//!     receiver.on_message(|message| async move {
//!         println!("pulse {}: {:?}", message.pulse_id(), message.value("energy"));
//!     });
//!     let session = tokio::spawn(receiver.run());
//!
//!     let mut samples = HashMap::new();
//!     samples.insert(
//!         "energy".to_string(),
//!         Value { timestamp: Timestamp::now(), data: ChannelValue::Float64(1.25) },
//!     );
//!     sender.send_pulse(1, Timestamp::now(), &samples).await?;
//!     sender.send_stop().await?;
//!
//!     session.await.expect("receiver task")?;
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod buffer;
mod error;
pub mod types;

// Wire format
pub mod compression;
pub mod schema;
pub mod transport;

// Stream machinery
pub mod extract;
pub mod session;
pub mod validate;

// Core exports
pub use buffer::{Allocator, ScratchAllocator, ThresholdAllocator};
pub use compression::Compression;
pub use error::{Result, StreamError};
pub use types::{ByteOrder, ChannelType, ChannelValue, Timestamp, ValueEncoding};

// Wire format exports
pub use schema::{ChannelConfig, ControlHeader, DataHeader, MainHeader};
pub use transport::{FrameSink, FrameSource, Multipart};

// Stream exports
pub use extract::{ConversionPool, Message, MessageExtractor, PendingMessage, PendingValue, Value};
pub use session::{DispatchMode, Receiver, ReceiverConfig, Sender, StopBehavior};
pub use validate::{HeaderValidator, RejectReason, ValidatorPolicy, Verdict};
