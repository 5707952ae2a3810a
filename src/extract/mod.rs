//! Per-pulse message extraction.
//!
//! [`MessageExtractor`] is the state machine that turns one multipart unit
//! (minus its already-parsed main header) into a [`Message`]. It owns the
//! single schema-cache entry: the data header frame the sender ships with
//! every pulse is parsed only when the main header's hash stops matching the
//! cache. Value decoding is offloaded to the [`ConversionPool`]; the frames
//! are consumed without waiting and the results joined later through
//! [`PendingMessage::resolve`].

mod pool;

pub use pool::{ConversionPool, PendingValue};

use std::collections::HashMap;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::buffer::ThresholdAllocator;
use crate::compression::decompress_header;
use crate::error::{Result, StreamError};
use crate::schema::{DataHeader, MainHeader};
use crate::transport::Multipart;
use crate::types::{ByteOrder, ChannelValue, Timestamp};

/// One channel's resolved sample for one pulse.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    /// The channel's own acquisition timestamp.
    pub timestamp: Timestamp,
    /// The decoded value.
    pub data: ChannelValue,
}

/// One pulse's complete payload, immutable once handed to handlers.
///
/// A channel missing from `values` sent no data this pulse; that is an
/// explicit "no value" state, not a zero.
#[derive(Debug, Clone)]
pub struct Message {
    pub main_header: MainHeader,
    pub data_header: Arc<DataHeader>,
    pub values: HashMap<String, Value>,
}

impl Message {
    /// Look up one channel's value, if the channel sent data this pulse.
    pub fn value(&self, channel: &str) -> Option<&Value> {
        self.values.get(channel)
    }

    pub fn pulse_id(&self) -> u64 {
        self.main_header.pulse_id
    }
}

/// A message whose value conversions are still in flight.
#[derive(Debug)]
pub struct PendingMessage {
    main_header: MainHeader,
    data_header: Arc<DataHeader>,
    pending: Vec<(String, PendingValue)>,
}

impl PendingMessage {
    pub fn pulse_id(&self) -> u64 {
        self.main_header.pulse_id
    }

    /// Join every scheduled conversion into the final immutable message.
    pub async fn resolve(self) -> Result<Message> {
        let mut values = HashMap::with_capacity(self.pending.len());
        for (name, pending) in self.pending {
            let (timestamp, data) = pending.resolve().await?;
            values.insert(name, Value { timestamp, data });
        }
        Ok(Message { main_header: self.main_header, data_header: self.data_header, values })
    }
}

/// Result of extracting one pulse.
#[derive(Debug)]
pub struct Extraction {
    pub message: PendingMessage,
    /// Set when this pulse replaced the cached schema.
    pub schema_changed: Option<Arc<DataHeader>>,
}

/// Stateful per-stream extractor holding the single schema-cache entry.
#[derive(Default)]
pub struct MessageExtractor {
    cached: Option<Arc<DataHeader>>,
    header_alloc: ThresholdAllocator,
}

impl MessageExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently cached schema revision, if any.
    pub fn cached_header(&self) -> Option<&Arc<DataHeader>> {
        self.cached.as_ref()
    }

    /// Consume the remaining frames of one pulse's multipart unit.
    ///
    /// The main header frame has already been parsed by the caller. On a
    /// fatal framing error the unit is left partially consumed; the caller
    /// drains it. A schema parsed earlier in the same call stays cached even
    /// if a later frame fails.
    pub fn extract(
        &mut self,
        main_header: MainHeader,
        unit: &mut Multipart,
        pool: &ConversionPool,
    ) -> Result<Extraction> {
        let pulse_id = main_header.pulse_id;

        let header_frame = unit.next_frame().ok_or_else(|| {
            StreamError::framing(pulse_id, "multipart unit ended before the data header frame")
        })?;

        let schema_changed = match &self.cached {
            Some(cached) if cached.hash == main_header.hash => {
                // Same revision: the sender still ships the header frame for
                // symmetry, but it is discarded unparsed.
                trace!(pulse_id, hash = %main_header.hash, "schema cache hit");
                None
            }
            _ => {
                let decompressed = decompress_header(
                    main_header.data_header_compression,
                    &header_frame,
                    &mut self.header_alloc,
                )?;
                let parsed = Arc::new(DataHeader::parse(&decompressed)?);
                debug!(
                    pulse_id,
                    hash = %parsed.hash,
                    channels = parsed.channels.len(),
                    "schema changed, cache replaced"
                );
                self.cached = Some(Arc::clone(&parsed));
                Some(parsed)
            }
        };
        let data_header =
            Arc::clone(self.cached.as_ref().expect("cache populated before channel loop"));

        let mut pending = Vec::with_capacity(data_header.channels.len());
        for config in &data_header.channels {
            let value_frame = unit.next_frame().ok_or_else(|| {
                StreamError::framing(
                    pulse_id,
                    format!("missing value frame for channel '{}'", config.name),
                )
            })?;
            let timestamp_frame = unit.next_frame().ok_or_else(|| {
                StreamError::framing(
                    pulse_id,
                    format!("missing timestamp frame for channel '{}'", config.name),
                )
            })?;

            // Empty value frame: the channel sent nothing this pulse. Its
            // timestamp frame was still consumed but is immaterial.
            if value_frame.is_empty() {
                trace!(pulse_id, channel = %config.name, "no value this pulse");
                continue;
            }

            let timestamp =
                parse_timestamp_frame(pulse_id, &config.name, config.byte_order, &timestamp_frame)?;
            pending.push((
                config.name.clone(),
                pool.schedule(config.clone(), value_frame, timestamp),
            ));
        }

        let extra = unit.drain();
        if extra > 1 {
            return Err(StreamError::framing(
                pulse_id,
                format!("{extra} trailing frames after the last channel (at most one is tolerated)"),
            ));
        }
        if extra == 1 {
            // Sender padding convention.
            trace!(pulse_id, "tolerated one trailing padding frame");
        }

        Ok(Extraction {
            message: PendingMessage { main_header, data_header, pending },
            schema_changed,
        })
    }
}

/// Parse a 16-byte per-channel timestamp frame: epoch seconds then nanosecond
/// offset, both 8 bytes in the channel's declared byte order.
fn parse_timestamp_frame(
    pulse_id: u64,
    channel: &str,
    order: ByteOrder,
    frame: &Bytes,
) -> Result<Timestamp> {
    if frame.len() != 16 {
        warn!(pulse_id, channel, len = frame.len(), "bad timestamp frame length");
        return Err(StreamError::framing(
            pulse_id,
            format!("timestamp frame for channel '{channel}' is {} bytes, expected 16", frame.len()),
        ));
    }
    let (sec, ns) = match order {
        ByteOrder::Little => (LittleEndian::read_i64(&frame[..8]), LittleEndian::read_i64(&frame[8..])),
        ByteOrder::Big => (BigEndian::read_i64(&frame[..8]), BigEndian::read_i64(&frame[8..])),
    };
    Ok(Timestamp::new(sec, ns))
}

/// Encode a per-channel timestamp frame (the sender-side inverse of
/// [`parse_timestamp_frame`]).
pub(crate) fn encode_timestamp_frame(order: ByteOrder, timestamp: Timestamp) -> Bytes {
    let mut frame = vec![0u8; 16];
    match order {
        ByteOrder::Little => {
            LittleEndian::write_i64(&mut frame[..8], timestamp.sec());
            LittleEndian::write_i64(&mut frame[8..], timestamp.nanos());
        }
        ByteOrder::Big => {
            BigEndian::write_i64(&mut frame[..8], timestamp.sec());
            BigEndian::write_i64(&mut frame[8..], timestamp.nanos());
        }
    }
    Bytes::from(frame)
}
