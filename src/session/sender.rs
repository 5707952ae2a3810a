//! Sending side of a stream session.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::buffer::ThresholdAllocator;
use crate::compression::{compress_data, compress_header, Compression};
use crate::error::Result;
use crate::extract::{encode_timestamp_frame, Value};
use crate::schema::{ControlHeader, DataHeader, MainHeader};
use crate::transport::{FrameSink, Multipart};
use crate::types::Timestamp;

/// Streams pulses to a [`FrameSink`].
///
/// The data header frame is shipped with every pulse but encoded (and
/// compressed) only when the schema actually changes; between changes the
/// same `Bytes` handle is cloned into each unit. Channel frames follow the
/// data header's channel order exactly.
pub struct Sender<S: FrameSink> {
    sink: S,
    data_header: Arc<DataHeader>,
    header_compression: Compression,
    encoded_header: Bytes,
    alloc: ThresholdAllocator,
}

impl<S: FrameSink> Sender<S> {
    /// Create a sender for the given schema.
    pub fn new(sink: S, data_header: DataHeader, header_compression: Compression) -> Result<Self> {
        let mut alloc = ThresholdAllocator::default();
        let encoded_header =
            compress_header(header_compression, &data_header.to_bytes()?, &mut alloc)?;
        Ok(Self {
            sink,
            data_header: Arc::new(data_header),
            header_compression,
            encoded_header,
            alloc,
        })
    }

    /// The schema currently in effect.
    pub fn data_header(&self) -> &Arc<DataHeader> {
        &self.data_header
    }

    /// Switch to a new schema revision.
    ///
    /// Takes effect from the next pulse; receivers notice through the hash in
    /// the main header.
    pub fn set_data_header(&mut self, data_header: DataHeader) -> Result<()> {
        self.encoded_header =
            compress_header(self.header_compression, &data_header.to_bytes()?, &mut self.alloc)?;
        debug!(hash = %data_header.hash, channels = data_header.channels.len(), "schema replaced");
        self.data_header = Arc::new(data_header);
        Ok(())
    }

    /// Send one pulse.
    ///
    /// A channel with no entry in `samples` gets an empty value frame (the
    /// wire form of "no value this pulse") and a zeroed timestamp frame to
    /// keep the unit's frame count fixed.
    pub async fn send_pulse(
        &mut self,
        pulse_id: u64,
        global_timestamp: Timestamp,
        samples: &HashMap<String, Value>,
    ) -> Result<()> {
        let main = MainHeader {
            hash: self.data_header.hash.clone(),
            pulse_id,
            global_timestamp,
            data_header_compression: self.header_compression,
        };

        let mut unit = Multipart::new();
        unit.push(ControlHeader::Data(main).to_bytes()?);
        unit.push(self.encoded_header.clone());

        for config in &self.data_header.channels {
            match samples.get(&config.name) {
                Some(sample) => {
                    let raw = sample.data.encode(&config.name, config.ty, config.byte_order)?;
                    let frame = compress_data(config, &Bytes::from(raw), &mut self.alloc)?;
                    unit.push(frame);
                    unit.push(encode_timestamp_frame(config.byte_order, sample.timestamp));
                }
                None => {
                    unit.push(Bytes::new());
                    unit.push(encode_timestamp_frame(config.byte_order, Timestamp::new(0, 0)));
                }
            }
        }

        trace!(pulse_id, frames = unit.remaining(), "sending pulse");
        self.sink.send(unit).await
    }

    /// Send a stop command.
    pub async fn send_stop(&mut self) -> Result<()> {
        self.send_control(ControlHeader::Stop).await
    }

    /// Send a reconnect command.
    pub async fn send_reconnect(&mut self) -> Result<()> {
        self.send_control(ControlHeader::Reconnect).await
    }

    async fn send_control(&mut self, control: ControlHeader) -> Result<()> {
        let mut unit = Multipart::new();
        unit.push(control.to_bytes()?);
        self.sink.send(unit).await
    }
}
