//! Per-stream schema snapshot: the data header and its channel descriptors.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compression::Compression;
use crate::error::{Result, StreamError};
use crate::types::{ByteOrder, ChannelType, ValueEncoding};

/// One data channel's schema entry.
///
/// Everything here is fixed at schema-definition time; a change to any field
/// produces a new schema revision with a new hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel name, unique within one data header.
    pub name: String,
    /// Element type of the channel's samples.
    #[serde(rename = "type")]
    pub ty: ChannelType,
    /// Ordered dimensions; empty means scalar. Every dim is >= 1.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shape: Vec<usize>,
    /// Byte order of the channel's binary data.
    #[serde(default)]
    pub byte_order: ByteOrder,
    /// Value encoding of the decompressed bytes.
    #[serde(default)]
    pub encoding: ValueEncoding,
    /// Compression codec, carried as a numeric wire tag; absent means none.
    #[serde(default, skip_serializing_if = "Compression::is_none", with = "super::compression_tag")]
    pub compression: Compression,
    /// Sampling offset in pulses relative to the global pulse grid.
    #[serde(default)]
    pub offset: i64,
    /// Sampling frequency in Hz.
    #[serde(default = "default_frequency")]
    pub frequency: f64,
}

fn default_frequency() -> f64 {
    100.0
}

impl ChannelConfig {
    /// A scalar channel with default order, encoding and sampling.
    pub fn scalar(name: impl Into<String>, ty: ChannelType) -> Self {
        Self {
            name: name.into(),
            ty,
            shape: Vec::new(),
            byte_order: ByteOrder::default(),
            encoding: ValueEncoding::default(),
            compression: Compression::None,
            offset: 0,
            frequency: default_frequency(),
        }
    }

    /// An array channel with the given shape.
    pub fn array(name: impl Into<String>, ty: ChannelType, shape: Vec<usize>) -> Self {
        Self { shape, ..Self::scalar(name, ty) }
    }

    /// Builder-style byte order override.
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    /// Builder-style compression override.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

/// Full per-stream schema snapshot, identified by a content hash.
///
/// The channel order defines the wire frame order. Shared by `Arc` across all
/// messages of one schema revision; re-parsed only when the main header's
/// hash stops matching the cached copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataHeader {
    /// Opaque hash identifying this schema revision.
    pub hash: String,
    /// Ordered channel descriptors.
    pub channels: Vec<ChannelConfig>,
}

impl DataHeader {
    /// Build a data header, computing the revision hash from the channel list.
    pub fn new(channels: Vec<ChannelConfig>) -> Result<Self> {
        let header = Self { hash: content_hash(&channels)?, channels };
        header.validate()?;
        Ok(header)
    }

    /// Build a data header with a caller-supplied opaque hash.
    pub fn with_hash(hash: impl Into<String>, channels: Vec<ChannelConfig>) -> Result<Self> {
        let header = Self { hash: hash.into(), channels };
        header.validate()?;
        Ok(header)
    }

    /// Parse a data header from its (already decompressed) JSON bytes.
    ///
    /// The raw bytes are retained in the error on failure so a malformed
    /// header can be surfaced for diagnosis.
    pub fn parse(raw: &Bytes) -> Result<Self> {
        let header: DataHeader = serde_json::from_slice(raw)
            .map_err(|e| StreamError::schema(e.to_string(), Some(raw.clone())))?;
        header.validate().map_err(|e| match e {
            StreamError::Schema { details, .. } => StreamError::schema(details, Some(raw.clone())),
            other => other,
        })?;
        debug!(hash = %header.hash, channels = header.channels.len(), "parsed data header");
        Ok(header)
    }

    /// Serialize to the JSON wire form.
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Check structural invariants: unique channel names, dims >= 1.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::with_capacity(self.channels.len());
        for config in &self.channels {
            if !seen.insert(config.name.as_str()) {
                return Err(StreamError::schema(
                    format!("duplicate channel name '{}'", config.name),
                    None,
                ));
            }
            if config.shape.iter().any(|&dim| dim == 0) {
                return Err(StreamError::schema(
                    format!("channel '{}' has a zero dimension in {:?}", config.name, config.shape),
                    None,
                ));
            }
        }
        Ok(())
    }

    /// Look up one channel by name.
    pub fn channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.name == name)
    }
}

/// Content hash identifying a schema revision.
///
/// The hash only needs to distinguish revisions for caching; it is opaque to
/// the wire protocol and senders may substitute any string.
fn content_hash(channels: &[ChannelConfig]) -> Result<String> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&serde_json::to_vec(channels)?);
    Ok(format!("{:08x}", hasher.finalize()))
}
