//! Error types for stream processing.
//!
//! All fatal per-pulse conditions are variants of [`StreamError`]. Validation
//! rejections are deliberately *not* errors: they are typed negative results
//! carried by [`crate::validate::RejectReason`], because a rejected header is
//! an expected outcome of a live stream, not a failure of this library.
//!
//! ## Error Categories
//!
//! - **Framing**: wrong frame count inside one multipart unit
//! - **Schema**: malformed data header JSON (raw bytes retained for diagnosis)
//! - **Codec**: unknown compression tag, element-width mismatch, unsupported
//!   header codec operation
//! - **Allocator**: a buffer request exceeded the configured cap
//! - **Transport**: the underlying socket failed or closed
//!
//! Every variant except the transport ones is fatal to the current pulse
//! only; the stream continues after the remainder of the multipart unit is
//! drained.

use bytes::Bytes;
use thiserror::Error;

/// Result type alias for stream operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Main error type for stream processing.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    #[error("framing error at pulse {pulse_id}: {details}")]
    Framing { pulse_id: u64, details: String },

    #[error("malformed data header: {details}")]
    Schema {
        details: String,
        /// Raw header bytes as received, kept for diagnostic surfacing.
        raw: Option<Bytes>,
    },

    #[error("unknown compression tag {tag}")]
    UnknownCompression { tag: u8 },

    #[error("codec error on channel '{channel}': {details}")]
    Codec { channel: String, details: String },

    #[error("header codec does not implement {operation}")]
    UnsupportedHeaderCodec { operation: &'static str },

    #[error(
        "buffer of {len} bytes is not a multiple of element width {width} for channel '{channel}'"
    )]
    ElementWidth { channel: String, len: usize, width: usize },

    #[error("allocation of {requested} bytes exceeds cap of {cap} bytes")]
    AllocatorExhausted { requested: usize, cap: usize },

    #[error("header parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("session closed")]
    Closed,
}

impl StreamError {
    /// Helper constructor for framing errors with pulse context.
    pub fn framing(pulse_id: u64, details: impl Into<String>) -> Self {
        StreamError::Framing { pulse_id, details: details.into() }
    }

    /// Helper constructor for schema errors that keeps the raw header bytes.
    pub fn schema(details: impl Into<String>, raw: Option<Bytes>) -> Self {
        StreamError::Schema { details: details.into(), raw }
    }

    /// Helper constructor for codec failures with channel context.
    pub fn codec(channel: impl Into<String>, details: impl Into<String>) -> Self {
        StreamError::Codec { channel: channel.into(), details: details.into() }
    }

    /// Helper constructor for transport errors.
    pub fn transport(reason: impl Into<String>) -> Self {
        StreamError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with an underlying source.
    pub fn transport_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StreamError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Returns whether this error aborts only the current pulse.
    ///
    /// Per-pulse errors leave cross-pulse state (schema cache, validator
    /// history) intact; the caller drains the multipart unit and resumes with
    /// the next pulse. Transport and close errors end the stream.
    pub fn is_fatal_to_pulse_only(&self) -> bool {
        !matches!(self, StreamError::Transport { .. } | StreamError::Closed)
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Transport { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn error_messages_contain_their_context(
            pulse_id in any::<u64>(),
            details in "[a-zA-Z0-9 ]+",
            channel in "[a-zA-Z][a-zA-Z0-9_]*",
            tag in any::<u8>(),
        ) {
            let framing = StreamError::framing(pulse_id, details.clone());
            prop_assert!(framing.to_string().contains(&pulse_id.to_string()));
            prop_assert!(framing.to_string().contains(&details));

            let codec = StreamError::codec(channel.clone(), details.clone());
            prop_assert!(codec.to_string().contains(&channel));
            prop_assert!(codec.to_string().contains(&details));

            let unknown = StreamError::UnknownCompression { tag };
            prop_assert!(unknown.to_string().contains(&tag.to_string()));
        }

        #[test]
        fn allocator_errors_name_both_sizes(
            requested in any::<usize>(),
            cap in any::<usize>(),
        ) {
            let err = StreamError::AllocatorExhausted { requested, cap };
            prop_assert!(err.to_string().contains(&requested.to_string()));
            prop_assert!(err.to_string().contains(&cap.to_string()));
        }
    }

    #[test]
    fn pulse_scope_classification() {
        assert!(StreamError::framing(1, "x").is_fatal_to_pulse_only());
        assert!(StreamError::schema("bad json", None).is_fatal_to_pulse_only());
        assert!(StreamError::UnknownCompression { tag: 9 }.is_fatal_to_pulse_only());
        assert!(!StreamError::transport("socket gone").is_fatal_to_pulse_only());
        assert!(!StreamError::Closed.is_fatal_to_pulse_only());
    }

    #[test]
    fn schema_error_retains_raw_bytes() {
        let raw = Bytes::from_static(b"{not json");
        let err = StreamError::schema("unexpected token", Some(raw.clone()));
        match err {
            StreamError::Schema { raw: Some(kept), .. } => assert_eq!(kept, raw),
            other => panic!("expected Schema variant, got {other:?}"),
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<StreamError>();

        let error = StreamError::transport("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn io_error_converts_to_transport() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset");
        let err: StreamError = io_err.into();
        assert!(matches!(err, StreamError::Transport { .. }));
        assert!(err.to_string().contains("peer reset"));
    }
}
