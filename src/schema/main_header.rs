//! Per-pulse main header and the control-frame tagged union.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::compression::Compression;
use crate::error::{Result, StreamError};
use crate::types::Timestamp;

/// `htype` tag of a data pulse envelope.
pub const MAIN_HTYPE: &str = "pw_main-1.0";
/// `htype` tag of a stop command.
pub const STOP_HTYPE: &str = "pw_stop-1.0";
/// `htype` tag of a reconnect command.
pub const RECONNECT_HTYPE: &str = "pw_reconnect-1.0";

/// Per-pulse envelope carried in the first frame of every multipart unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainHeader {
    /// Hash of the data header this pulse was produced under.
    pub hash: String,
    /// Pulse identity; strictly increasing within a validated stream.
    ///
    /// Monotonicity is enforced by the validator, not by this type.
    pub pulse_id: u64,
    /// Global acquisition time of the pulse.
    pub global_timestamp: Timestamp,
    /// Compression applied to the data header frame; absent means none.
    #[serde(
        default,
        rename = "dh_compression",
        skip_serializing_if = "Compression::is_none",
        with = "super::compression_tag"
    )]
    pub data_header_compression: Compression,
}

/// The first frame of a multipart unit, keyed by the `htype` string.
///
/// A closed union: unknown `htype` values fail at decode time rather than
/// falling through to a runtime type lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "htype")]
pub enum ControlHeader {
    /// A data pulse follows: data header frame + channel frame pairs.
    #[serde(rename = "pw_main-1.0")]
    Data(MainHeader),
    /// Stop the stream; no further frames of interest in this unit.
    #[serde(rename = "pw_stop-1.0")]
    Stop,
    /// Reconnect to the source; no further frames of interest in this unit.
    #[serde(rename = "pw_reconnect-1.0")]
    Reconnect,
}

impl ControlHeader {
    /// Parse the first frame of a multipart unit.
    pub fn parse(raw: &Bytes) -> Result<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| StreamError::schema(format!("main header: {e}"), Some(raw.clone())))
    }

    /// Serialize to the JSON wire form.
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> MainHeader {
        MainHeader {
            hash: "8c17ab2f".into(),
            pulse_id: 17_000_123_456,
            global_timestamp: Timestamp::new(1_700_000_000, 123_456_789),
            data_header_compression: Compression::None,
        }
    }

    #[test]
    fn data_header_roundtrip() {
        let control = ControlHeader::Data(sample_header());
        let bytes = control.to_bytes().unwrap();
        assert_eq!(ControlHeader::parse(&bytes).unwrap(), control);
    }

    #[test]
    fn htype_tag_selects_the_variant() {
        let json: serde_json::Value =
            serde_json::from_slice(&ControlHeader::Data(sample_header()).to_bytes().unwrap())
                .unwrap();
        assert_eq!(json["htype"], MAIN_HTYPE);

        let stop = format!(r#"{{"htype":"{STOP_HTYPE}"}}"#);
        assert_eq!(ControlHeader::parse(&Bytes::from(stop)).unwrap(), ControlHeader::Stop);

        let reconnect = format!(r#"{{"htype":"{RECONNECT_HTYPE}"}}"#);
        assert_eq!(ControlHeader::parse(&Bytes::from(reconnect)).unwrap(), ControlHeader::Reconnect);
    }

    #[test]
    fn unknown_htype_fails_closed() {
        let raw = Bytes::from_static(br#"{"htype":"pw_other-9.9","pulse_id":1}"#);
        assert!(matches!(ControlHeader::parse(&raw), Err(StreamError::Schema { .. })));
    }

    #[test]
    fn header_compression_tag_roundtrip() {
        let mut header = sample_header();
        header.data_header_compression = Compression::BitshuffleLz4;
        let bytes = ControlHeader::Data(header.clone()).to_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["dh_compression"], 1);
        match ControlHeader::parse(&bytes).unwrap() {
            ControlHeader::Data(back) => assert_eq!(back, header),
            other => panic!("expected data header, got {other:?}"),
        }
    }

    #[test]
    fn global_timestamp_uses_millisecond_wire_shape() {
        let bytes = ControlHeader::Data(sample_header()).to_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["global_timestamp"]["ms"], 1_700_000_000_123i64);
        assert_eq!(json["global_timestamp"]["ns"], 456_789);
    }
}
