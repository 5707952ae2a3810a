//! Wire header models: the per-pulse main header, the control-frame union,
//! and the per-stream data header with its channel descriptors.

mod data_header;
mod main_header;

pub use data_header::{ChannelConfig, DataHeader};
pub use main_header::{ControlHeader, MainHeader, MAIN_HTYPE, RECONNECT_HTYPE, STOP_HTYPE};

/// Serde bridge for the numeric compression wire tag.
///
/// `none` is represented by omitting the field entirely; any present value
/// must be a known tag. Unknown tags fail the whole header decode.
pub(crate) mod compression_tag {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::compression::Compression;

    pub fn serialize<S: Serializer>(value: &Compression, serializer: S) -> Result<S::Ok, S::Error> {
        match value.tag() {
            Some(tag) => serializer.serialize_u8(tag),
            // skip_serializing_if keeps us out of this branch; emit the tagless
            // marker as null if a caller serializes the field anyway.
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Compression, D::Error> {
        match Option::<u8>::deserialize(deserializer)? {
            None => Ok(Compression::None),
            Some(tag) => Compression::from_tag(tag).map_err(|e| D::Error::custom(e.to_string())),
        }
    }
}
