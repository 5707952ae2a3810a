//! Channel element type and byte-order definitions.

use serde::{Deserialize, Serialize};

/// Element types a channel may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// 8-bit signed integer
    Int8,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// Variable-length UTF-8 string
    String,
    /// Boolean, one byte per element
    Bool,
}

impl ChannelType {
    /// Size in bytes of one element, or `None` for dynamically sized types.
    pub const fn width(&self) -> Option<usize> {
        match self {
            ChannelType::Int8 | ChannelType::Bool => Some(1),
            ChannelType::Int16 => Some(2),
            ChannelType::Int32 | ChannelType::Float32 => Some(4),
            ChannelType::Int64 | ChannelType::Float64 => Some(8),
            ChannelType::String => None,
        }
    }

    /// Element width used by the byte-shuffle transform.
    ///
    /// Dynamically sized types degrade to width 1, which makes the shuffle
    /// the identity permutation.
    pub const fn shuffle_width(&self) -> usize {
        match self.width() {
            Some(w) => w,
            None => 1,
        }
    }
}

/// Byte order a channel's binary data is encoded in.
///
/// Fixed at schema-definition time; the schema header blob itself always uses
/// big-endian length fields because it has no channel to inherit an order
/// from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Value encoding for a channel's decompressed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueEncoding {
    /// Raw binary elements, interpreted per [`ChannelType`].
    #[default]
    Binary,
    /// UTF-8 text (string channels).
    Utf8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_match_element_sizes() {
        assert_eq!(ChannelType::Int8.width(), Some(1));
        assert_eq!(ChannelType::Bool.width(), Some(1));
        assert_eq!(ChannelType::Int16.width(), Some(2));
        assert_eq!(ChannelType::Int32.width(), Some(4));
        assert_eq!(ChannelType::Float32.width(), Some(4));
        assert_eq!(ChannelType::Int64.width(), Some(8));
        assert_eq!(ChannelType::Float64.width(), Some(8));
        assert_eq!(ChannelType::String.width(), None);
    }

    #[test]
    fn dynamic_types_shuffle_at_width_one() {
        assert_eq!(ChannelType::String.shuffle_width(), 1);
        assert_eq!(ChannelType::Float64.shuffle_width(), 8);
    }

    #[test]
    fn wire_names_are_lowercase() {
        assert_eq!(serde_json::to_string(&ChannelType::Float64).unwrap(), "\"float64\"");
        assert_eq!(serde_json::to_string(&ByteOrder::Big).unwrap(), "\"big\"");
        let ty: ChannelType = serde_json::from_str("\"int16\"").unwrap();
        assert_eq!(ty, ChannelType::Int16);
    }
}
