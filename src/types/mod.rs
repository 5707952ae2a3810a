//! Core value types for per-pulse measurement data.
//!
//! - [`Timestamp`] is the dual-resolution time value used by both the main
//!   header (millisecond epoch + nanosecond remainder on the wire) and the
//!   per-channel 16-byte timestamp frames.
//! - [`ChannelType`], [`ByteOrder`] and [`ValueEncoding`] describe how one
//!   channel's bytes are laid out.
//! - [`ChannelValue`] is the decoded runtime value, with the binary codec the
//!   extractor and sender share.

mod channel_type;
mod timestamp;
mod value;

pub use channel_type::{ByteOrder, ChannelType, ValueEncoding};
pub use timestamp::Timestamp;
pub use value::ChannelValue;
