//! Pluggable compression codecs for channel data and the schema header blob.
//!
//! Each operation takes a source byte range and an [`Allocator`] and returns
//! a newly allocated destination (or a zero-copy view for the `none` codec).
//! Framing, per codec:
//!
//! - **lz4**: `[u32 uncompressed-length, big-endian][lz4 block]`. The header
//!   blob operations are explicit not-implemented errors for this codec.
//! - **bitshuffle-lz4**: `[u32 uncompressed-length][u32 block-size]` in the
//!   buffer's declared byte order, then the byte-shuffled lz4 block. This
//!   implementation writes a single block spanning the whole payload; the
//!   block-size field is carried for framing compatibility and the output is
//!   sized from the uncompressed-length field alone.
//!
//! The schema header blob always frames its length fields big-endian because
//! the header has no channel to inherit an order from.

use bytes::Bytes;
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use tracing::trace;

use crate::buffer::Allocator;
use crate::error::{Result, StreamError};
use crate::schema::ChannelConfig;
use crate::types::ByteOrder;

/// Compression codec selected per channel at schema-definition time.
///
/// The numeric wire tag and the name form a bijection; `none` has no tag and
/// is expressed by omitting the field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    #[default]
    None,
    Lz4,
    BitshuffleLz4,
}

impl Compression {
    /// Resolve a numeric wire tag. Unknown tags are hard decode errors.
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Compression::Lz4),
            1 => Ok(Compression::BitshuffleLz4),
            other => Err(StreamError::UnknownCompression { tag: other }),
        }
    }

    /// The numeric wire tag, or `None` for the implicit no-compression case.
    pub fn tag(&self) -> Option<u8> {
        match self {
            Compression::None => None,
            Compression::Lz4 => Some(0),
            Compression::BitshuffleLz4 => Some(1),
        }
    }

    /// Registry name of the codec.
    pub fn name(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Lz4 => "lz4",
            Compression::BitshuffleLz4 => "bitshuffle_lz4",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Compression::None)
    }
}

/// Compress one channel's value bytes per its declared codec.
pub fn compress_data(
    config: &ChannelConfig,
    src: &Bytes,
    alloc: &mut dyn Allocator,
) -> Result<Bytes> {
    match config.compression {
        Compression::None => Ok(src.clone()),
        Compression::Lz4 => lz4_compress(&config.name, src, alloc),
        Compression::BitshuffleLz4 => bitshuffle_compress(
            &config.name,
            config.ty.shuffle_width(),
            config.byte_order,
            src,
            alloc,
        ),
    }
}

/// Decompress one channel's value bytes per its declared codec.
pub fn decompress_data(
    config: &ChannelConfig,
    src: &Bytes,
    alloc: &mut dyn Allocator,
) -> Result<Bytes> {
    match config.compression {
        Compression::None => Ok(src.clone()),
        Compression::Lz4 => lz4_decompress(&config.name, src, alloc),
        Compression::BitshuffleLz4 => bitshuffle_decompress(
            &config.name,
            config.ty.shuffle_width(),
            config.byte_order,
            src,
            alloc,
        ),
    }
}

const HEADER_BLOB: &str = "<data header>";

/// Compress the schema header blob (big-endian framing, width 1).
pub fn compress_header(
    codec: Compression,
    src: &Bytes,
    alloc: &mut dyn Allocator,
) -> Result<Bytes> {
    match codec {
        Compression::None => Ok(src.clone()),
        Compression::Lz4 => Err(StreamError::UnsupportedHeaderCodec { operation: "compress_header" }),
        Compression::BitshuffleLz4 => {
            bitshuffle_compress(HEADER_BLOB, 1, ByteOrder::Big, src, alloc)
        }
    }
}

/// Decompress the schema header blob (big-endian framing, width 1).
pub fn decompress_header(
    codec: Compression,
    src: &Bytes,
    alloc: &mut dyn Allocator,
) -> Result<Bytes> {
    match codec {
        Compression::None => Ok(src.clone()),
        Compression::Lz4 => {
            Err(StreamError::UnsupportedHeaderCodec { operation: "decompress_header" })
        }
        Compression::BitshuffleLz4 => {
            bitshuffle_decompress(HEADER_BLOB, 1, ByteOrder::Big, src, alloc)
        }
    }
}

const LZ4_PREFIX: usize = 4;
const BITSHUFFLE_PREFIX: usize = 8;

fn lz4_compress(channel: &str, src: &Bytes, alloc: &mut dyn Allocator) -> Result<Bytes> {
    let bound = lz4::block::compress_bound(src.len())
        .map_err(|e| StreamError::codec(channel, e.to_string()))?;
    let mut dst = alloc.allocate(LZ4_PREFIX + bound)?;
    BigEndian::write_u32(&mut dst[..LZ4_PREFIX], src.len() as u32);
    let written = lz4::block::compress_to_buffer(src, None, false, &mut dst[LZ4_PREFIX..])
        .map_err(|e| StreamError::codec(channel, e.to_string()))?;
    dst.truncate(LZ4_PREFIX + written);
    trace!(channel, raw = src.len(), compressed = written, "lz4 compress");
    Ok(Bytes::from(dst))
}

fn lz4_decompress(channel: &str, src: &Bytes, alloc: &mut dyn Allocator) -> Result<Bytes> {
    if src.len() < LZ4_PREFIX {
        return Err(StreamError::codec(channel, "lz4 frame shorter than its length prefix"));
    }
    let uncompressed = BigEndian::read_u32(&src[..LZ4_PREFIX]) as usize;
    let mut dst = alloc.allocate(uncompressed)?;
    let written =
        lz4::block::decompress_to_buffer(&src[LZ4_PREFIX..], Some(uncompressed as i32), &mut dst)
            .map_err(|e| StreamError::codec(channel, e.to_string()))?;
    if written != uncompressed {
        return Err(StreamError::codec(
            channel,
            format!("lz4 block produced {written} bytes, prefix promised {uncompressed}"),
        ));
    }
    Ok(Bytes::from(dst))
}

fn bitshuffle_compress(
    channel: &str,
    width: usize,
    order: ByteOrder,
    src: &Bytes,
    alloc: &mut dyn Allocator,
) -> Result<Bytes> {
    if src.len() % width != 0 {
        return Err(StreamError::ElementWidth { channel: channel.into(), len: src.len(), width });
    }

    let mut shuffled = alloc.allocate(src.len())?;
    shuffle(src, width, &mut shuffled);

    let bound = lz4::block::compress_bound(src.len())
        .map_err(|e| StreamError::codec(channel, e.to_string()))?;
    let mut dst = alloc.allocate(BITSHUFFLE_PREFIX + bound)?;
    match order {
        ByteOrder::Little => {
            LittleEndian::write_u32(&mut dst[..4], src.len() as u32);
            LittleEndian::write_u32(&mut dst[4..8], src.len() as u32);
        }
        ByteOrder::Big => {
            BigEndian::write_u32(&mut dst[..4], src.len() as u32);
            BigEndian::write_u32(&mut dst[4..8], src.len() as u32);
        }
    }
    let written =
        lz4::block::compress_to_buffer(&shuffled, None, false, &mut dst[BITSHUFFLE_PREFIX..])
            .map_err(|e| StreamError::codec(channel, e.to_string()))?;
    alloc.reclaim(shuffled);
    dst.truncate(BITSHUFFLE_PREFIX + written);
    Ok(Bytes::from(dst))
}

fn bitshuffle_decompress(
    channel: &str,
    width: usize,
    order: ByteOrder,
    src: &Bytes,
    alloc: &mut dyn Allocator,
) -> Result<Bytes> {
    if src.len() < BITSHUFFLE_PREFIX {
        return Err(StreamError::codec(channel, "bitshuffle frame shorter than its header"));
    }
    let uncompressed = match order {
        ByteOrder::Little => LittleEndian::read_u32(&src[..4]),
        ByteOrder::Big => BigEndian::read_u32(&src[..4]),
    } as usize;
    if uncompressed % width != 0 {
        return Err(StreamError::ElementWidth { channel: channel.into(), len: uncompressed, width });
    }

    let mut shuffled = alloc.allocate(uncompressed)?;
    let written = lz4::block::decompress_to_buffer(
        &src[BITSHUFFLE_PREFIX..],
        Some(uncompressed as i32),
        &mut shuffled,
    )
    .map_err(|e| StreamError::codec(channel, e.to_string()))?;
    if written != uncompressed {
        return Err(StreamError::codec(
            channel,
            format!("bitshuffle block produced {written} bytes, header promised {uncompressed}"),
        ));
    }

    let mut dst = alloc.allocate(uncompressed)?;
    unshuffle(&shuffled, width, &mut dst);
    alloc.reclaim(shuffled);
    Ok(Bytes::from(dst))
}

/// Group same-significance bytes across elements: byte `b` of every element
/// lands in one contiguous run, which compresses well for slowly varying
/// numeric arrays.
fn shuffle(src: &[u8], width: usize, dst: &mut [u8]) {
    let elements = src.len() / width;
    for (e, element) in src.chunks_exact(width).enumerate() {
        for (b, &byte) in element.iter().enumerate() {
            dst[b * elements + e] = byte;
        }
    }
}

fn unshuffle(src: &[u8], width: usize, dst: &mut [u8]) {
    let elements = src.len() / width;
    for e in 0..elements {
        for b in 0..width {
            dst[e * width + b] = src[b * elements + e];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ScratchAllocator, ThresholdAllocator};
    use crate::types::ChannelType;
    use proptest::prelude::*;

    fn config(compression: Compression, ty: ChannelType, order: ByteOrder) -> ChannelConfig {
        ChannelConfig::scalar("test_channel", ty)
            .with_compression(compression)
            .with_byte_order(order)
    }

    #[test]
    fn tag_name_bijection() {
        for codec in [Compression::Lz4, Compression::BitshuffleLz4] {
            let tag = codec.tag().unwrap();
            assert_eq!(Compression::from_tag(tag).unwrap(), codec);
        }
        assert_eq!(Compression::None.tag(), None);
        assert_eq!(Compression::Lz4.name(), "lz4");
        assert_eq!(Compression::BitshuffleLz4.name(), "bitshuffle_lz4");
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(matches!(
            Compression::from_tag(7),
            Err(StreamError::UnknownCompression { tag: 7 })
        ));
    }

    #[test]
    fn none_codec_is_zero_copy() {
        let cfg = config(Compression::None, ChannelType::Float64, ByteOrder::Little);
        let mut alloc = ThresholdAllocator::default();
        let src = Bytes::from(vec![1u8, 2, 3, 4, 5, 6, 7, 8]);
        let out = compress_data(&cfg, &src, &mut alloc).unwrap();
        assert_eq!(out.as_ptr(), src.as_ptr());
        let back = decompress_data(&cfg, &out, &mut alloc).unwrap();
        assert_eq!(back.as_ptr(), src.as_ptr());
    }

    #[test]
    fn lz4_frame_carries_big_endian_length_prefix() {
        let cfg = config(Compression::Lz4, ChannelType::Int32, ByteOrder::Little);
        let mut alloc = ThresholdAllocator::default();
        let src = Bytes::from(vec![0u8; 1000]);
        let out = compress_data(&cfg, &src, &mut alloc).unwrap();
        assert_eq!(BigEndian::read_u32(&out[..4]), 1000);
        assert!(out.len() < src.len(), "zero run should compress");
    }

    #[test]
    fn lz4_header_operations_are_not_implemented() {
        let mut alloc = ThresholdAllocator::default();
        let src = Bytes::from_static(b"header bytes");
        assert!(matches!(
            compress_header(Compression::Lz4, &src, &mut alloc),
            Err(StreamError::UnsupportedHeaderCodec { operation: "compress_header" })
        ));
        assert!(matches!(
            decompress_header(Compression::Lz4, &src, &mut alloc),
            Err(StreamError::UnsupportedHeaderCodec { operation: "decompress_header" })
        ));
    }

    #[test]
    fn bitshuffle_header_blob_roundtrip_is_big_endian() {
        let mut alloc = ThresholdAllocator::default();
        let src = Bytes::from(vec![42u8; 257]);
        let out = compress_header(Compression::BitshuffleLz4, &src, &mut alloc).unwrap();
        assert_eq!(BigEndian::read_u32(&out[..4]), 257);
        let back = decompress_header(Compression::BitshuffleLz4, &out, &mut alloc).unwrap();
        assert_eq!(back, src);
    }

    #[test]
    fn bitshuffle_frame_length_fields_follow_channel_order() {
        let mut alloc = ThresholdAllocator::default();
        let src = Bytes::from(vec![9u8; 64]);
        let cases: [(ByteOrder, fn(&[u8]) -> u32); 2] = [
            (ByteOrder::Little, LittleEndian::read_u32),
            (ByteOrder::Big, BigEndian::read_u32),
        ];
        for (order, read) in cases {
            let cfg = config(Compression::BitshuffleLz4, ChannelType::Int64, order);
            let out = compress_data(&cfg, &src, &mut alloc).unwrap();
            assert_eq!(read(&out[..4]), 64);
            assert_eq!(read(&out[4..8]), 64);
        }
    }

    #[test]
    fn bitshuffle_rejects_misaligned_input_both_directions() {
        let cfg = config(Compression::BitshuffleLz4, ChannelType::Float64, ByteOrder::Little);
        let mut alloc = ThresholdAllocator::default();

        let src = Bytes::from(vec![0u8; 13]);
        assert!(matches!(
            compress_data(&cfg, &src, &mut alloc),
            Err(StreamError::ElementWidth { width: 8, len: 13, .. })
        ));

        // Forge a frame whose promised uncompressed size is misaligned.
        let mut forged = vec![0u8; 8];
        LittleEndian::write_u32(&mut forged[..4], 13);
        LittleEndian::write_u32(&mut forged[4..8], 13);
        assert!(matches!(
            decompress_data(&cfg, &Bytes::from(forged), &mut alloc),
            Err(StreamError::ElementWidth { width: 8, len: 13, .. })
        ));
    }

    #[test]
    fn string_channels_shuffle_at_width_one() {
        let cfg = config(Compression::BitshuffleLz4, ChannelType::String, ByteOrder::Little);
        let mut alloc = ThresholdAllocator::default();
        let src = Bytes::from_static(b"any odd length works");
        let out = compress_data(&cfg, &src, &mut alloc).unwrap();
        let back = decompress_data(&cfg, &out, &mut alloc).unwrap();
        assert_eq!(back, src);
    }

    #[test]
    fn shuffle_groups_bytes_by_significance() {
        let src = [0x01, 0x02, 0x11, 0x12, 0x21, 0x22];
        let mut dst = [0u8; 6];
        shuffle(&src, 2, &mut dst);
        assert_eq!(dst, [0x01, 0x11, 0x21, 0x02, 0x12, 0x22]);
        let mut back = [0u8; 6];
        unshuffle(&dst, 2, &mut back);
        assert_eq!(back, src);
    }

    proptest! {
        #[test]
        fn all_codecs_roundtrip_bit_for_bit(
            elements in prop::collection::vec(any::<i64>(), 0..256),
            codec in prop::sample::select(vec![
                Compression::None, Compression::Lz4, Compression::BitshuffleLz4,
            ]),
            order in prop::sample::select(vec![ByteOrder::Little, ByteOrder::Big]),
        ) {
            let raw: Vec<u8> = elements
                .iter()
                .flat_map(|v| match order {
                    ByteOrder::Little => v.to_le_bytes(),
                    ByteOrder::Big => v.to_be_bytes(),
                })
                .collect();
            let src = Bytes::from(raw);
            let cfg = config(codec, ChannelType::Int64, order);
            let mut alloc = ScratchAllocator::new();

            let compressed = compress_data(&cfg, &src, &mut alloc).unwrap();
            let back = decompress_data(&cfg, &compressed, &mut alloc).unwrap();
            prop_assert_eq!(back, src);
        }

        #[test]
        fn compressed_data_survives_a_scratch_allocator_cycle(
            payload in prop::collection::vec(any::<u8>(), 8..2048),
        ) {
            let len = payload.len() - payload.len() % 8;
            let src = Bytes::from(payload[..len].to_vec());
            let cfg = config(Compression::BitshuffleLz4, ChannelType::Float64, ByteOrder::Big);
            let mut alloc = ScratchAllocator::new();
            for _ in 0..3 {
                let compressed = compress_data(&cfg, &src, &mut alloc).unwrap();
                let back = decompress_data(&cfg, &compressed, &mut alloc).unwrap();
                prop_assert_eq!(&back, &src);
            }
        }
    }
}
