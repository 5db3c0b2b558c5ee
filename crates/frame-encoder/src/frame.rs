//! Encoded frame values handed to the transport layer.
//!
//! A frame is immutable once built. Construction checks that there is at
//! least one fragment and that every fragment lies inside the frame.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{EncodeError, EncodeResult};
use crate::options::EncodingOptions;

const FRAME_HEADER_LEN: usize = 8 + 1 + 4 + 4 + 4 + 2;
const FRAGMENT_HEADER_LEN: usize = 4 + 4 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    Png,
    H264,
}

impl CodecType {
    pub fn wire_tag(self) -> u8 {
        match self {
            Self::Png => 0,
            Self::H264 => 1,
        }
    }

    pub fn from_wire_tag(tag: u8) -> EncodeResult<Self> {
        match tag {
            0 => Ok(Self::Png),
            1 => Ok(Self::H264),
            _ => Err(EncodeError::Malformed("unknown codec tag")),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::H264 => "h264",
        }
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rectangular region of a frame with its encoded payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrameFragment {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    opaque: Bytes,
    alpha: Bytes,
}

impl EncodedFrameFragment {
    pub fn new(x: i32, y: i32, width: u32, height: u32, opaque: Bytes, alpha: Bytes) -> Self {
        Self {
            x,
            y,
            width,
            height,
            opaque,
            alpha,
        }
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn opaque(&self) -> &Bytes {
        &self.opaque
    }

    /// Empty when the strategy does not split out an alpha channel.
    pub fn alpha(&self) -> &Bytes {
        &self.alpha
    }

    fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && i64::from(self.x) + i64::from(self.width) <= i64::from(frame_width)
            && i64::from(self.y) + i64::from(self.height) <= i64::from(frame_height)
    }

    fn wire_len(&self) -> usize {
        FRAGMENT_HEADER_LEN + 4 + self.opaque.len() + 4 + self.alpha.len()
    }
}

/// One encoded surface commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    serial: u64,
    codec: CodecType,
    options: EncodingOptions,
    width: u32,
    height: u32,
    fragments: Vec<EncodedFrameFragment>,
}

impl EncodedFrame {
    pub fn new(
        serial: u64,
        codec: CodecType,
        options: EncodingOptions,
        width: u32,
        height: u32,
        fragments: Vec<EncodedFrameFragment>,
    ) -> EncodeResult<Self> {
        if fragments.is_empty() {
            return Err(EncodeError::EmptyFrame);
        }
        if let Some(bad) = fragments.iter().find(|f| !f.fits_within(width, height)) {
            return Err(EncodeError::InvalidFragmentGeometry {
                x: bad.x,
                y: bad.y,
                width: bad.width,
                height: bad.height,
                frame_width: width,
                frame_height: height,
            });
        }
        Ok(Self {
            serial,
            codec,
            options,
            width,
            height,
            fragments,
        })
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn codec(&self) -> CodecType {
        self.codec
    }

    pub fn options(&self) -> EncodingOptions {
        self.options
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fragments(&self) -> &[EncodedFrameFragment] {
        &self.fragments
    }

    /// True when a single fragment spans the whole frame.
    pub fn covers_full_frame(&self) -> bool {
        matches!(
            self.fragments.as_slice(),
            [only] if only.x == 0 && only.y == 0 && only.width == self.width && only.height == self.height
        )
    }

    /// Sum of opaque and alpha payload bytes across fragments.
    pub fn payload_len(&self) -> usize {
        self.fragments
            .iter()
            .map(|f| f.opaque.len() + f.alpha.len())
            .sum()
    }

    /// Serializes the frame value, big-endian, in the field order the remote
    /// decoder reads it.
    pub fn to_bytes(&self) -> EncodeResult<Bytes> {
        let fragment_count = u16::try_from(self.fragments.len())
            .map_err(|_| EncodeError::Malformed("too many fragments"))?;
        let body: usize = self.fragments.iter().map(EncodedFrameFragment::wire_len).sum();
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + body);
        buf.put_u64(self.serial);
        buf.put_u8(self.codec.wire_tag());
        buf.put_u32(self.options.bits());
        buf.put_u32(self.width);
        buf.put_u32(self.height);
        buf.put_u16(fragment_count);
        for fragment in &self.fragments {
            buf.put_i32(fragment.x);
            buf.put_i32(fragment.y);
            buf.put_u32(fragment.width);
            buf.put_u32(fragment.height);
            put_payload(&mut buf, &fragment.opaque)?;
            put_payload(&mut buf, &fragment.alpha)?;
        }
        Ok(buf.freeze())
    }

    /// Reads a frame written by [`EncodedFrame::to_bytes`]. Payloads are
    /// sliced out of `bytes` without copying.
    pub fn parse(bytes: Bytes) -> EncodeResult<Self> {
        let mut cursor = bytes;
        if cursor.remaining() < FRAME_HEADER_LEN {
            return Err(EncodeError::Malformed("truncated frame header"));
        }
        let serial = cursor.get_u64();
        let codec = CodecType::from_wire_tag(cursor.get_u8())?;
        let options = EncodingOptions::from_bits(cursor.get_u32());
        let width = cursor.get_u32();
        let height = cursor.get_u32();
        let count = cursor.get_u16() as usize;

        let mut fragments = Vec::with_capacity(count);
        for _ in 0..count {
            if cursor.remaining() < FRAGMENT_HEADER_LEN {
                return Err(EncodeError::Malformed("truncated fragment header"));
            }
            let x = cursor.get_i32();
            let y = cursor.get_i32();
            let fragment_width = cursor.get_u32();
            let fragment_height = cursor.get_u32();
            let opaque = take_payload(&mut cursor)?;
            let alpha = take_payload(&mut cursor)?;
            fragments.push(EncodedFrameFragment::new(
                x,
                y,
                fragment_width,
                fragment_height,
                opaque,
                alpha,
            ));
        }
        if cursor.has_remaining() {
            return Err(EncodeError::Malformed("trailing bytes after frame"));
        }
        Self::new(serial, codec, options, width, height, fragments)
    }
}

fn put_payload(buf: &mut BytesMut, payload: &Bytes) -> EncodeResult<()> {
    let len = u32::try_from(payload.len()).map_err(|_| EncodeError::Malformed("payload too large"))?;
    buf.put_u32(len);
    buf.put_slice(payload);
    Ok(())
}

fn take_payload(cursor: &mut Bytes) -> EncodeResult<Bytes> {
    if cursor.remaining() < 4 {
        return Err(EncodeError::Malformed("truncated payload length"));
    }
    let len = cursor.get_u32() as usize;
    if cursor.remaining() < len {
        return Err(EncodeError::Malformed("truncated payload"));
    }
    Ok(cursor.split_to(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(x: i32, y: i32, width: u32, height: u32) -> EncodedFrameFragment {
        EncodedFrameFragment::new(
            x,
            y,
            width,
            height,
            Bytes::from_static(b"opaque"),
            Bytes::new(),
        )
    }

    #[test]
    fn rejects_empty_fragment_list() {
        let err = EncodedFrame::new(1, CodecType::Png, EncodingOptions::empty(), 4, 4, vec![])
            .unwrap_err();
        assert_eq!(err, EncodeError::EmptyFrame);
    }

    #[test]
    fn rejects_fragment_outside_frame() {
        let err = EncodedFrame::new(
            1,
            CodecType::Png,
            EncodingOptions::empty(),
            64,
            32,
            vec![fragment(0, 0, 64, 32), fragment(60, 0, 8, 8)],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EncodeError::InvalidFragmentGeometry { x: 60, width: 8, frame_width: 64, .. }
        ));

        let negative = EncodedFrame::new(
            1,
            CodecType::Png,
            EncodingOptions::empty(),
            64,
            32,
            vec![fragment(-1, 0, 4, 4)],
        );
        assert!(negative.is_err());
    }

    #[test]
    fn partial_fragments_inside_bounds_are_accepted() {
        let frame = EncodedFrame::new(
            9,
            CodecType::H264,
            EncodingOptions::empty(),
            64,
            32,
            vec![fragment(0, 0, 32, 32), fragment(32, 16, 32, 16)],
        )
        .expect("frame");
        assert!(!frame.covers_full_frame());
        assert_eq!(frame.payload_len(), 12);
    }

    #[test]
    fn serializes_fields_in_wire_order() {
        let frame = EncodedFrame::new(
            0x0102,
            CodecType::H264,
            EncodingOptions::empty().with_full_frame().with_split_alpha(),
            2,
            2,
            vec![EncodedFrameFragment::new(
                0,
                0,
                2,
                2,
                Bytes::from_static(b"op"),
                Bytes::from_static(b"a"),
            )],
        )
        .expect("frame");
        let bytes = frame.to_bytes().expect("serialize");
        assert_eq!(&bytes[..8], &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(bytes[8], 1);
        assert_eq!(&bytes[9..13], &[0, 0, 0, 3]);
        assert_eq!(&bytes[21..23], &[0, 1]);
        assert_eq!(bytes.len(), FRAME_HEADER_LEN + FRAGMENT_HEADER_LEN + 4 + 2 + 4 + 1);
        assert_eq!(&bytes[bytes.len() - 1..], b"a");

        let parsed = EncodedFrame::parse(bytes).expect("parse");
        assert_eq!(parsed, frame);
    }

    #[test]
    fn parse_rejects_truncated_payload() {
        let frame = EncodedFrame::new(
            3,
            CodecType::Png,
            EncodingOptions::empty().with_full_frame(),
            1,
            1,
            vec![fragment(0, 0, 1, 1)],
        )
        .expect("frame");
        let bytes = frame.to_bytes().expect("serialize");
        let truncated = bytes.slice(..bytes.len() - 6);
        assert_eq!(
            EncodedFrame::parse(truncated).unwrap_err(),
            EncodeError::Malformed("truncated payload")
        );
    }
}
