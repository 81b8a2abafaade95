use super::frame::{Frame, FrameType, DEFAULT_MAX_PAYLOAD, HEADER_LEN, MAX_PAYLOAD_LEN};
use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// tokio-util codec for device frames
///
/// Use with `FramedRead`/`FramedWrite` over the two halves of a `TcpStream`.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Payload limit is clamped to what the length field can carry
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload: max_payload.min(MAX_PAYLOAD_LEN),
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    fn too_large(&self, len: usize) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "frame payload too large: {} bytes (max {})",
                len, self.max_payload
            ),
        )
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let frame_type = FrameType::from_byte(src[0]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown frame type 0x{:02x}", src[0]),
            )
        })?;
        let flags = src[1];
        let len = u16::from_le_bytes([src[2], src[3]]) as usize;

        if len > self.max_payload {
            return Err(self.too_large(len));
        }

        let total = HEADER_LEN + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();

        Ok(Some(Frame {
            frame_type,
            flags,
            payload,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = item.payload.len();
        if len > self.max_payload {
            return Err(self.too_large(len));
        }

        dst.reserve(HEADER_LEN + len);
        dst.put_u8(item.frame_type.as_byte());
        dst.put_u8(item.flags);
        dst.put_u16_le(len as u16);
        dst.put_slice(&item.payload);

        Ok(())
    }
}
