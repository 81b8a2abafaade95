use bytes::Bytes;

/// Size of the frame header in bytes
pub const HEADER_LEN: usize = 4;

/// Largest payload the 16-bit length field can describe
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Default payload limit (a few hundred ms of 16 kHz 16-bit mono)
pub const DEFAULT_MAX_PAYLOAD: usize = 4096;

/// Frame type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Audio chunk, either direction
    Audio = 0x01,
    /// Relay asks the device to begin streaming
    Start = 0x02,
    /// Relay asks the device to stop streaming (no ack)
    Stop = 0x03,
    Ping = 0x04,
    Pong = 0x05,
    /// Device-side failure, payload is a UTF-8 reason
    Error = 0x06,
    /// Device accepted a `Start` request
    StartAck = 0x07,
}

impl FrameType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(FrameType::Audio),
            0x02 => Some(FrameType::Start),
            0x03 => Some(FrameType::Stop),
            0x04 => Some(FrameType::Ping),
            0x05 => Some(FrameType::Pong),
            0x06 => Some(FrameType::Error),
            0x07 => Some(FrameType::StartAck),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A single decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub flags: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn audio(payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type: FrameType::Audio,
            flags: 0,
            payload: payload.into(),
        }
    }

    /// Control frame with an empty payload
    pub fn control(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            flags: 0,
            payload: Bytes::new(),
        }
    }

    pub fn error(reason: &str) -> Self {
        Self {
            frame_type: FrameType::Error,
            flags: 0,
            payload: Bytes::copy_from_slice(reason.as_bytes()),
        }
    }

    pub fn is_audio(&self) -> bool {
        self.frame_type == FrameType::Audio
    }

    /// Payload interpreted as text (used for `Error` frames)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
