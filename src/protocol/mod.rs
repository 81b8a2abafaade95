//! Device-facing wire protocol
//!
//! Every frame carries a 4 byte header followed by its payload:
//!
//! ```text
//! +---------+----------+-------------------+-----------------+
//! | type u8 | flags u8 | length u16 (LE)   | payload         |
//! +---------+----------+-------------------+-----------------+
//! ```
//!
//! Audio payloads are opaque to the relay; bit depth and DC offset handling
//! are configured on the device.

mod codec;
mod frame;

pub use codec::FrameCodec;
pub use frame::{Frame, FrameType, DEFAULT_MAX_PAYLOAD, HEADER_LEN, MAX_PAYLOAD_LEN};

/// Default TCP port the device firmware listens on
pub const DEFAULT_DEVICE_PORT: u16 = 6054;
