pub mod config;
pub mod directory;
pub mod error;
pub mod http;
pub mod nats;
pub mod protocol;
pub mod publisher;
pub mod relay;
pub mod session;
pub mod transport;

pub use config::Config;
pub use directory::{DeviceDirectory, DeviceInfo, StaticDirectory};
pub use error::{RelayError, RelayResult};
pub use http::{create_router, AppState};
pub use nats::{AudioEventMessage, NatsPublisher};
pub use protocol::{Frame, FrameCodec, FrameType};
pub use publisher::AudioPublisher;
pub use relay::{FailureReason, RelayFacade, SessionRegistry, StartFailure};
pub use session::{RelaySession, SessionConfig, SessionState, SessionStats};
pub use transport::{
    Connector, TcpConnector, TcpTransport, Transport, TransportConfig, TransportEvent,
    TransportEvents,
};
