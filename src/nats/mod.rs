pub mod client;
pub mod messages;

pub use client::NatsPublisher;
pub use messages::AudioEventMessage;
