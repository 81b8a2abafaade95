//! Session registry and the relay entry point used by the command layer

mod facade;
mod registry;

pub use facade::{FailureReason, RelayFacade, StartFailure};
pub use registry::SessionRegistry;
