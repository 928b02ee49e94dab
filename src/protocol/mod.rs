pub mod gateway;
pub mod handler;
pub mod scripted;
pub mod types;

pub use gateway::{dispatch, Capabilities, ProtocolGateway};
pub use handler::ProtocolEventHandler;
pub use scripted::ScriptedGateway;
pub use types::*;
