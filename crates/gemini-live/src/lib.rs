//! Client for the Gemini Live streaming API.
//!
//! One [`LiveSession`] holds a single websocket to the endpoint and is shared
//! by any number of features. Each feature merges its instructions and tool
//! declarations into the session config, registers handlers for its tools and
//! subscribes to the events it cares about. Tool calls from the model are
//! routed to the registered handlers and answered automatically.

pub mod config_store;
pub mod connection;
mod driver;
pub mod error;
pub mod events;
pub mod media;
pub mod registry;
pub mod session;

#[cfg(test)]
mod test_peer;

pub use config_store::{ConfigStore, LiveConfig, SetConfigOutcome};
pub use connection::{Credentials, Endpoint};
pub use error::{ConnectionError, SessionError, ToolError};
pub use events::{EventBus, EventKind, FailureKind, ListenerId, SessionEvent, SessionFailure};
pub use media::AudioFramer;
pub use registry::{NO_HANDLER, ToolHandler, ToolRegistry, tool_fn, typed_tool};
pub use session::{LiveSession, SessionState};

pub use gemini_live_types as types;
