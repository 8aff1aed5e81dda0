//! Console hub for stream-console
//!
//! Tracks live console connections, fans status messages out to all of
//! them, backlogs messages while nobody is connected, and routes operator
//! commands typed into any console to the backend modules.

pub mod backlog;
pub mod connection;
pub mod handle;
pub mod hub;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod router;

pub use backlog::{Backlog, BacklogEntry};
pub use connection::{ConsoleSink, ConsoleSource, HandleError};
pub use handle::{Audience, ConnectionHandle, HandleId, InboundBuffer};
pub use hub::{BroadcastReport, Hub, HubError, HubSnapshot};
pub use router::{parse_operator_command, CommandRouter};
