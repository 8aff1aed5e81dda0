//! Command bus between the console router and backend modules
//!
//! Each backend module is connected to the router by a pair of bounded
//! channels: the router owns the sending side of the module's inbound
//! queue and the receiving side of its outbound queue, the module owns
//! the other two halves.

pub mod endpoint;
pub mod events;

pub use endpoint::{module_channel, DeliveryError, ModuleEndpoint, ModulePort, RetryPolicy};
pub use events::{Command, ModuleId, UnknownModule};
