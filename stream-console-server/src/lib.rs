pub mod handlers;
pub mod runtime;
pub mod server;
pub mod state;
pub mod ticker;
pub mod ws;

pub use runtime::Console;
pub use server::{build_router, run_server};
pub use state::{AppState, ModuleStatus, StatusResponse};
