//! The daemon's IPC surface: the request/response envelope, shared
//! param helpers, and the router that dispatches to the per-domain
//! handler families.

mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};
