//! HTTP surface of the conversion service: router, handlers and
//! shared state. The `pixerd` binary wires this over the core
//! components; integration tests drive the router in-process.

pub mod api;
pub mod metrics;
pub mod state;

pub use api::create_router;
pub use state::AppState;
