//! Application shell: router construction, server lifecycle, shared state,
//! and tracing setup.

pub mod router;
pub mod server;
pub mod state;
pub mod tracing;

pub use router::{main_router, otlp_router};
pub use server::serve;
pub use state::AppState;
