//! Gateway HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → server.rs (router, request ID, trace)
//!     → auth middleware (session routes only)
//!     → handlers.rs
//!         /token                      → auth::TokenService
//!         /{backend}/{key}            → session registry → SSE stream
//!         /{backend}/{key}/messages   → session registry → driver task
//!     → error.rs maps failures to 401/404/400/500
//! ```

pub mod error;
pub mod handlers;
pub mod server;

pub use error::GatewayError;
pub use server::{build_router, AppState, GatewayServer};
