//! Multi-tenant tool-server gateway library.

pub mod auth;
pub mod backend;
pub mod config;
pub mod gateway;
pub mod lifecycle;
pub mod observability;
pub mod pool;
pub mod session;

pub use config::GatewayConfig;
pub use gateway::{AppState, GatewayServer};
pub use lifecycle::Shutdown;
