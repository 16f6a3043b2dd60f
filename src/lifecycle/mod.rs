//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Initialize subsystems → Spawn loops → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Stop loops → Close pools → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core state, then the listener
//! - Background loops (credential refresh, idle reaper) start exactly once
//! - Shutdown fans out over a broadcast channel

pub mod shutdown;

pub use shutdown::Shutdown;
