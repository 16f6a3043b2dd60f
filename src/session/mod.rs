//! Session management subsystem.
//!
//! # Data Flow
//! ```text
//! stream-open request
//!     → registry.rs open_or_attach (atomic per key)
//!     → driver task: inbound mpsc → backend.handle() → outbound mpsc
//!     → SSE stream to the client
//!
//! message submission
//!     → registry.rs route_message → inbound mpsc (in order)
//!
//! reaper.rs
//!     → periodic sweep → registry.close for idle keys
//! ```
//!
//! # Design Decisions
//! - The registry exclusively owns channels and backend instances; no
//!   other component keeps them past teardown
//! - Registry removal happens before resource release, so teardown never
//!   races message delivery

pub mod reaper;
pub mod registry;

pub use reaper::IdleReaper;
pub use registry::{RouteError, Session, SessionKey, SessionRegistry, StreamAttachment};
