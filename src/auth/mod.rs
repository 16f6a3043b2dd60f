//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! POST /token {subject}
//!     → token.rs issue() → signed JWT back to the caller
//!
//! Any session route
//!     → middleware.rs require_bearer()
//!     → token.rs verify() → AuthContext extension or 401
//! ```
//!
//! # Design Decisions
//! - HS256 with a single server-held secret, read-only after startup
//! - Stateless: no revocation list, validity is signature + expiry
//! - All verification failures collapse to one error (no oracle leakage)

pub mod middleware;
pub mod token;

pub use middleware::{require_bearer, AuthContext};
pub use token::{AuthError, Claims, TokenService};
