//! Session authentication
//!
//! Handles:
//! - Session token verification (tokens are issued by the identity provider)
//! - Authentication middleware and extractors

mod middleware;
pub mod session;

pub use middleware::{CurrentUser, MaybeUser, require_auth};
pub use session::{Session, create_session_token, verify_session_token};
