//! # Middleware
//!
//! - **[`mw_auth`]**: bearer-token authentication for the HTTP routes
//! - **[`mw_req_stamp`]**: request ids for tracing

// region: --- Modules
pub mod mw_auth;
pub mod mw_req_stamp;
// endregion: --- Modules

// region: --- Re-exports
pub use mw_auth::{require_auth, AuthUser};
pub use mw_req_stamp::{stamp_req, RequestStamp, REQUEST_ID_HEADER};
// endregion: --- Re-exports
