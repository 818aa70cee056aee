//! Data models for the orbit-link client library.
//!
//! Defines the wire types exchanged with the Orbit auth endpoints and the
//! session/capability records the client manages locally.

pub mod api_error_body;
pub mod auth_response;
pub mod authorize_url_response;
pub mod capabilities;
pub mod health_check_response;
pub mod session;
pub mod user_info;

pub use api_error_body::ApiErrorBody;
pub use auth_response::AuthResponse;
pub use authorize_url_response::AuthorizeUrlResponse;
pub use capabilities::BackendCapabilities;
pub use health_check_response::HealthCheckResponse;
pub use session::Session;
pub use user_info::UserInfo;
