//! # orbit-link
//!
//! Rust client for Orbit backends: session lifecycle, authentication, and
//! authenticated HTTP in one façade.
//!
//! The client adapts to the backend it talks to. At startup it probes the
//! health endpoint to learn whether the backend supports httpOnly-cookie
//! token refresh; modern backends get memory-only token storage with
//! transparent refresh, legacy backends fall back to durable storage
//! through an injected key-value store. Expired tokens are renewed behind
//! a single-flight orchestrator, and a 401 on any request triggers exactly
//! one refresh-and-retry before the error surfaces.
//!
//! ## Quick start
//!
//! ```no_run
//! use orbit_link::OrbitLinkClient;
//!
//! # async fn run() -> orbit_link::Result<()> {
//! let client = OrbitLinkClient::builder("http://localhost:8080")
//!     .anon_key("pk_anon_123")
//!     .build()?;
//!
//! client.initialize().await?;
//! let session = client.sign_in_with_password("a@b.com", "hunter2").await?;
//! println!("signed in as {}", session.user.email);
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod client;
pub mod discovery;
pub mod error;
pub mod host;
pub mod models;
pub mod pkce;
pub mod refresh;
pub mod store;
pub mod timeouts;
pub mod transport;

pub use callback::{AuthCallbackHandler, CallbackParams, CodeExchanger};
pub use client::{OAuthSignInOptions, OrbitLinkClient, OrbitLinkClientBuilder};
pub use discovery::CapabilityProbe;
pub use error::{OrbitLinkError, Result};
pub use host::{
    CookieStore, FileKeyValueStore, HostEnvironment, KeyValueStore, MemoryCookieJar, MemoryHost,
    MemoryKeyValueStore,
};
pub use models::{
    ApiErrorBody, AuthResponse, AuthorizeUrlResponse, BackendCapabilities, HealthCheckResponse,
    Session, UserInfo,
};
pub use refresh::{RefreshBackend, RefreshOrchestrator};
pub use store::{select_strategy, SessionStore, StorageStrategy, TokenManager};
pub use timeouts::OrbitLinkTimeouts;
pub use transport::{HttpTransport, RequestBody};
