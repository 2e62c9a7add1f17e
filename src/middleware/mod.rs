//! HTTP middleware for throttling, authentication and fault recovery.
//!
//! - **Rate Limiting**: one token bucket per client, owned by a [`ClientRegistry`]
//! - **Authentication**: bearer token to [`Identity`](crate::auth::Identity)
//! - **Authorization**: per-route permission checks
//! - **Panic Recovery**: panics become sanitized 500 responses
//!
//! # Architecture
//!
//! ```text
//! Request → CatchPanic → Request ID → Trace → CORS → Rate Limiter → Authenticate → Permission → Handler
//!                                                       ↓               ↓             ↓
//!                                                  429 Too Many    401 Unauth    401 / 403
//! ```

pub mod auth;
pub mod client_key;
pub mod client_registry;
pub mod permission;
pub mod rate_limit;
pub mod recover;

pub use auth::AuthenticateLayer;
pub use client_key::{CidrRange, TrustedProxies, UNKNOWN_CLIENT, client_key};
pub use client_registry::{ClientRegistry, RateLimitError};
pub use permission::{RequirePermissionLayer, authorize};
pub use rate_limit::RateLimitLayer;
pub use recover::panic_response;
