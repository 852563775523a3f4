//! Testing utilities (behind the `testing` feature flag).
//!
//! Enable with:
//!
//! ```toml
//! [dev-dependencies]
//! claude-query = { version = "*", features = ["testing"] }
//! ```
//!
//! # Components
//!
//! - [`MockBackend`]: [`BackendClient`](crate::BackendClient) serving scripted sessions.
//! - [`MockTransport`]: In-memory transport implementing [`Transport`](crate::transport::Transport).
//! - [`ScenarioBuilder`]: Fluent API for scripting one backend session.
//! - [`builders`]: Convenience constructors for backend messages.

pub mod builders;
pub mod mock_backend;
pub mod mock_transport;
pub mod scenario;

pub use builders::*;
pub use mock_backend::MockBackend;
pub use mock_transport::MockTransport;
pub use scenario::ScenarioBuilder;
