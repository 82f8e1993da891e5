//! Node-addressed HTTP and WebSocket relay.
//!
//! Every node runs the same server. A request naming another node (via the
//! `nodeId` query parameter or the `X-Node-Id` header) is forwarded to that
//! node's address; everything else is served by the local routes.

// Core subsystems
pub mod config;
pub mod directory;
pub mod http;
pub mod relay;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::RelayNodeConfig;
pub use directory::{NodeAddressResolver, StaticDirectory};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
