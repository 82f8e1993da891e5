//! Middleware specific to relay nodes.

pub mod relay;

pub use relay::relay_middleware;
