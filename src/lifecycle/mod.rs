//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → drain_tunnels → Exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::{drain_tunnels, Shutdown};
pub use signals::wait_for_signal;
