//! Control Plane Module
//!
//! Binds the reconcilers, the SDK validator and the network lookup to a
//! management cloud backend.

pub mod backends;
pub mod orchestrator;

pub use backends::*;
pub use orchestrator::*;
