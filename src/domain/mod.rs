//! Domain layer - Core records and port definitions
//!
//! This module defines the records exchanged with the management cloud and
//! the traits (ports) that adapters implement, following hexagonal
//! architecture principles.

pub mod ports;

pub use ports::*;
