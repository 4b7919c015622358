//! Management Cloud Backends
//!
//! Provides adapters implementing the store ports:
//! - Memory: in-process cloud with asynchronous LUN deletion

pub mod memory;

pub use memory::*;
