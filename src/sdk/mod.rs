//! Client SDK Compatibility
//!
//! Provides version-pattern matching and the validator that gates every
//! module on a supported client-library version.

pub mod validator;
pub mod version;

pub use validator::*;
pub use version::*;
