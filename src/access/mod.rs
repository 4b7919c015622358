//! Volume Access
//!
//! Reconciles which hosts can see a volume:
//! - Intents: all nPod hosts, one host, the owner, or nobody
//! - Revocation: asynchronous LUN deletion with bounded confirmation polling
//! - Reconciler: the minimal set of LUN creations and deletions per intent

pub mod intent;
pub mod reconciler;
pub mod revocation;

pub use intent::*;
pub use reconciler::*;
pub use revocation::*;
