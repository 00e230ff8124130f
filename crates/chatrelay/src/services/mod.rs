//! Collaborators the relay consumes through narrow interfaces
//!
//! Persistence and authentication live outside this crate; each concern is a
//! trait here with a small in-process implementation for standalone use.

pub mod identity;
pub mod interaction;
pub mod quota;

pub use identity::{IdentityResolver, StaticTokenResolver, UserId};
pub use interaction::{RequestLogger, TracingRequestLogger};
pub use quota::{InMemoryLedger, QuotaError, QuotaLedger};
