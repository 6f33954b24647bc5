//! Authentication module for managing the client session.
//!
//! This module provides:
//! - `SessionStore`: token and user persistence over a pluggable `StorageBackend`
//! - `token`: claim decoding and expiry checks for bearer tokens
//! - `AuthStateBroadcaster`: the current user, with replay-latest observers
//! - `SessionManager`: the owned session tying the pieces together

pub mod session;
pub mod state;
pub mod store;
pub mod token;

pub use session::{Navigation, SessionManager};
pub use state::{AuthStateBroadcaster, Subscription};
pub use store::{
    Environment, FileStorage, MemoryStorage, NoopStorage, SessionStore, StorageBackend,
    StorageError, StoredSession,
};
pub use token::{Claims, DecodeError};
