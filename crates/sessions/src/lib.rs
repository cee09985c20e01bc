//! Per-user message sessions and the burst-batching state machine.
//!
//! A [`Session`] accumulates one user's rapid-fire messages; the
//! [`SessionRegistry`] owns all sessions behind one lock, enforces the
//! capacity bound, and provides the atomic ready-check / extract / complete
//! operations the batch scheduler drives. Nothing in this crate performs I/O:
//! expired conversations are returned as [`ArchivedConversation`] snapshots
//! for the caller to persist outside the lock.

pub mod archive;
pub mod error;
pub mod message;
pub mod registry;
pub mod session;

pub use {
    archive::{ArchiveSink, ArchivedConversation, ArchivedMessage},
    error::{Error, Result},
    message::Message,
    registry::{RegistryStats, SessionPolicy, SessionRegistry},
    session::Session,
};
