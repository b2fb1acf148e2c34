//! # Framework Errors
//!
//! This module defines the error taxonomy shared by every part of the substrate.
//! All errors are raised synchronously at the point of detection and surface to
//! whoever is pulling from the dispatch or propagation iterator. Nothing here is
//! retried internally.

use crate::entity::EntityId;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error raised by user handler code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur within the actor substrate itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Scene resolution was attempted outside any scoped activation.
    #[error("No active scene for actor {0}")]
    NoActiveScene(EntityId),

    /// The actor has no handler registered for the message's concrete type.
    #[error("Actor {actor} cannot handle {kind} message {message}")]
    UnhandledMessage {
        actor: EntityId,
        message: EntityId,
        kind: &'static str,
    },

    /// The message had no receiver at send time.
    #[error("Message {0} has no receiver")]
    MissingReceiver(EntityId),

    /// Bounded nearest-ancestor search found no match.
    ///
    /// `exhausted` is set when the walk stopped because it hit `searched == max_height`
    /// rather than because the chain ran out.
    #[error("No ancestor of kind {kinds:?} within {searched} steps")]
    AncestorNotFound {
        kinds: Vec<&'static str>,
        searched: usize,
        exhausted: bool,
    },

    /// A scene lookup was made with a key type the operation does not accept.
    #[error("Unsupported lookup key: {0}")]
    UnsupportedKey(String),

    /// A scene lookup by id found nothing.
    #[error("No member {0} in scene")]
    UnknownMember(String),

    /// Malformed entity construction or deserialization.
    #[error("Invalid {kind}: {reason}")]
    Validation { kind: String, reason: String },

    /// A handler raised while processing a message.
    #[error("Handler error: {0}")]
    Handler(#[source] BoxError),
}

impl Error {
    pub(crate) fn validation(kind: impl Into<String>, reason: impl ToString) -> Self {
        Error::Validation {
            kind: kind.into(),
            reason: reason.to_string(),
        }
    }

    /// Wrap an arbitrary error raised by handler code.
    pub fn handler<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Handler(err.into())
    }
}
