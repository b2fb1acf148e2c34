//! # Dispatch Tables
//!
//! Actors do not discover handlers by name at call time. Each actor type builds a
//! [`HandlerTable`] once, keyed by [`MessageKind`], and every instance shares it.
//!
//! Role behaviour is composed rather than inherited: a [`HandlerSet`] is an independent
//! bundle of handlers for some actor type, and sets can be merged with
//! [`HandlerSet::include`] before the table is built.
//!
//! ```rust
//! use actor_scene::{kind, message, Actor, ActorCore, Delivery, HandlerSet};
//!
//! message! { pub struct Ping {} }
//! message! { pub struct Pong {} }
//!
//! fn pinging<A: Actor>() -> HandlerSet<A> {
//!     HandlerSet::new().on(|_: &A, ping: Delivery<'_, Ping>| ping.reply::<Pong>())
//! }
//!
//! struct Echo { core: ActorCore }
//! kind!(Echo);
//!
//! impl Actor for Echo {
//!     fn core(&self) -> &ActorCore { &self.core }
//!     fn as_any(&self) -> &dyn std::any::Any { self }
//! }
//!
//! let table = HandlerSet::<Echo>::new().include(pinging()).build();
//! assert_eq!(table.len(), 1);
//! ```

use serde_json::Value;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use crate::actor::{Actor, ActorRef};
use crate::error::{Error, Result};
use crate::message::{Message, MessageKind, MessageType};
use crate::scene::SceneContext;

type ErasedHandler =
    Box<dyn Fn(&dyn Any, &Arc<Message>, &SceneContext) -> Result<Replies> + Send + Sync>;

struct Entry {
    kind: MessageKind,
    handler: ErasedHandler,
}

/// What a handler hands back, normalised into a sequence of zero or more replies.
///
/// Handlers may return `()`, a [`Message`], an `Option<Message>`, a `Vec<Message>`, or a
/// lazily evaluated [`Replies::stream`].
pub enum Replies {
    Empty,
    One(Message),
    Many(std::vec::IntoIter<Message>),
    Stream(Box<dyn Iterator<Item = Result<Message>> + Send>),
}

impl Replies {
    pub fn none() -> Self {
        Replies::Empty
    }

    /// Replies produced on demand, one per pull.
    pub fn stream<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<Message>>,
        I::IntoIter: Send + 'static,
    {
        Replies::Stream(Box::new(replies.into_iter()))
    }
}

impl Iterator for Replies {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Replies::Many(messages) => return messages.next().map(Ok),
            Replies::Stream(replies) => return replies.next(),
            Replies::Empty | Replies::One(_) => {}
        }
        match std::mem::replace(self, Replies::Empty) {
            Replies::One(message) => Some(Ok(message)),
            _ => None,
        }
    }
}

impl fmt::Debug for Replies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replies::Empty => f.write_str("Replies::Empty"),
            Replies::One(message) => f.debug_tuple("Replies::One").field(message).finish(),
            Replies::Many(messages) => f.debug_tuple("Replies::Many").field(&messages.len()).finish(),
            Replies::Stream(_) => f.write_str("Replies::Stream(..)"),
        }
    }
}

impl From<()> for Replies {
    fn from(_: ()) -> Self {
        Replies::Empty
    }
}

impl From<Message> for Replies {
    fn from(message: Message) -> Self {
        Replies::One(message)
    }
}

impl From<Option<Message>> for Replies {
    fn from(message: Option<Message>) -> Self {
        message.map_or(Replies::Empty, Replies::One)
    }
}

impl From<Vec<Message>> for Replies {
    fn from(messages: Vec<Message>) -> Self {
        Replies::Many(messages.into_iter())
    }
}

/// A message as seen by the handler for its concrete type.
///
/// Derefs to the typed payload.
pub struct Delivery<'a, M> {
    pub message: &'a Arc<Message>,
    pub payload: &'a M,
    pub scope: &'a SceneContext,
}

impl<M> Clone for Delivery<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Delivery<'_, M> {}

impl<M> Deref for Delivery<'_, M> {
    type Target = M;

    fn deref(&self) -> &M {
        self.payload
    }
}

impl<M> Delivery<'_, M> {
    /// Reply of type `R` to the delivered message, inheriting its fields.
    pub fn reply<R: MessageType>(&self) -> Result<Message> {
        self.message.reply_with::<R>(Value::Null)
    }

    pub fn reply_with<R: MessageType>(&self, overrides: Value) -> Result<Message> {
        self.message.reply_with::<R>(overrides)
    }

    /// Forward the delivered message, as type `R`, to `receiver`.
    pub fn forward<R: MessageType>(&self, receiver: ActorRef) -> Result<Message> {
        self.message.forward_to::<R>(receiver, Value::Null)
    }

    pub fn forward_with<R: MessageType>(&self, receiver: ActorRef, overrides: Value) -> Result<Message> {
        self.message.forward_to::<R>(receiver, overrides)
    }
}

/// A composable bundle of handlers for actor type `A`.
pub struct HandlerSet<A> {
    entries: Vec<Entry>,
    _actor: PhantomData<fn(&A)>,
}

impl<A: Actor> Default for HandlerSet<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Actor> HandlerSet<A> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            _actor: PhantomData,
        }
    }

    /// Registers `handler` for messages whose payload is exactly `M`.
    ///
    /// A later registration for the same `M` replaces the earlier one.
    pub fn on<M, F, R>(mut self, handler: F) -> Self
    where
        M: MessageType,
        F: Fn(&A, Delivery<'_, M>) -> Result<R> + Send + Sync + 'static,
        R: Into<Replies>,
    {
        let kind = MessageKind::of::<M>();
        let erased = move |actor: &dyn Any,
                           message: &Arc<Message>,
                           scope: &SceneContext|
              -> Result<Replies> {
            let actor = actor.downcast_ref::<A>().ok_or_else(|| {
                Error::validation(type_name::<A>(), "handler table bound to another actor type")
            })?;
            let payload = message
                .payload::<M>()
                .ok_or_else(|| Error::validation(M::KIND, "payload does not match handler"))?;
            let delivery = Delivery {
                message,
                payload,
                scope,
            };
            handler(actor, delivery).map(Into::into)
        };
        self.entries.retain(|entry| entry.kind != kind);
        self.entries.push(Entry {
            kind,
            handler: Box::new(erased),
        });
        self
    }

    /// Adds every handler of `other`; on conflict `other` wins.
    pub fn include(mut self, other: HandlerSet<A>) -> Self {
        for entry in other.entries {
            self.entries.retain(|existing| existing.kind != entry.kind);
            self.entries.push(entry);
        }
        self
    }

    pub fn build(self) -> Arc<HandlerTable> {
        let index = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.kind, position))
            .collect();
        Arc::new(HandlerTable {
            actor: type_name::<A>(),
            entries: self.entries,
            index,
        })
    }
}

/// Per-actor-type dispatch table from message kind to handler.
pub struct HandlerTable {
    actor: &'static str,
    entries: Vec<Entry>,
    index: HashMap<MessageKind, usize>,
}

impl HandlerTable {
    /// Starts a table for actor type `A`.
    pub fn builder<A: Actor>() -> HandlerSet<A> {
        HandlerSet::new()
    }

    /// A table with no handlers.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            actor: "",
            entries: Vec::new(),
            index: HashMap::new(),
        })
    }

    pub fn contains(&self, kind: MessageKind) -> bool {
        self.index.contains_key(&kind)
    }

    /// Registered kinds, in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = MessageKind> + '_ {
        self.entries.iter().map(|entry| entry.kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn invoke(
        &self,
        actor: &dyn Any,
        message: &Arc<Message>,
        scope: &SceneContext,
    ) -> Option<Result<Replies>> {
        let position = *self.index.get(&message.kind())?;
        Some((self.entries[position].handler)(actor, message, scope))
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("actor", &self.actor)
            .field("kinds", &self.kinds().map(|k| k.name()).collect::<Vec<_>>())
            .finish()
    }
}
