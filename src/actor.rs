//! # Actors
//!
//! An actor is any type that embeds an [`ActorCore`] and implements [`Actor`]. The core
//! carries identity, metadata, the event emitter and the shared dispatch table; the trait
//! supplies everything else as provided methods.
//!
//! ## Dispatch
//!
//! [`Actor::send`] does not run the handler immediately. It returns a [`Dispatch`]
//! iterator; the first pull emits [`ActorEvent::BeforeReceive`], invokes the handler,
//! emits [`ActorEvent::AfterReceive`] on success, and yields the first reply. Nothing
//! happens if the iterator is never pulled.
//!
//! ## Scene resolution
//!
//! Actors do not hold a pointer to "their" scene. Relationships are resolved against
//! whatever scene is current in the caller's [`SceneContext`], which is what lets one
//! actor take part in several nested scenes.

use once_cell::sync::Lazy;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::entity::{EntityId, Kind, Metadata};
use crate::error::{Error, Result};
use crate::events::{ActorEvent, EventEmitter};
use crate::handler::{HandlerTable, Replies};
use crate::message::{Message, MessageKind};
use crate::scene::{Relationship, Scene, SceneContext};

/// Shared handle to any actor.
pub type ActorRef = Arc<dyn Actor>;

/// State every actor carries.
pub struct ActorCore {
    id: EntityId,
    kind: &'static str,
    metadata: Metadata,
    handlers: Arc<HandlerTable>,
    events: EventEmitter,
}

impl ActorCore {
    /// Core for actor type `A`, with an id prefixed by `A::KIND`.
    pub fn new<A: Kind>(handlers: Arc<HandlerTable>) -> Self {
        Self::named(A::KIND, handlers)
    }

    pub fn named(kind: &'static str, handlers: Arc<HandlerTable>) -> Self {
        Self {
            id: EntityId::generate(kind),
            kind,
            metadata: Metadata::new(),
            handlers,
            events: EventEmitter::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub(crate) fn restore(kind: &'static str, id: EntityId, metadata: Metadata, handlers: Arc<HandlerTable>) -> Self {
        Self {
            id,
            kind,
            metadata,
            handlers,
            events: EventEmitter::new(),
        }
    }
}

impl fmt::Debug for ActorCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorCore")
            .field("id", &self.id)
            .field("handlers", &self.handlers)
            .finish()
    }
}

pub trait Actor: Send + Sync + 'static {
    fn core(&self) -> &ActorCore;

    /// The concrete actor, for handler downcasting.
    fn as_any(&self) -> &dyn Any;

    fn id(&self) -> &EntityId {
        &self.core().id
    }

    fn kind(&self) -> &'static str {
        self.core().kind
    }

    fn metadata(&self) -> &Metadata {
        &self.core().metadata
    }

    fn events(&self) -> &EventEmitter {
        &self.core().events
    }

    fn handlers(&self) -> &Arc<HandlerTable> {
        &self.core().handlers
    }

    /// True iff `message` is addressed to this actor and its concrete type has a handler.
    fn can_receive(&self, message: &Message) -> bool {
        message.receiver_id() == Some(self.id()) && self.can_receive_kind(message.kind())
    }

    /// True iff a handler exists for `kind`, regardless of addressing.
    fn can_receive_kind(&self, kind: MessageKind) -> bool {
        self.handlers().contains(kind)
    }

    /// Lazily delivers `message` to this actor. See [`Dispatch`].
    ///
    /// Addressing is not checked here; [`crate::lineage::send`] routes by receiver.
    fn send<'a>(&'a self, message: &Arc<Message>, scope: &'a SceneContext) -> Dispatch<'a> {
        Dispatch::pending(
            Target::Borrowed {
                actor: self.as_any(),
                core: self.core(),
            },
            message.clone(),
            scope,
        )
    }

    /// The scene currently active in `scope`.
    fn scene(&self, scope: &SceneContext) -> Result<Arc<Scene>> {
        scope
            .current()
            .ok_or_else(|| Error::NoActiveScene(self.id().clone()))
    }

    /// Direct edges of this actor in the current scene, lightest first.
    fn relationships(&self, scope: &SceneContext) -> Result<Vec<Relationship>> {
        Ok(self.scene(scope)?.relationships_of(self.id()))
    }

    /// Related actors able to handle every one of `kinds`.
    fn receivers(&self, scope: &SceneContext, kinds: &[MessageKind]) -> Result<Vec<ActorRef>> {
        Ok(self
            .relationships(scope)?
            .into_iter()
            .filter(|rel| kinds.iter().all(|kind| rel.actor.can_receive_kind(*kind)))
            .map(|rel| rel.actor)
            .collect())
    }
}

impl fmt::Debug for dyn Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", self.id())
            .field("kind", &self.kind())
            .finish()
    }
}

impl PartialEq for dyn Actor {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for dyn Actor {}

/// Resolves actor ids back to live actors, e.g. when decoding messages.
pub trait ActorDirectory: Send + Sync {
    fn resolve(&self, id: &EntityId) -> Option<ActorRef>;
}

static NO_HANDLERS: Lazy<Arc<HandlerTable>> = Lazy::new(HandlerTable::empty);

/// An actor without handlers.
///
/// Useful as a plain participant (an outside caller, a sender in tests) and as the
/// stand-in for decoded actors nobody could resolve.
#[derive(Debug)]
pub struct BareActor {
    core: ActorCore,
}

crate::kind!(BareActor);

impl BareActor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            core: ActorCore::new::<Self>(NO_HANDLERS.clone()),
        })
    }

    pub fn with_metadata(metadata: Metadata) -> Arc<Self> {
        let mut core = ActorCore::new::<Self>(NO_HANDLERS.clone());
        core.metadata = metadata;
        Arc::new(Self { core })
    }

    /// Recreates an actor reference with a known id.
    pub fn restore(id: EntityId, metadata: Metadata) -> Arc<Self> {
        Arc::new(Self {
            core: ActorCore::restore(Self::KIND, id, metadata, NO_HANDLERS.clone()),
        })
    }
}

impl Actor for BareActor {
    fn core(&self) -> &ActorCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) enum Target<'a> {
    Borrowed {
        actor: &'a dyn Any,
        core: &'a ActorCore,
    },
    Shared(ActorRef),
}

enum State<'a> {
    Pending {
        target: Target<'a>,
        message: Arc<Message>,
        scope: &'a SceneContext,
    },
    Missing(EntityId),
    Running(Replies),
    Done,
}

/// Lazy delivery of one message to one actor, yielding the handler's replies.
///
/// Errors (no handler, handler failure, missing receiver) are yielded as the first item.
pub struct Dispatch<'a> {
    state: State<'a>,
}

impl<'a> Dispatch<'a> {
    pub(crate) fn pending(target: Target<'a>, message: Arc<Message>, scope: &'a SceneContext) -> Self {
        Self {
            state: State::Pending {
                target,
                message,
                scope,
            },
        }
    }

    /// A dispatch that fails on first pull because `message` has no receiver.
    pub(crate) fn missing(message: EntityId) -> Self {
        Self {
            state: State::Missing(message),
        }
    }
}

impl Iterator for Dispatch<'_> {
    type Item = Result<Arc<Message>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, State::Done) {
                State::Pending {
                    target,
                    message,
                    scope,
                } => match deliver(&target, &message, scope) {
                    Ok(replies) => self.state = State::Running(replies),
                    Err(e) => return Some(Err(e)),
                },
                State::Missing(message) => return Some(Err(Error::MissingReceiver(message))),
                State::Running(mut replies) => {
                    let reply = replies.next()?;
                    self.state = State::Running(replies);
                    return Some(reply.map(Arc::new));
                }
                State::Done => return None,
            }
        }
    }
}

impl fmt::Debug for Dispatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Pending { .. } => "pending",
            State::Missing(_) => "missing",
            State::Running(_) => "running",
            State::Done => "done",
        };
        f.debug_struct("Dispatch").field("state", &state).finish()
    }
}

fn deliver(target: &Target<'_>, message: &Arc<Message>, scope: &SceneContext) -> Result<Replies> {
    let (actor, core) = match target {
        Target::Borrowed { actor, core } => (*actor, *core),
        Target::Shared(actor) => (actor.as_any(), actor.core()),
    };
    let kind = message.kind().name();
    debug!(actor = %core.id, message = %message.id(), kind, "Receive");

    core.events.emit(ActorEvent::BeforeReceive, message);
    match core.handlers.invoke(actor, message, scope) {
        None => Err(Error::UnhandledMessage {
            actor: core.id.clone(),
            message: message.id().clone(),
            kind,
        }),
        Some(Ok(replies)) => {
            core.events.emit(ActorEvent::AfterReceive, message);
            Ok(replies)
        }
        Some(Err(e)) => {
            warn!(actor = %core.id, message = %message.id(), kind, error = %e, "Handler failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Delivery, HandlerSet};
    use crate::message;

    message! {
        struct Knock {}
    }

    message! {
        struct Answer {}
    }

    struct Door {
        core: ActorCore,
    }

    crate::kind!(Door);

    static DOOR: Lazy<Arc<HandlerTable>> = Lazy::new(|| {
        HandlerSet::<Door>::new()
            .on(|_: &Door, knock: Delivery<'_, Knock>| knock.reply::<Answer>())
            .build()
    });

    impl Door {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                core: ActorCore::new::<Self>(DOOR.clone()),
            })
        }
    }

    impl Actor for Door {
        fn core(&self) -> &ActorCore {
            &self.core
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_can_receive_requires_addressing_and_handler() {
        let visitor = BareActor::new();
        let door = Door::new();
        let other = Door::new();

        let knock = Message::new(visitor.clone(), door.clone(), Knock {});
        assert!(door.can_receive(&knock));
        assert!(!other.can_receive(&knock));
        assert!(other.can_receive_kind(MessageKind::of::<Knock>()));
        assert!(!door.can_receive_kind(MessageKind::of::<Answer>()));
        assert!(!visitor.can_receive(&Message::new(door, visitor.clone(), Knock {})));
    }

    #[test]
    fn test_send_is_lazy() {
        let scope = SceneContext::new();
        let door = Door::new();
        let knock = Arc::new(Message::new(BareActor::new(), door.clone(), Knock {}));
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = calls.clone();
        door.events().on(ActorEvent::BeforeReceive, move |_| {
            seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        });

        let dispatch = door.send(&knock, &scope);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        let replies: Vec<_> = dispatch.collect::<Result<_>>().unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].is::<Answer>());
        assert_eq!(replies[0].parent_id(), Some(knock.id()));
    }

    #[test]
    fn test_unhandled_message_names_actor_and_message() {
        let scope = SceneContext::new();
        let door = Door::new();
        let answer = Arc::new(Message::new(BareActor::new(), door.clone(), Answer {}));

        let mut dispatch = door.send(&answer, &scope);
        match dispatch.next() {
            Some(Err(Error::UnhandledMessage { actor, message, kind })) => {
                assert_eq!(&actor, door.id());
                assert_eq!(&message, answer.id());
                assert_eq!(kind, "answer");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(dispatch.next().is_none());
    }

    #[test]
    fn test_scene_requires_activation() {
        let scope = SceneContext::new();
        let door = Door::new();
        assert!(matches!(door.scene(&scope), Err(Error::NoActiveScene(id)) if &id == door.id()));
        assert!(door.receivers(&scope, &[]).is_err());
    }
}
