//! # Messages
//!
//! A [`Message`] is an entity carrying a typed payload from a sender to a receiver,
//! optionally pointing at the message it responds to (its *parent*). A message has at
//! most one parent, so lineage always forms singly rooted chains.
//!
//! ## Declaring message types
//!
//! ```rust
//! use actor_scene::{message, Kind};
//!
//! message! {
//!     /// Objectives handed down a hierarchy.
//!     pub struct Okr {
//!         pub objective: String,
//!         pub key_results: Vec<String>,
//!     }
//! }
//!
//! assert_eq!(Okr::KIND, "okr");
//! ```
//!
//! ## Reply and forward
//!
//! [`Message::reply_to`] swaps sender and receiver; [`Message::forward`] keeps the
//! current receiver as the new sender and addresses a third party. Both set the parent
//! and lift the original payload (plus metadata) into the new payload type, so fields
//! shared between the two types carry over. Overrides are deep-merged on top.
//!
//! ## Canonical JSON
//!
//! [`Message::to_json`] produces one object with the message's own fields flattened next
//! to its payload, plus a flat `lineage` array of its ancestors (oldest first). Each
//! record refers to its parent by `parent_id`, which keeps deep chains free of nesting
//! limits. [`Message::from_json`] rebuilds the chain with the help of a
//! [`MessageRegistry`].

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::actor::{ActorDirectory, ActorRef, BareActor};
use crate::entity::{deep_merge, prune_nulls, EntityId, Kind, Metadata};
use crate::error::{Error, Result};
use crate::lineage;

/// Field names owned by the envelope; payloads must not use them.
pub const RESERVED_FIELDS: &[&str] = &[
    "id",
    "type",
    "created_at",
    "metadata",
    "sender",
    "receiver",
    "parent",
    "parent_id",
    "lineage",
];

/// A payload type that can travel inside a [`Message`].
///
/// Implemented by the [`message!`](crate::message) macro.
pub trait MessageType:
    Kind + Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static
{
}

/// Declares a message payload type.
///
/// The declaring crate must depend on `serde` with the `derive` feature.
#[macro_export]
macro_rules! message {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$fmeta:meta])* $fvis:vis $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, ::serde::Serialize, ::serde::Deserialize)]
        $vis struct $name {
            $( $(#[$fmeta])* $fvis $field : $ty ),*
        }

        $crate::kind!($name);

        impl $crate::MessageType for $name {}
    };
}

/// Identifies a concrete payload type. Equality is by type, not by name.
#[derive(Clone, Copy)]
pub struct MessageKind {
    type_id: TypeId,
    name: &'static str,
}

impl MessageKind {
    pub fn of<M: MessageType>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            name: M::KIND,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for MessageKind {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for MessageKind {}

impl Hash for MessageKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state)
    }
}

impl fmt::Debug for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

pub(crate) trait Payload: fmt::Debug + Send + Sync {
    fn kind(&self) -> MessageKind;

    fn to_value(&self) -> serde_json::Result<Value>;

    fn as_any(&self) -> &dyn Any;
}

impl<M: MessageType> Payload for M {
    fn kind(&self) -> MessageKind {
        MessageKind::of::<M>()
    }

    fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A typed payload routed from `sender` to `receiver`, with optional lineage.
#[derive(Clone)]
pub struct Message {
    id: EntityId,
    created_at: DateTime<Utc>,
    metadata: Metadata,
    sender: ActorRef,
    receiver: Option<ActorRef>,
    parent: Option<Arc<Message>>,
    payload: Arc<dyn Payload>,
}

impl Message {
    pub fn new<M: MessageType>(sender: ActorRef, receiver: ActorRef, payload: M) -> Self {
        Self::assemble(sender, Some(receiver), None, Metadata::new(), Arc::new(payload))
    }

    /// A message with no receiver yet. Sending it fails with [`Error::MissingReceiver`].
    pub fn unaddressed<M: MessageType>(sender: ActorRef, payload: M) -> Self {
        Self::assemble(sender, None, None, Metadata::new(), Arc::new(payload))
    }

    /// Builds a message of type `M` from a JSON field set.
    ///
    /// `fields` may carry a `metadata` object next to the payload fields.
    pub fn from_fields<M: MessageType>(
        sender: ActorRef,
        receiver: Option<ActorRef>,
        fields: Value,
    ) -> Result<Self> {
        Self::lifted::<M>(sender, receiver, None, fields)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Reply to `message` as type `M`: sender and receiver swap, `message` becomes the parent.
    pub fn reply_to<M: MessageType>(message: &Arc<Message>, overrides: Value) -> Result<Self> {
        let sender = message.addressee()?;
        let receiver = message.sender.clone();
        let mut fields = message.fields()?;
        deep_merge(&mut fields, overrides);
        Self::lifted::<M>(sender, Some(receiver), Some(message.clone()), fields)
    }

    /// Forward `message` as type `M` to `receiver`, attributed to whoever received it.
    pub fn forward<M: MessageType>(
        message: &Arc<Message>,
        receiver: ActorRef,
        overrides: Value,
    ) -> Result<Self> {
        let sender = message.addressee()?;
        let mut fields = message.fields()?;
        deep_merge(&mut fields, overrides);
        Self::lifted::<M>(sender, Some(receiver), Some(message.clone()), fields)
    }

    pub fn reply_with<M: MessageType>(self: &Arc<Self>, overrides: Value) -> Result<Self> {
        Self::reply_to::<M>(self, overrides)
    }

    pub fn forward_to<M: MessageType>(
        self: &Arc<Self>,
        receiver: ActorRef,
        overrides: Value,
    ) -> Result<Self> {
        Self::forward::<M>(self, receiver, overrides)
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn sender(&self) -> &ActorRef {
        &self.sender
    }

    pub fn receiver(&self) -> Option<&ActorRef> {
        self.receiver.as_ref()
    }

    pub fn parent(&self) -> Option<&Arc<Message>> {
        self.parent.as_ref()
    }

    pub fn sender_id(&self) -> &EntityId {
        self.sender.id()
    }

    pub fn receiver_id(&self) -> Option<&EntityId> {
        self.receiver.as_ref().map(|r| r.id())
    }

    pub fn parent_id(&self) -> Option<&EntityId> {
        self.parent.as_ref().map(|p| p.id())
    }

    /// The concrete payload type.
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    pub fn is<M: MessageType>(&self) -> bool {
        self.payload.as_any().is::<M>()
    }

    pub fn payload<M: MessageType>(&self) -> Option<&M> {
        self.payload.as_any().downcast_ref()
    }

    /// Canonical JSON of this message and its whole lineage.
    pub fn to_json(&self) -> Result<String> {
        let mut record = self.record()?;
        let ancestors: Vec<_> = lineage::ancestors(self).collect();
        let lineage = ancestors
            .iter()
            .rev()
            .map(|ancestor| ancestor.record().map(Value::Object))
            .collect::<Result<Vec<_>>>()?;
        if !lineage.is_empty() {
            record.insert("lineage".into(), Value::Array(lineage));
        }
        let mut value = Value::Object(record);
        prune_nulls(&mut value);
        Ok(value.to_string())
    }

    /// Rebuilds a message (and its ancestors) from [`Message::to_json`] output.
    pub fn from_json(text: &str, registry: &MessageRegistry) -> Result<Arc<Message>> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| Error::validation("message", e))?;
        let Value::Object(mut record) = value else {
            return Err(Error::validation("message", "expected a JSON object"));
        };

        let mut known: HashMap<EntityId, Arc<Message>> = HashMap::new();
        if let Some(lineage) = record.remove("lineage") {
            let Value::Array(ancestors) = lineage else {
                return Err(Error::validation("message", "`lineage` must be an array"));
            };
            for ancestor in ancestors {
                let Value::Object(ancestor) = ancestor else {
                    return Err(Error::validation("message", "lineage entries must be objects"));
                };
                let message = Arc::new(registry.decode_record(ancestor, &known)?);
                known.insert(message.id.clone(), message);
            }
        }
        registry.decode_record(record, &known).map(Arc::new)
    }

    fn assemble(
        sender: ActorRef,
        receiver: Option<ActorRef>,
        parent: Option<Arc<Message>>,
        metadata: Metadata,
        payload: Arc<dyn Payload>,
    ) -> Self {
        Self {
            id: EntityId::generate(payload.kind().name()),
            created_at: Utc::now(),
            metadata,
            sender,
            receiver,
            parent,
            payload,
        }
    }

    fn lifted<M: MessageType>(
        sender: ActorRef,
        receiver: Option<ActorRef>,
        parent: Option<Arc<Message>>,
        fields: Value,
    ) -> Result<Self> {
        let mut fields = match fields {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            other => return Err(Error::validation(M::KIND, format!("expected an object, got {}", other))),
        };
        let metadata = take_metadata(M::KIND, &mut fields)?;
        if let Some(field) = RESERVED_FIELDS.iter().find(|f| fields.contains_key(**f)) {
            return Err(Error::validation(M::KIND, format!("field `{}` cannot be set", field)));
        }
        let payload: M =
            serde_json::from_value(Value::Object(fields)).map_err(|e| Error::validation(M::KIND, e))?;
        Ok(Self::assemble(sender, receiver, parent, metadata, Arc::new(payload)))
    }

    fn addressee(&self) -> Result<ActorRef> {
        self.receiver
            .clone()
            .ok_or_else(|| Error::MissingReceiver(self.id.clone()))
    }

    /// Payload fields plus metadata, the field set inherited by replies and forwards.
    fn fields(&self) -> Result<Value> {
        let mut fields = match self.payload.to_value() {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => Map::new(),
            Err(e) => return Err(Error::validation(self.kind().name(), e)),
        };
        fields.insert("metadata".into(), Value::Object(self.metadata.clone()));
        Ok(Value::Object(fields))
    }

    fn record(&self) -> Result<Map<String, Value>> {
        let mut record = match self.payload.to_value() {
            Ok(Value::Object(fields)) => fields,
            Ok(Value::Null) => Map::new(),
            Ok(other) => {
                return Err(Error::validation(
                    self.kind().name(),
                    format!("payload must serialize to an object, got {}", other),
                ))
            }
            Err(e) => return Err(Error::validation(self.kind().name(), e)),
        };
        if let Some(field) = RESERVED_FIELDS.iter().find(|f| record.contains_key(**f)) {
            return Err(Error::validation(
                self.kind().name(),
                format!("payload field `{}` collides with the envelope", field),
            ));
        }
        record.insert("id".into(), Value::String(self.id.to_string()));
        record.insert("type".into(), Value::String(self.kind().name().into()));
        record.insert("created_at".into(), Value::String(self.created_at.to_rfc3339()));
        record.insert("metadata".into(), Value::Object(self.metadata.clone()));
        record.insert("sender".into(), actor_record(&self.sender));
        if let Some(receiver) = &self.receiver {
            record.insert("receiver".into(), actor_record(receiver));
        }
        if let Some(parent) = &self.parent {
            record.insert("parent_id".into(), Value::String(parent.id.to_string()));
        }
        Ok(record)
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        // Unlink the chain iteratively; the default drop recurses once per ancestor.
        let mut next = self.parent.take();
        while let Some(parent) = next {
            next = Arc::into_inner(parent).and_then(|mut parent| parent.parent.take());
        }
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Message {}

impl Hash for Message {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("sender", self.sender.id())
            .field("receiver", &self.receiver_id())
            .field("parent", &self.parent_id())
            .field("payload", &self.payload)
            .finish()
    }
}

/// Canonical JSON of the message itself, without its ancestors.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.record() {
            Ok(record) => {
                let mut value = Value::Object(record);
                prune_nulls(&mut value);
                write!(f, "{}", value)
            }
            Err(e) => write!(f, "{} ({})", self.id, e),
        }
    }
}

fn actor_record(actor: &ActorRef) -> Value {
    let mut record = Map::new();
    record.insert("id".into(), Value::String(actor.id().to_string()));
    record.insert("type".into(), Value::String(actor.kind().into()));
    record.insert("metadata".into(), Value::Object(actor.metadata().clone()));
    Value::Object(record)
}

fn take_metadata(kind: &str, fields: &mut Map<String, Value>) -> Result<Metadata> {
    match fields.remove("metadata") {
        None | Some(Value::Null) => Ok(Metadata::new()),
        Some(Value::Object(metadata)) => Ok(metadata),
        Some(_) => Err(Error::validation(kind, "field `metadata` must be an object")),
    }
}

fn take_string(fields: &mut Map<String, Value>, field: &str) -> Result<String> {
    match fields.remove(field) {
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(Error::validation("message", format!("field `{}` must be a string", field))),
        None => Err(Error::validation("message", format!("missing field `{}`", field))),
    }
}

type Decoder = fn(Value) -> Result<Arc<dyn Payload>>;

fn decode_payload<M: MessageType>(value: Value) -> Result<Arc<dyn Payload>> {
    let payload: M = serde_json::from_value(value).map_err(|e| Error::validation(M::KIND, e))?;
    Ok(Arc::new(payload))
}

/// Payload decoders by kind name, plus an optional directory for re-binding actors.
///
/// Actors not found in the directory are restored as [`BareActor`]s carrying the
/// original id and metadata.
#[derive(Default)]
pub struct MessageRegistry {
    decoders: HashMap<&'static str, Decoder>,
    directory: Option<Arc<dyn ActorDirectory>>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: MessageType>(mut self) -> Self {
        self.decoders.insert(M::KIND, decode_payload::<M> as Decoder);
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn ActorDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    fn decode_record(
        &self,
        mut record: Map<String, Value>,
        known: &HashMap<EntityId, Arc<Message>>,
    ) -> Result<Message> {
        let id = EntityId::from(take_string(&mut record, "id")?);
        let kind = take_string(&mut record, "type")?;
        let decoder = self
            .decoders
            .get(kind.as_str())
            .ok_or_else(|| Error::validation(kind.clone(), "unregistered message type"))?;

        let created_at = DateTime::parse_from_rfc3339(&take_string(&mut record, "created_at")?)
            .map_err(|e| Error::validation(kind.clone(), format!("field `created_at`: {}", e)))?
            .with_timezone(&Utc);
        let metadata = take_metadata(&kind, &mut record)?;
        let sender = match record.remove("sender") {
            Some(sender) => self.resolve_actor(sender)?,
            None => return Err(Error::validation(kind, "missing field `sender`")),
        };
        let receiver = match record.remove("receiver") {
            Some(Value::Null) | None => None,
            Some(receiver) => Some(self.resolve_actor(receiver)?),
        };
        let parent = match record.remove("parent_id") {
            Some(Value::Null) | None => None,
            Some(Value::String(parent_id)) => {
                let parent = known.get(&EntityId::from(parent_id.as_str())).ok_or_else(|| {
                    Error::validation(
                        kind.clone(),
                        format!("parent `{}` is not an earlier lineage record", parent_id),
                    )
                })?;
                Some(parent.clone())
            }
            Some(_) => return Err(Error::validation(kind, "field `parent_id` must be a string")),
        };

        let payload = decoder(Value::Object(record))?;
        Ok(Message {
            id,
            created_at,
            metadata,
            sender,
            receiver,
            parent,
            payload,
        })
    }

    fn resolve_actor(&self, record: Value) -> Result<ActorRef> {
        let Value::Object(mut record) = record else {
            return Err(Error::validation("actor", "expected an object"));
        };
        let id = EntityId::from(take_string(&mut record, "id")?);
        if let Some(actor) = self.directory.as_ref().and_then(|d| d.resolve(&id)) {
            return Ok(actor);
        }
        let metadata = take_metadata("actor", &mut record)?;
        Ok(BareActor::restore(id, metadata))
    }
}

impl fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRegistry")
            .field("kinds", &self.decoders.keys().collect::<Vec<_>>())
            .field("directory", &self.directory.is_some())
            .finish()
    }
}
