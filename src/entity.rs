//! # Entity Base
//!
//! Every addressable thing in the substrate (actors, messages, and any payload entity
//! such as a shared ball or document) is an *entity*: it has an immutable, type-prefixed
//! [`EntityId`] and an open [`Metadata`] map. Equality and hashing are defined by the id
//! alone.
//!
//! ## Kinds
//!
//! The prefix of an id is the snake_case name of the concrete type, computed at compile
//! time by the [`kind!`](crate::kind) macro:
//!
//! ```rust
//! use actor_scene::{kind, Kind};
//!
//! struct SoccerPlayer;
//! kind!(SoccerPlayer);
//!
//! assert_eq!(SoccerPlayer::KIND, "soccer_player");
//! ```
//!
//! ## Lift
//!
//! [`Lift::lift`] builds a new instance of the calling type from the full field set of
//! another value, deep-merged with overrides. Identity is never copied: the lifted
//! instance always gets a fresh id. This is what lets a reply of one message type
//! inherit the payload fields of a message of another type.
//!
//! ## Canonical JSON
//!
//! [`to_canonical_json`] drops `null` fields so payloads handed to collaborators stay
//! compact; [`from_json`] reverses it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Open-ended metadata attached to every entity.
pub type Metadata = Map<String, Value>;

/// Unique, creation-ordered, type-prefixed identifier.
///
/// The suffix is a UUID v7, so ids sort roughly by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Generates a fresh id such as `ball_pass_0190f1c2...`.
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{}_{}", prefix, Uuid::now_v7().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The type prefix this id was generated with.
    pub fn prefix(&self) -> &str {
        self.0.rsplit_once('_').map_or(&self.0, |(prefix, _)| prefix)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compile-time snake_case name of a concrete type.
///
/// Implement with [`kind!`](crate::kind) rather than by hand.
pub trait Kind {
    const KIND: &'static str;
}

/// Anything with an id and metadata.
pub trait Entity {
    fn id(&self) -> &EntityId;

    fn metadata(&self) -> &Metadata;
}

/// Implements [`Kind`] for one or more types, deriving the name from the type name.
#[macro_export]
macro_rules! kind {
    ($($ty:ident),+ $(,)?) => {
        $(
            $crate::__private::paste::paste! {
                impl $crate::Kind for $ty {
                    const KIND: &'static str = stringify!([<$ty:snake>]);
                }
            }
        )+
    };
}

/// Declares a payload entity: a serde struct with an `id` and `metadata`, equality by id,
/// and a `new` constructor that generates the id. Input without an `id`, nested ones
/// included, deserializes with a freshly generated one.
///
/// The declaring crate must depend on `serde` with the `derive` feature.
///
/// ```rust
/// use actor_scene::{entity, Entity, Kind};
///
/// entity! {
///     pub struct SoccerBall {
///         pub passes: u32,
///     }
/// }
///
/// let ball = SoccerBall::new(0);
/// assert!(ball.id().as_str().starts_with("soccer_ball_"));
/// ```
#[macro_export]
macro_rules! entity {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$fmeta:meta])* $fvis:vis $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, ::serde::Serialize)]
        $vis struct $name {
            pub id: $crate::EntityId,
            #[serde(default)]
            pub metadata: $crate::Metadata,
            $( $(#[$fmeta])* $fvis $field : $ty ),*
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::std::result::Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                // Same shape, but a missing id is generated rather than rejected.
                #[derive(::serde::Deserialize)]
                struct Fields {
                    #[serde(default)]
                    id: ::std::option::Option<$crate::EntityId>,
                    #[serde(default)]
                    metadata: $crate::Metadata,
                    $( $(#[$fmeta])* $field : $ty ),*
                }

                let fields = <Fields as ::serde::Deserialize>::deserialize(deserializer)?;
                Ok(Self {
                    id: fields
                        .id
                        .unwrap_or_else(|| $crate::EntityId::generate(<Self as $crate::Kind>::KIND)),
                    metadata: fields.metadata,
                    $( $field: fields.$field ),*
                })
            }
        }

        $crate::kind!($name);

        impl $crate::Entity for $name {
            fn id(&self) -> &$crate::EntityId {
                &self.id
            }

            fn metadata(&self) -> &$crate::Metadata {
                &self.metadata
            }
        }

        impl $name {
            #[allow(clippy::too_many_arguments)]
            $vis fn new($($field: $ty),*) -> Self {
                Self {
                    id: $crate::EntityId::generate(<Self as $crate::Kind>::KIND),
                    metadata: ::std::default::Default::default(),
                    $($field),*
                }
            }
        }

        impl ::std::cmp::PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl ::std::cmp::Eq for $name {}

        impl ::std::hash::Hash for $name {
            fn hash<H: ::std::hash::Hasher>(&self, state: &mut H) {
                self.id.hash(state)
            }
        }
    };
}

/// Constructs the calling type from another value's fields plus overrides.
pub trait Lift: Sized {
    fn lift<S: Serialize + ?Sized>(source: &S, overrides: Value) -> Result<Self>;
}

impl<T> Lift for T
where
    T: Kind + DeserializeOwned,
{
    fn lift<S: Serialize + ?Sized>(source: &S, overrides: Value) -> Result<Self> {
        let mut fields = to_fields::<T, S>(source)?;
        fields.remove("id");
        let mut merged = Value::Object(fields);
        deep_merge(&mut merged, overrides);
        match merged {
            Value::Object(fields) => from_fields(fields),
            other => Err(Error::validation(T::KIND, format!("expected an object, got {}", other))),
        }
    }
}

/// Builds `T` from a field map, generating an id when the map has none.
pub fn from_fields<T>(mut fields: Map<String, Value>) -> Result<T>
where
    T: Kind + DeserializeOwned,
{
    if !fields.contains_key("id") {
        fields.insert("id".into(), Value::String(EntityId::generate(T::KIND).0));
    }
    serde_json::from_value(Value::Object(fields)).map_err(|e| Error::validation(T::KIND, e))
}

fn to_fields<T: Kind, S: Serialize + ?Sized>(source: &S) -> Result<Map<String, Value>> {
    match serde_json::to_value(source).map_err(|e| Error::validation(T::KIND, e))? {
        Value::Object(fields) => Ok(fields),
        Value::Null => Ok(Map::new()),
        other => Err(Error::validation(T::KIND, format!("cannot lift from {}", other))),
    }
}

/// Merges `overrides` into `base`. Objects merge key-wise and recursively; anything else
/// in `overrides` replaces what is in `base`. A `null` override at the top level is a no-op.
pub fn deep_merge(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(slot) if slot.is_object() && value.is_object() => deep_merge(slot, value),
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overrides) => *base = overrides,
    }
}

/// Removes `null` object fields, recursively.
pub fn prune_nulls(value: &mut Value) {
    match value {
        Value::Object(fields) => {
            fields.retain(|_, v| !v.is_null());
            fields.values_mut().for_each(prune_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(prune_nulls),
        _ => {}
    }
}

/// Canonical textual form: JSON with `null` fields omitted.
pub fn to_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut value = serde_json::to_value(value).map_err(|e| Error::validation("entity", e))?;
    prune_nulls(&mut value);
    Ok(value.to_string())
}

/// Parses the canonical form back into `T`.
pub fn from_json<T>(text: &str) -> Result<T>
where
    T: Kind + DeserializeOwned,
{
    serde_json::from_str(text).map_err(|e| Error::validation(T::KIND, e))
}
