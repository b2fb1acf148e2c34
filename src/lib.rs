#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Actor Scene
//!
//! > **Actors, typed messages, and the scenes they meet in.**
//!
//! This crate is a small substrate for autonomous actors that exchange typed messages
//! inside scoped relationship graphs. Every message remembers the message it answers,
//! so a conversation is a causal chain you can walk, search, and keep expanding.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Pull, don't push
//!
//! Nothing runs until somebody asks. [`Actor::send`] and [`lineage::propagate`] return
//! iterators; a handler is invoked only when the caller pulls the item that needs it.
//! That makes unbounded conversations (two actors playing ping-pong forever, a ball
//! passed around a field) safe to start: the caller decides when to stop with
//! `.take(n)`.
//!
//! ### Tables, not reflection
//!
//! Handlers are looked up by the concrete type of the payload in a [`HandlerTable`]
//! built once per actor type. Behaviour is shared by composing [`HandlerSet`]s, not by
//! inheritance.
//!
//! ### Scopes are values
//!
//! The "current scene" lives in a [`SceneContext`] the caller owns and passes along.
//! Entering a scene returns a [`SceneGuard`]; dropping it restores the previous scene.
//! Two threads or tasks with two contexts never see each other's scenes.
//!
//! ## 🗺️ Module Tour
//!
//! - [`entity`]: ids, metadata, [`kind!`] naming, [`Lift`], canonical JSON
//! - [`message`]: the [`Message`] envelope, reply/forward, the JSON codec
//! - [`handler`]: dispatch tables and reply normalisation
//! - [`actor`]: the [`Actor`] trait and lazy [`Dispatch`]
//! - [`events`]: before/after receive notifications
//! - [`scene`]: relationship graphs and scoped activation
//! - [`lineage`]: chains, closest ancestor, trees, propagation
//! - [`config`]: limits, with environment overrides
//! - [`tracing`]: subscriber setup for binaries
//!
//! ## 🚀 Quick Start
//!
//! ```rust
//! use actor_scene::{
//!     kind, lineage, message, Actor, ActorCore, ActorRef, Delivery, HandlerSet, Message,
//!     Result, Scene, SceneContext,
//! };
//! use std::any::Any;
//! use std::sync::Arc;
//!
//! message! { pub struct Ping {} }
//! message! { pub struct Pong {} }
//!
//! struct Player {
//!     core: ActorCore,
//! }
//! kind!(Player);
//!
//! impl Actor for Player {
//!     fn core(&self) -> &ActorCore { &self.core }
//!     fn as_any(&self) -> &dyn Any { self }
//! }
//!
//! fn player() -> ActorRef {
//!     let handlers = HandlerSet::<Player>::new()
//!         .on(|_, ping: Delivery<'_, Ping>| ping.reply::<Pong>())
//!         .on(|_, pong: Delivery<'_, Pong>| pong.reply::<Ping>())
//!         .build();
//!     Arc::new(Player { core: ActorCore::new::<Player>(handlers) })
//! }
//!
//! # fn main() -> Result<()> {
//! let (a, b) = (player(), player());
//! let scene = Scene::new([a.clone(), b.clone()]);
//! let ctx = SceneContext::new();
//! let _active = ctx.enter(&scene);
//!
//! let serve = Arc::new(Message::new(a, b, Ping {}));
//! let rally: Vec<_> = lineage::propagate(&serve, &ctx).take(4).collect::<Result<_>>()?;
//! assert!(rally[0].is::<Pong>() && rally[1].is::<Ping>());
//! # Ok(())
//! # }
//! ```
//!
//! ### Running the Demo
//!
//! ```bash
//! RUST_LOG=info cargo run -p scene-sample
//! ```

pub mod actor;
pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod handler;
pub mod lineage;
pub mod message;
pub mod scene;
pub mod tracing;

pub use actor::{Actor, ActorCore, ActorDirectory, ActorRef, BareActor, Dispatch};
pub use config::Limits;
pub use entity::{deep_merge, from_json, to_canonical_json, Entity, EntityId, Kind, Lift, Metadata};
pub use error::{BoxError, Error, Result};
pub use events::{ActorEvent, EventEmitter, ListenerId};
pub use handler::{Delivery, HandlerSet, HandlerTable, Replies};
pub use lineage::{ancestors, chain, chain_list, closest, closest_of, propagate, propagate_with, send, tree, LineageGraph};
pub use message::{Message, MessageKind, MessageRegistry, MessageType};
pub use scene::{MemberKey, Relationship, Scene, SceneBuilder, SceneContext, SceneGuard};

#[doc(hidden)]
pub mod __private {
    pub use paste;
}
