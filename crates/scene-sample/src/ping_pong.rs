//! Two actors bouncing a message back and forth forever.
//!
//! The roles are independent [`HandlerSet`]s, so [`PingPonger`] plays both by including
//! both sets rather than by inheriting from [`Pinger`] and [`Ponger`].

use actor_scene::{kind, message, Actor, ActorCore, Delivery, HandlerSet, HandlerTable};
use once_cell::sync::Lazy;
use std::any::Any;
use std::sync::Arc;

message! {
    pub struct Ping {}
}

message! {
    pub struct Pong {}
}

/// Answers every ping with a pong.
pub fn pinging<A: Actor>() -> HandlerSet<A> {
    HandlerSet::new().on(|_: &A, ping: Delivery<'_, Ping>| ping.reply::<Pong>())
}

/// Answers every pong with a ping.
pub fn ponging<A: Actor>() -> HandlerSet<A> {
    HandlerSet::new().on(|_: &A, pong: Delivery<'_, Pong>| pong.reply::<Ping>())
}

macro_rules! player {
    ($name:ident, $table:ident, $handlers:expr) => {
        pub struct $name {
            core: ActorCore,
        }

        kind!($name);

        static $table: Lazy<Arc<HandlerTable>> = Lazy::new(|| $handlers);

        impl $name {
            pub fn new() -> Arc<Self> {
                Arc::new(Self {
                    core: ActorCore::new::<Self>($table.clone()),
                })
            }
        }

        impl Actor for $name {
            fn core(&self) -> &ActorCore {
                &self.core
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

player!(Pinger, PINGER, HandlerSet::<Pinger>::new().include(pinging()).build());
player!(Ponger, PONGER, HandlerSet::<Ponger>::new().include(ponging()).build());
player!(
    PingPonger,
    PING_PONGER,
    HandlerSet::<PingPonger>::new()
        .include(pinging())
        .include(ponging())
        .build()
);
