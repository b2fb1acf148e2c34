//! A ball passed around a fully connected team.
//!
//! Each pass is forwarded to a random teammate picked from the passer's receivers in the
//! current scene. The ball travels inside the message, so its counter is carried forward
//! by overriding `ball.passes` on every forward; the ball keeps its id throughout.

use actor_scene::{
    entity, kind, lineage, message, Actor, ActorCore, ActorRef, Delivery, Error, HandlerSet,
    HandlerTable, Message, MessageKind, Result, Scene, SceneContext,
};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use serde_json::json;
use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

entity! {
    pub struct SoccerBall {
        #[serde(default)]
        pub passes: u32,
    }
}

message! {
    pub struct BallPass {
        pub ball: SoccerBall,
    }
}

pub struct SoccerPlayer {
    core: ActorCore,
    name: String,
    passes: AtomicU32,
}

kind!(SoccerPlayer);

static PLAYER: Lazy<Arc<HandlerTable>> = Lazy::new(|| {
    HandlerSet::<SoccerPlayer>::new()
        .on(SoccerPlayer::receive_ball_pass)
        .build()
});

impl SoccerPlayer {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            core: ActorCore::new::<Self>(PLAYER.clone()),
            name: name.into(),
            passes: AtomicU32::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Passes this player has made.
    pub fn passes(&self) -> u32 {
        self.passes.load(Ordering::Relaxed)
    }

    fn receive_ball_pass(&self, pass: Delivery<'_, BallPass>) -> Result<Message> {
        let teammates = self.receivers(pass.scope, &[MessageKind::of::<BallPass>()])?;
        let receiver = teammates
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| Error::handler(format!("{} has nobody to pass to", self.name)))?;

        self.passes.fetch_add(1, Ordering::Relaxed);
        let passes = pass.ball.passes + 1;
        debug!(player = %self.name, to = %receiver.id(), passes, "Pass");
        pass.forward_with::<BallPass>(receiver, json!({ "ball": { "passes": passes } }))
    }
}

impl Actor for SoccerPlayer {
    fn core(&self) -> &ActorCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A scene where every player is connected to every other.
pub struct SoccerGame {
    scene: Arc<Scene>,
    players: Vec<Arc<SoccerPlayer>>,
}

kind!(SoccerGame);

impl SoccerGame {
    pub fn new(players: Vec<Arc<SoccerPlayer>>) -> Self {
        let scene = Scene::builder()
            .kind::<SoccerGame>()
            .members(players.iter().map(|player| player.clone() as ActorRef))
            .build();
        scene.connect_all();
        Self { scene, players }
    }

    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    pub fn players(&self) -> &[Arc<SoccerPlayer>] {
        &self.players
    }

    pub fn reset(&self) {
        for player in &self.players {
            player.passes.store(0, Ordering::Relaxed);
        }
    }

    pub fn total_passes(&self) -> u32 {
        self.players.iter().map(|player| player.passes()).sum()
    }

    /// The opening pass: a fresh ball from the game to a random player.
    pub fn kickoff(&self) -> Result<Arc<Message>> {
        let first = self
            .players
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| Error::handler("a game needs players"))?;
        Ok(Arc::new(Message::new(
            self.scene.clone(),
            first.clone(),
            BallPass {
                ball: SoccerBall::new(0),
            },
        )))
    }

    /// Every pass of the game, lazily. The game never ends on its own; take what you need.
    ///
    /// Passes are only resolved against `ctx`, so the game's scene must be active in it.
    pub fn play<'a>(&self, ctx: &'a SceneContext) -> Result<impl Iterator<Item = Result<Arc<Message>>> + 'a> {
        let kickoff = self.kickoff()?;
        Ok(lineage::propagate(&kickoff, ctx))
    }
}
