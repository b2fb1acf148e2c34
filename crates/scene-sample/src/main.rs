//! # Scene Demo
//!
//! Plays the three sample scenarios end to end:
//! 1.  A ping-pong rally between a [`Pinger`] and a [`Ponger`].
//! 2.  A 42-pass soccer game between 22 players.
//! 3.  An OKR cascading through a department nested in a company.

use actor_scene::tracing::setup_tracing;
use actor_scene::{lineage, Message, Result, SceneContext};
use scene_sample::office::{Company, Department, Employee, Okr};
use scene_sample::ping_pong::{Ping, Pinger, Ponger};
use scene_sample::soccer::{SoccerGame, SoccerPlayer};
use std::sync::Arc;
use tracing::info;

const RALLY: usize = 4;
const PASSES: usize = 42;

fn main() -> Result<()> {
    // Setup tracing once for the entire application
    setup_tracing();

    let ctx = SceneContext::new();

    let span = tracing::info_span!("ping_pong").entered();
    let (pinger, ponger) = (Pinger::new(), Ponger::new());
    let serve = Arc::new(Message::new(ponger, pinger, Ping {}));
    for message in lineage::propagate(&serve, &ctx).take(RALLY) {
        let message = message?;
        info!(kind = %message.kind(), from = %message.sender_id(), "Rally");
    }
    drop(span);

    let span = tracing::info_span!("soccer").entered();
    let game = SoccerGame::new((1..=22).map(|n| SoccerPlayer::new(format!("Player {}", n))).collect());
    {
        let _pitch = ctx.enter(game.scene());
        for message in game.play(&ctx)?.take(PASSES) {
            message?;
        }
    }
    let busiest = game.players().iter().max_by_key(|player| player.passes());
    if let Some(player) = busiest {
        info!(total = game.total_passes(), busiest = player.name(), passes = player.passes(), "Final whistle");
    }
    drop(span);

    let span = tracing::info_span!("office").entered();
    let staff: Vec<_> = ["Ada", "Grace", "Linus", "Barbara", "Ken", "Dennis"]
        .into_iter()
        .map(Employee::new)
        .collect();
    let company = Company::staff(&staff);
    let research = Department::of(&staff, &["Ada", "Grace", "Barbara"]);
    {
        let _company = ctx.enter(&company);
        let _research = ctx.enter(&research);
        let okr = Arc::new(Message::new(
            company.clone(),
            staff[0].clone(),
            Okr {
                objective: "Ship the analytical engine".into(),
                key_results: vec!["Punch cards read at 60/min".into()],
            },
        ));
        let directions = lineage::propagate(&okr, &ctx).collect::<Result<Vec<_>>>()?;
        info!(directions = directions.len(), "OKR cascaded");
    }
    drop(span);

    info!("Demo completed successfully");
    Ok(())
}
