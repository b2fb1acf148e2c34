use actor_scene::{lineage, Actor, ActorRef, MemberKey, Message, MessageRegistry, Result, SceneContext};
use scene_sample::office::{Company, Department, Direction, Employee, Okr};
use scene_sample::ping_pong::{Ping, PingPonger, Pinger, Pong, Ponger};
use scene_sample::soccer::{BallPass, SoccerBall, SoccerGame, SoccerPlayer};
use serde_json::json;
use std::sync::Arc;

/// Two actors rally indefinitely; the caller decides when to stop.
#[test]
fn test_ping_pong_alternates() {
    let ctx = SceneContext::new();
    let (pinger, ponger) = (Pinger::new(), Ponger::new());
    let serve = Arc::new(Message::new(ponger.clone(), pinger.clone(), Ping {}));

    let rally: Vec<_> = lineage::propagate(&serve, &ctx)
        .take(4)
        .collect::<Result<_>>()
        .expect("Rally failed");

    assert_eq!(rally.len(), 4);
    for (i, message) in rally.iter().enumerate() {
        if i % 2 == 0 {
            assert!(message.is::<Pong>());
            assert_eq!(message.sender_id(), pinger.id());
            assert_eq!(message.receiver_id(), Some(ponger.id()));
        } else {
            assert!(message.is::<Ping>());
            assert_eq!(message.sender_id(), ponger.id());
            assert_eq!(message.receiver_id(), Some(pinger.id()));
        }
    }
    assert_eq!(rally[3].parent_id(), Some(rally[2].id()));
}

/// A long rally can be kept and then dropped in one go.
#[test]
fn test_long_rally_drops_cleanly() {
    let ctx = SceneContext::new();
    let (pinger, ponger) = (Pinger::new(), Ponger::new());
    let serve = Arc::new(Message::new(ponger.clone(), pinger.clone(), Ping {}));

    let last = lineage::propagate(&serve, &ctx)
        .take(20_000)
        .last()
        .expect("Empty rally")
        .expect("Rally failed");
    assert_eq!(lineage::ancestors(&last).count(), 20_000);
    drop(last);
}

/// One actor with both roles composed plays against itself in kind.
#[test]
fn test_composed_roles() {
    let ctx = SceneContext::new();
    let (a, b) = (PingPonger::new(), PingPonger::new());
    assert_eq!(a.handlers().len(), 2);

    let serve = Arc::new(Message::new(a.clone(), b.clone(), Ping {}));
    let rally: Vec<_> = lineage::propagate(&serve, &ctx)
        .take(4)
        .collect::<Result<_>>()
        .expect("Rally failed");

    let kinds: Vec<_> = rally.iter().map(|message| message.kind().name()).collect();
    assert_eq!(kinds, vec!["pong", "ping", "pong", "ping"]);
    assert_eq!(lineage::chain_list(&rally[3], 10).len(), 5);
}

/// 22 players, 42 passes: the ball's counter matches every pull and the players' tally.
#[test]
fn test_soccer_game() {
    const TOTAL_PASSES: u32 = 42;
    let ctx = SceneContext::new();
    let game = SoccerGame::new((0..22).map(|n| SoccerPlayer::new(format!("Player {}", n))).collect());
    let _pitch = ctx.enter(game.scene());

    let mut ball = None;
    for (index, message) in (1..=TOTAL_PASSES).zip(game.play(&ctx).expect("No kickoff")) {
        let message = message.expect("Pass failed");
        let pass = message.payload::<BallPass>().expect("Not a pass");
        assert_eq!(pass.ball.passes, index);
        assert_ne!(message.sender_id(), message.receiver_id().unwrap());
        let id = ball.get_or_insert_with(|| pass.ball.id.clone());
        assert_eq!(&pass.ball.id, id);
    }

    assert_eq!(game.total_passes(), TOTAL_PASSES);
    game.reset();
    assert_eq!(game.total_passes(), 0);
}

#[test]
fn test_ball_pass_survives_the_codec() {
    let (a, b) = (SoccerPlayer::new("A"), SoccerPlayer::new("B"));
    let kickoff = Arc::new(Message::new(a.clone(), b.clone(), BallPass { ball: SoccerBall::new(0) }));
    let pass = Arc::new(
        kickoff
            .forward_to::<BallPass>(a.clone(), json!({"ball": {"passes": 1}}))
            .expect("Forward failed"),
    );

    let registry = MessageRegistry::new().register::<BallPass>();
    let back = Message::from_json(&pass.to_json().expect("Encode failed"), &registry).expect("Decode failed");

    let ball = &back.payload::<BallPass>().expect("Not a pass").ball;
    assert_eq!(ball.id, kickoff.payload::<BallPass>().expect("Not a pass").ball.id);
    assert_eq!(ball.passes, 1);
    let parent = back.parent().expect("No parent");
    assert_eq!(parent.id(), kickoff.id());
    assert_eq!(parent.payload::<BallPass>().expect("Not a pass").ball.passes, 0);
}

#[test]
fn test_ball_without_id_gets_one() {
    let (a, b) = (SoccerPlayer::new("A"), SoccerPlayer::new("B"));
    let pass = Message::from_fields::<BallPass>(a, Some(b as ActorRef), json!({"ball": {"passes": 0}}))
        .expect("Hydration failed");

    let ball = &pass.payload::<BallPass>().expect("Not a pass").ball;
    assert!(ball.id.as_str().starts_with("soccer_ball_"));
    assert_eq!(ball.passes, 0);
}

#[test]
fn test_soccer_needs_an_active_scene() {
    let ctx = SceneContext::new();
    let game = SoccerGame::new((0..2).map(|n| SoccerPlayer::new(format!("Player {}", n))).collect());

    let first = game.play(&ctx).expect("No kickoff").next().expect("Nothing yielded");
    assert!(first.is_err());
    assert_eq!(game.total_passes(), 0);
}

const STAFF: [&str; 18] = [
    "Michael Scott",
    "Dwight Schrute",
    "Jim Halpert",
    "Pam Beesly",
    "Ryan Howard",
    "Andy Bernard",
    "Robert California",
    "Stanley Hudson",
    "Kevin Malone",
    "Meredith Palmer",
    "Angela Martin",
    "Oscar Martinez",
    "Phyllis Vance",
    "Roy Anderson",
    "Jan Levinson",
    "Kelly Kapoor",
    "Toby Flenderson",
    "Creed Bratton",
];

#[test]
fn test_office_nested_scenes() {
    let staff: Vec<_> = STAFF.into_iter().map(Employee::new).collect();
    let dunder_mifflin = Company::staff(&staff);
    for employee in &staff {
        assert!(dunder_mifflin.contains(MemberKey::Actor(&**employee)));
    }

    let sales = Department::of(
        &staff,
        &["Jim Halpert", "Dwight Schrute", "Stanley Hudson", "Phyllis Vance"],
    );
    let accounting = Department::of(&staff, &["Angela Martin", "Oscar Martinez", "Kevin Malone"]);
    let warehouse = Department::of(&staff, &["Darryl Philbin", "Roy Anderson"]);
    assert_eq!(sales.members().len(), 4);
    assert_eq!(warehouse.members().len(), 1);
    assert!(sales.id().as_str().starts_with("department_"));

    let ctx = SceneContext::new();
    let _company = ctx.enter(&dunder_mifflin);
    for employee in &staff {
        assert_eq!(employee.scene(&ctx).unwrap().id(), dunder_mifflin.id());
    }
    for department in [&sales, &accounting, &warehouse] {
        let _department = ctx.enter(department);
        for member in department.members() {
            assert_eq!(member.scene(&ctx).unwrap().id(), department.id());
        }
    }
    assert_eq!(ctx.depth(), 1);
}

#[test]
fn test_okr_cascades_to_active_scene() {
    let staff: Vec<_> = STAFF.into_iter().map(Employee::new).collect();
    let company = Company::staff(&staff);
    let sales = Department::of(
        &staff,
        &["Jim Halpert", "Dwight Schrute", "Stanley Hudson", "Phyllis Vance"],
    );
    let jim: ActorRef = staff[2].clone();
    let okr = || {
        Arc::new(Message::new(
            company.clone(),
            jim.clone(),
            Okr {
                objective: "Beat last quarter".into(),
                key_results: vec!["Ten new accounts".into()],
            },
        ))
    };

    let ctx = SceneContext::new();
    let _company = ctx.enter(&company);
    {
        let _sales = ctx.enter(&sales);
        let directions: Vec<_> = lineage::propagate(&okr(), &ctx).collect::<Result<_>>().unwrap();
        assert_eq!(directions.len(), 3);
        assert!(directions.iter().all(|message| message.is::<Direction>()));
        assert!(directions.iter().all(|message| message.sender_id() == jim.id()));
    }
    let dwight = &staff[1];
    let pam = &staff[3];
    assert_eq!(dwight.directions(), 1);
    assert_eq!(pam.directions(), 0);

    let directions: Vec<_> = lineage::propagate(&okr(), &ctx).collect::<Result<_>>().unwrap();
    assert_eq!(directions.len(), STAFF.len() - 1);
    assert_eq!(dwight.directions(), 2);
    assert_eq!(pam.directions(), 1);
}
