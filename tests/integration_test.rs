use actor_scene::{
    kind, lineage, message, Actor, ActorCore, ActorEvent, ActorRef, BareActor, Delivery, Error,
    HandlerSet, HandlerTable, Message, MessageKind, MessageRegistry, Result, Scene, SceneContext,
};
use once_cell::sync::Lazy;
use serde_json::json;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

message! {
    pub struct Request {
        pub item: String,
        #[serde(default)]
        pub quantity: u32,
    }
}

message! {
    pub struct Receipt {
        pub item: String,
        pub quantity: u32,
    }
}

message! {
    pub struct Complaint {
        pub item: String,
    }
}

message! {
    pub struct Announcement {
        pub text: String,
    }
}

struct Clerk {
    core: ActorCore,
    served: AtomicUsize,
}

kind!(Clerk);

static CLERK: Lazy<Arc<HandlerTable>> = Lazy::new(|| {
    HandlerSet::<Clerk>::new()
        .on(|clerk: &Clerk, request: Delivery<'_, Request>| {
            clerk.served.fetch_add(1, Ordering::SeqCst);
            request.reply_with::<Receipt>(json!({ "quantity": request.quantity.max(1) }))
        })
        .on(|_: &Clerk, complaint: Delivery<'_, Complaint>| -> Result<()> {
            Err(Error::handler(format!("no refunds for {}", complaint.item)))
        })
        .build()
});

impl Clerk {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            core: ActorCore::new::<Self>(CLERK.clone()),
            served: AtomicUsize::new(0),
        })
    }
}

impl Actor for Clerk {
    fn core(&self) -> &ActorCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// End-to-end: a request is delivered, answered, and the answer round-trips through JSON.
#[test]
fn test_request_receipt_round_trip() {
    let ctx = SceneContext::new();
    let customer: ActorRef = BareActor::new();
    let clerk = Clerk::new();

    let request = Arc::new(Message::new(
        customer.clone(),
        clerk.clone(),
        Request {
            item: "stapler".into(),
            quantity: 0,
        },
    ));
    let replies: Vec<_> = lineage::send(&request, &ctx)
        .collect::<Result<_>>()
        .expect("Failed to deliver request");

    assert_eq!(replies.len(), 1);
    let receipt = &replies[0];
    let payload = receipt.payload::<Receipt>().expect("Reply was not a receipt");
    assert_eq!(payload.item, "stapler");
    assert_eq!(payload.quantity, 1);
    assert_eq!(receipt.sender_id(), clerk.id());
    assert_eq!(receipt.receiver_id(), Some(customer.id()));
    assert_eq!(clerk.served.load(Ordering::SeqCst), 1);

    // Decode with a directory so actor references come back live
    let scene = Scene::new([customer.clone(), clerk.clone() as ActorRef]);
    let registry = MessageRegistry::new()
        .register::<Request>()
        .register::<Receipt>()
        .with_directory(scene);
    let decoded = Message::from_json(&receipt.to_json().unwrap(), &registry).expect("Failed to decode");

    assert_eq!(decoded.id(), receipt.id());
    assert_eq!(decoded.parent_id(), Some(request.id()));
    assert_eq!(decoded.payload::<Receipt>().unwrap().quantity, 1);
    assert!(decoded.sender().as_any().downcast_ref::<Clerk>().is_some());
    assert!(decoded.parent().unwrap().is::<Request>());
}

#[test]
fn test_hydration_from_fields() {
    let customer: ActorRef = BareActor::new();
    let clerk: ActorRef = Clerk::new();

    let message = Message::from_fields::<Request>(
        customer.clone(),
        Some(clerk.clone()),
        json!({ "item": "paper", "metadata": { "urgent": true } }),
    )
    .expect("Failed to hydrate");

    assert!(message.id().as_str().starts_with("request_"));
    assert_eq!(message.payload::<Request>().unwrap().quantity, 0);
    assert_eq!(message.metadata()["urgent"], json!(true));
    assert_eq!(message.sender_id(), customer.id());
    assert_eq!(message.receiver_id(), Some(clerk.id()));
    assert!(message.parent().is_none());
}

#[test]
fn test_handler_error_surfaces_and_skips_after_receive() {
    let ctx = SceneContext::new();
    let clerk = Clerk::new();
    let before = Arc::new(AtomicUsize::new(0));
    let after = Arc::new(AtomicUsize::new(0));
    let (b, a) = (before.clone(), after.clone());
    clerk.events().on(ActorEvent::BeforeReceive, move |_| {
        b.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    clerk.events().on(ActorEvent::AfterReceive, move |_| {
        a.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let complaint = Arc::new(Message::new(
        BareActor::new(),
        clerk.clone(),
        Complaint { item: "stapler".into() },
    ));
    let err = lineage::send(&complaint, &ctx)
        .next()
        .expect("Dispatch yielded nothing")
        .unwrap_err();

    assert!(matches!(err, Error::Handler(_)));
    assert!(err.to_string().contains("no refunds for stapler"));
    assert_eq!(before.load(Ordering::SeqCst), 1);
    assert_eq!(after.load(Ordering::SeqCst), 0);
}

#[test]
fn test_failing_listener_does_not_change_dispatch() {
    let ctx = SceneContext::new();
    let clerk = Clerk::new();
    clerk
        .events()
        .on(ActorEvent::BeforeReceive, |_| Err("listener down".into()));
    clerk
        .events()
        .on(ActorEvent::AfterReceive, |_| panic!("listener panicked"));

    let request = Arc::new(Message::new(
        BareActor::new(),
        clerk.clone(),
        Request {
            item: "tape".into(),
            quantity: 2,
        },
    ));
    let replies: Vec<_> = clerk.send(&request, &ctx).collect::<Result<_>>().unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].payload::<Receipt>().unwrap().quantity, 2);
}

#[test]
fn test_unhandled_and_missing_receiver() {
    let ctx = SceneContext::new();
    let clerk = Clerk::new();
    let customer: ActorRef = BareActor::new();

    let note = Arc::new(Message::new(
        clerk.clone(),
        customer.clone(),
        Announcement { text: "closing".into() },
    ));
    match lineage::send(&note, &ctx).next() {
        Some(Err(Error::UnhandledMessage { actor, message, kind })) => {
            assert_eq!(&actor, customer.id());
            assert_eq!(&message, note.id());
            assert_eq!(kind, "announcement");
        }
        other => panic!("unexpected: {other:?}"),
    }

    let shout = Arc::new(Message::unaddressed(clerk, Announcement { text: "hello?".into() }));
    assert!(matches!(
        lineage::send(&shout, &ctx).next(),
        Some(Err(Error::MissingReceiver(id))) if &id == shout.id()
    ));
}

#[test]
fn test_can_receive_by_instance_and_kind() {
    let clerk = Clerk::new();
    let other = Clerk::new();
    let request = Message::new(
        BareActor::new(),
        clerk.clone(),
        Request {
            item: "pen".into(),
            quantity: 1,
        },
    );

    assert!(clerk.can_receive(&request));
    assert!(!other.can_receive(&request));
    assert!(other.can_receive_kind(MessageKind::of::<Request>()));
    assert!(!other.can_receive_kind(MessageKind::of::<Receipt>()));
}

/// A scene is an actor too: it can answer one message with several.
#[test]
fn test_scene_broadcasts_to_members() {
    let members: Vec<ActorRef> = (0..3).map(|_| BareActor::new() as ActorRef).collect();
    let handlers = HandlerSet::<Scene>::new()
        .on(|scene: &Scene, note: Delivery<'_, Announcement>| {
            scene
                .members()
                .into_iter()
                .map(|member| note.forward::<Announcement>(member))
                .collect::<Result<Vec<_>>>()
        })
        .build();
    let office = Scene::with_handlers(handlers, members.clone());

    let ctx = SceneContext::new();
    let note = Arc::new(Message::new(
        BareActor::new(),
        office.clone(),
        Announcement { text: "cake in the kitchen".into() },
    ));
    let forwarded: Vec<_> = lineage::send(&note, &ctx).collect::<Result<_>>().unwrap();

    assert_eq!(forwarded.len(), 3);
    for (message, member) in forwarded.iter().zip(&members) {
        assert_eq!(message.receiver_id(), Some(member.id()));
        assert_eq!(message.sender_id(), office.id());
        assert_eq!(message.payload::<Announcement>().unwrap().text, "cake in the kitchen");
        assert_eq!(message.parent_id(), Some(note.id()));
    }
}

#[test]
fn test_lift_overrides_nested_metadata() {
    let clerk: ActorRef = Clerk::new();
    let request = Arc::new(
        Message::new(
            BareActor::new(),
            clerk,
            Request {
                item: "ink".into(),
                quantity: 3,
            },
        )
        .with_metadata("trace", json!({ "hop": 1, "origin": "front desk" })),
    );

    let receipt = request
        .reply_with::<Receipt>(json!({ "metadata": { "trace": { "hop": 2 } } }))
        .unwrap();
    assert_eq!(receipt.metadata()["trace"], json!({ "hop": 2, "origin": "front desk" }));
    assert_eq!(receipt.payload::<Receipt>().unwrap().quantity, 3);

    let err = request.reply_with::<Receipt>(json!({ "quantity": "many" })).unwrap_err();
    assert!(matches!(err, Error::Validation { ref kind, .. } if kind == "receipt"));

    let err = Message::reply_to::<Receipt>(&request, json!({ "id": "receipt_1" })).unwrap_err();
    assert!(err.to_string().contains("`id`"));
}
