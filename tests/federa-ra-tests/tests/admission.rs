mod common;

use common::{Setup, fault_of, generation, message, with_attempt, with_generation};
use federa_jobs::JobOutcome;
use federa_p2p::{DropReason, Event};
use federa_proto::{Actor, FaultCode, Message, RingName};
use federa_ra::{
    EntityId, GenerationPolicy, MessageKinds, MessageMetadata, NodeLifecycle, RaConfig,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Touch {
    entity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Status {
    generation: Option<u64>,
    attempt:    u32,
    from:       Option<u128>,
}

#[derive(Debug, Default)]
struct Replica {
    touched: u32,
}

fn touch(action: &str, entity: &str) -> Message {
    message(
        action,
        &Touch {
            entity: entity.to_owned(),
        },
    )
}

fn key(t: &Touch) -> EntityId {
    EntityId::from(t.entity.as_str())
}

fn applied(replica: &mut Replica, _: Touch, ctx: federa_ra::MessageContext) -> JobOutcome {
    replica.touched += 1;
    ctx.reply(Message::new(Actor::RA, "Touched", &replica.touched).unwrap());
    JobOutcome::Done
}

fn kinds() -> MessageKinds<Replica> {
    MessageKinds::new()
        .entity(MessageMetadata::new("Create").create_entity(), key, applied)
        .entity(MessageMetadata::new("Touch"), key, applied)
        .entity(MessageMetadata::new("Legacy").deprecated(), key, applied)
        .entity(
            MessageMetadata::new("Drain").create_entity().process_during_close(),
            key,
            applied,
        )
        .entity(
            MessageMetadata::new("Force").create_entity().skip_generation_check(),
            key,
            applied,
        )
        .node(MessageMetadata::new("Status"), |_: (), ctx| {
            let status = Status {
                generation: ctx.generation().map(|g| g.number),
                attempt:    ctx.attempt(),
                from:       ctx.from_instance().map(|i| i.id.0),
            };
            ctx.reply(Message::new(Actor::RA, "StatusReply", &status).unwrap());
            JobOutcome::Done
        })
}

fn setup() -> Setup<Replica> {
    Setup::new(RaConfig::default(), kinds(), |_| Replica::default())
}

#[tokio::test]
async fn requests_are_answered_by_their_processor() {
    let s = setup().opened();
    assert_eq!(s.handler.lifecycle(), NodeLifecycle::Open);

    let reply = s.request(touch("Create", "r1")).await.unwrap();
    assert_eq!(reply.action(), "Touched");
    assert_eq!(reply.body::<u32>().unwrap(), 1);
    let reply = s.request(touch("Touch", "r1")).await.unwrap();
    assert_eq!(reply.body::<u32>().unwrap(), 2);

    let status = with_attempt(with_generation(message("Status", &()), 4), 2);
    let reply = s.request(status).await.unwrap();
    assert_eq!(
        reply.body::<Status>().unwrap(),
        Status {
            generation: Some(4),
            attempt:    2,
            from:       Some(1),
        }
    );
    let scheduled = s
        .agent
        .events
        .count(|e| matches!(e, Event::JobScheduled { .. }));
    assert_eq!(scheduled, 3);
}

#[tokio::test]
async fn a_stale_generation_is_rejected_before_the_entity_is_touched() {
    let s = setup().opened();
    s.handler
        .generations()
        .set(RingName::default(), generation(5));

    let result = s.request(with_generation(touch("Create", "r1"), 3)).await;
    assert_eq!(fault_of(result), Some(FaultCode::StaleGeneration));
    s.handler.drained().await;

    assert_eq!(s.agent.events.drops(), vec![DropReason::StaleGeneration]);
    assert_eq!(s.handler.entities().lookups(), 0);
    assert!(s.handler.entities().is_empty());
    assert_eq!(s.handler.generations().get(&RingName::default()), Some(generation(5)));
}

#[tokio::test]
async fn a_newer_generation_is_adopted() {
    let s = setup().opened();
    s.handler
        .generations()
        .set(RingName::default(), generation(5));

    let reply = s.request(with_generation(touch("Create", "r1"), 7)).await;
    assert!(reply.is_ok());
    assert_eq!(s.handler.generations().get(&RingName::default()), Some(generation(7)));

    let result = s.request(with_generation(touch("Touch", "r1"), 5)).await;
    assert_eq!(fault_of(result), Some(FaultCode::StaleGeneration));
}

#[tokio::test]
async fn generation_checks_can_be_skipped() {
    let config = RaConfig {
        generation_policy: GenerationPolicy::Disabled,
        ..Default::default()
    };
    let s = Setup::new(config, kinds(), |_| Replica::default()).opened();
    s.handler
        .generations()
        .set(RingName::default(), generation(5));
    assert!(s.request(with_generation(touch("Create", "r1"), 3)).await.is_ok());

    let s = setup().opened();
    s.handler
        .generations()
        .set(RingName::default(), generation(5));
    assert!(s.request(with_generation(touch("Force", "r1"), 3)).await.is_ok());
    assert!(s.request(touch("Create", "r2")).await.is_ok());
}

#[tokio::test]
async fn unknown_entities_are_only_created_when_allowed() {
    let s = setup().opened();

    let result = s.request(touch("Touch", "ghost")).await;
    assert_eq!(fault_of(result), Some(FaultCode::EntityNotFound));
    assert!(!s.handler.entities().contains(&"ghost".into()));

    assert!(s.request(touch("Create", "ghost")).await.is_ok());
    assert!(s.request(touch("Touch", "ghost")).await.is_ok());
    let created = s
        .agent
        .events
        .count(|e| matches!(e, Event::EntityCreated { .. }));
    assert_eq!(created, 1);
}

#[tokio::test]
async fn unknown_and_deprecated_actions_are_rejected() {
    let s = setup().opened();

    let result = s.request(touch("Rebuild", "r1")).await;
    assert_eq!(fault_of(result), Some(FaultCode::InvalidMessage));
    let result = s.request(touch("Legacy", "r1")).await;
    assert_eq!(fault_of(result), Some(FaultCode::Deprecated));
    let result = s.request(message("Create", &17u32)).await;
    assert_eq!(fault_of(result), Some(FaultCode::InvalidMessage));

    // One-way messages get no answer, only the events.
    assert!(s.send(touch("Rebuild", "r1")));
    s.handler.drained().await;

    assert_eq!(
        s.agent.events.drops(),
        vec![
            DropReason::UnknownAction,
            DropReason::Deprecated,
            DropReason::InvalidBody,
            DropReason::UnknownAction,
        ]
    );
    assert!(s.handler.entities().is_empty());
    assert_eq!(s.handler.kinds().len(), 6);
}

#[tokio::test]
async fn closing_admits_only_messages_allowed_during_close() {
    let s = setup().opened();
    s.handler.begin_close();
    assert_eq!(s.handler.lifecycle(), NodeLifecycle::Closing);

    let result = s.request(touch("Create", "r1")).await;
    assert_eq!(fault_of(result), Some(FaultCode::NotReady));
    assert!(s.request(touch("Drain", "r1")).await.is_ok());

    s.handler.close(&s.agent.manager);
    assert_eq!(s.handler.lifecycle(), NodeLifecycle::Closed);
    let result = s.request(touch("Drain", "r1")).await;
    assert_eq!(fault_of(result), Some(FaultCode::MessageHandlerDoesNotExist));

    // Closing twice is harmless.
    s.handler.close(&s.agent.manager);
}

#[tokio::test(start_paused = true)]
async fn requests_admitted_before_close_are_answered() {
    let s = setup().opened();

    let pending = s.begin_request(touch("Create", "r1"));
    s.handler.close(&s.agent.manager);

    let result = s.end_request(pending).await;
    assert_eq!(fault_of(result), Some(FaultCode::ObjectClosed));
    assert_eq!(s.agent.events.drops(), vec![DropReason::Closed]);
    assert!(s.handler.entities().is_empty());
}

#[tokio::test]
async fn an_unopened_agent_receives_nothing() {
    let s = setup();
    assert_eq!(s.handler.lifecycle(), NodeLifecycle::Opening);

    let result = s.request(touch("Create", "r1")).await;
    assert_eq!(fault_of(result), Some(FaultCode::MessageHandlerDoesNotExist));

    let s = s.opened();
    assert!(s.request(touch("Create", "r1")).await.is_ok());
}

#[tokio::test]
async fn a_full_message_queue_rejects_the_overflow() {
    let config = RaConfig {
        message_queue_depth: 1,
        ..Default::default()
    };
    let s = Setup::new(config, kinds(), |_| Replica::default()).opened();

    for _ in 0..3 {
        assert!(s.send(touch("Create", "r1")));
    }
    s.handler.drained().await;

    assert_eq!(s.agent.events.drops(), vec![DropReason::QueueFull; 2]);
    let touched = s.handler.entities().with(&"r1".into(), |r| r.touched);
    assert_eq!(touched, Some(1));
}
