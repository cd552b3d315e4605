mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{Setup, fault_of, message};
use federa_jobs::{JobOutcome, JobQueueLimits};
use federa_p2p::{DropReason, Event};
use federa_ra::{EntityId, MessageKinds, MessageMetadata, RaConfig};
use federa_proto::{FaultCode, Message};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Update {
    entity: String,
    sender: u32,
    seq:    u32,
}

#[derive(Debug, Default)]
struct Replica {
    applied: Vec<(u32, u32)>,
}

fn updates() -> MessageKinds<Replica> {
    MessageKinds::new().entity(
        MessageMetadata::new("Update").create_entity(),
        |u: &Update| EntityId::from(u.entity.as_str()),
        |replica: &mut Replica, u: Update, _| {
            replica.applied.push((u.sender, u.seq));
            JobOutcome::Done
        },
    )
}

fn update(entity: &str, sender: u32, seq: u32) -> Message {
    message(
        "Update",
        &Update {
            entity: entity.to_owned(),
            sender,
            seq,
        },
    )
}

#[tokio::test]
async fn messages_for_one_entity_apply_in_arrival_order() {
    let setup = Setup::new(RaConfig::default(), updates(), |_| Replica::default()).opened();

    for seq in 0..100 {
        assert!(setup.send(update("r1", 0, seq)));
    }
    setup.handler.drained().await;

    let applied = setup
        .handler
        .entities()
        .with(&"r1".into(), |r| r.applied.clone())
        .unwrap();
    assert_eq!(applied, (0..100).map(|seq| (0, seq)).collect::<Vec<_>>());
    let created = setup
        .agent
        .events
        .count(|e| matches!(e, Event::EntityCreated { .. }));
    assert_eq!(created, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_sender_keeps_its_order_per_entity() {
    let setup = Setup::new(RaConfig::default(), updates(), |_| Replica::default()).opened();
    let setup = Arc::new(setup);

    let senders = (0..4u32)
        .map(|sender| {
            let setup = setup.clone();
            tokio::spawn(async move {
                for seq in 0..100 {
                    assert!(setup.send(update("shared", sender, seq)));
                    assert!(setup.send(update(&format!("own-{sender}"), sender, seq)));
                }
            })
        })
        .collect::<Vec<_>>();
    for sender in senders {
        sender.await.unwrap();
    }
    setup.handler.drained().await;

    let entities = setup.handler.entities();
    assert_eq!(entities.len(), 5);
    let shared = entities
        .with(&"shared".into(), |r| r.applied.clone())
        .unwrap();
    assert_eq!(shared.len(), 400);
    for sender in 0..4u32 {
        let seen = shared
            .iter()
            .filter(|(s, _)| *s == sender)
            .map(|(_, seq)| *seq)
            .collect::<Vec<_>>();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());

        let own = entities
            .with(&format!("own-{sender}").into(), |r| r.applied.len())
            .unwrap();
        assert_eq!(own, 100);
    }
}

#[derive(Default)]
struct Tracker {
    running:     Mutex<Vec<String>>,
    max_running: AtomicUsize,
    finished:    Mutex<Vec<(String, u32)>>,
}

#[tokio::test(start_paused = true)]
async fn asynchronous_processing_holds_the_entity_until_done() {
    let tracker = Arc::new(Tracker::default());
    let kinds = {
        let tracker = tracker.clone();
        MessageKinds::new().entity(
            MessageMetadata::new("Update").create_entity(),
            |u: &Update| EntityId::from(u.entity.as_str()),
            move |_: &mut Replica, u: Update, _| {
                let tracker = tracker.clone();
                {
                    let mut running = tracker.running.lock();
                    assert!(!running.contains(&u.entity), "{} overlapped", u.entity);
                    running.push(u.entity.clone());
                    tracker.max_running.fetch_max(running.len(), Ordering::SeqCst);
                }
                JobOutcome::Pending(
                    async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        tracker.running.lock().retain(|e| *e != u.entity);
                        tracker.finished.lock().push((u.entity, u.seq));
                    }
                    .boxed(),
                )
            },
        )
    };
    let setup = Setup::new(RaConfig::default(), kinds, |_| Replica::default()).opened();

    for seq in 0..5 {
        setup.send(update("a", 0, seq));
        setup.send(update("b", 0, seq));
    }
    setup.handler.drained().await;

    let finished = tracker.finished.lock().clone();
    for entity in ["a", "b"] {
        let seqs = finished
            .iter()
            .filter(|(e, _)| e == entity)
            .map(|(_, seq)| *seq)
            .collect::<Vec<_>>();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }
    assert_eq!(tracker.max_running.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn a_panicking_processor_does_not_stall_the_entity() {
    let kinds = MessageKinds::new().entity(
        MessageMetadata::new("Update").create_entity(),
        |u: &Update| EntityId::from(u.entity.as_str()),
        |replica: &mut Replica, u: Update, _| -> JobOutcome {
            if u.seq == 1 {
                panic!("processor failed");
            }
            replica.applied.push((u.sender, u.seq));
            JobOutcome::Done
        },
    );
    let setup = Setup::new(RaConfig::default(), kinds, |_| Replica::default()).opened();

    for seq in 0..3 {
        setup.send(update("r", 0, seq));
    }
    setup.handler.drained().await;

    let applied = setup
        .handler
        .entities()
        .with(&"r".into(), |r| r.applied.clone())
        .unwrap();
    assert_eq!(applied, vec![(0, 0), (0, 2)]);
}

#[tokio::test(start_paused = true)]
async fn a_saturated_job_queue_rejects_further_messages() {
    let config = RaConfig {
        jobs: JobQueueLimits {
            max_pending:     1,
            max_concurrency: 1,
        },
        ..Default::default()
    };
    let kinds = MessageKinds::new().entity(
        MessageMetadata::new("Update").create_entity(),
        |u: &Update| EntityId::from(u.entity.as_str()),
        |_: &mut Replica, _: Update, _| {
            JobOutcome::Pending(tokio::time::sleep(Duration::from_secs(1)).boxed())
        },
    );
    let setup = Setup::new(config, kinds, |_| Replica::default()).opened();

    let first = setup.request(update("r", 0, 0));
    let second = setup.request(update("r", 0, 1));
    let (first, second) = tokio::join!(first, second);

    assert!(first.is_err());
    assert_eq!(fault_of(second), Some(FaultCode::QueueFull));
    assert_eq!(setup.agent.events.drops(), vec![DropReason::QueueFull]);
}

#[tokio::test(start_paused = true)]
async fn closing_answers_jobs_still_waiting_for_their_entity() {
    let kinds = MessageKinds::new().entity(
        MessageMetadata::new("Update").create_entity(),
        |u: &Update| EntityId::from(u.entity.as_str()),
        |_: &mut Replica, _: Update, _| {
            JobOutcome::Pending(tokio::time::sleep(Duration::from_secs(1)).boxed())
        },
    );
    let setup = Setup::new(RaConfig::default(), kinds, |_| Replica::default()).opened();

    assert!(setup.send(update("r", 0, 0)));
    setup.scheduled(1).await;
    let waiting = setup.begin_request(update("r", 0, 1));
    setup.scheduled(2).await;

    setup.handler.close(&setup.agent.manager);
    let result = setup.end_request(waiting).await;
    assert_eq!(fault_of(result), Some(FaultCode::ObjectClosed));
    setup.handler.drained().await;
}
