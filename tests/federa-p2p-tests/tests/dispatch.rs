mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{inst, network};
use federa_p2p::testing::Node;
use federa_p2p::{DropReason, Filter, MessageHandlerPair};
use federa_proto::{Actor, FaultCode, Message, PToPActor, RingName};

fn counter(hits: &Arc<AtomicUsize>) -> MessageHandlerPair {
    let hits = hits.clone();
    MessageHandlerPair::one_way(move |_, ctx| {
        hits.fetch_add(1, Ordering::SeqCst);
        ctx.accept();
    })
}

fn send(from: &Node, to: u128, instance: u64, message: Message) -> bool {
    from.manager
        .ptop_send(message, inst(to, instance), &RingName::default(), true, PToPActor::Direct)
}

#[tokio::test]
async fn first_matching_registration_handles_the_message() {
    let net = network();
    let a = net.node("a", inst(1, 1));
    let b = net.node("b", inst(2, 1));
    a.knows(&b, inst(2, 1));

    let specific = Arc::new(AtomicUsize::new(0));
    let general = Arc::new(AtomicUsize::new(0));
    let only_x: Filter = Arc::new(|m: &Message| m.action() == "X");
    b.manager
        .register_message_handler(Actor(7), counter(&specific), Some(only_x));
    b.manager
        .register_message_handler(Actor(7), counter(&general), None);

    assert!(send(&a, 2, 1, Message::empty(Actor(7), "X")));
    assert!(send(&a, 2, 1, Message::empty(Actor(7), "Y")));
    assert_eq!(specific.load(Ordering::SeqCst), 1);
    assert_eq!(general.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unregistered_actor_rejects() {
    let net = network();
    let a = net.node("a", inst(1, 1));
    let b = net.node("b", inst(2, 1));
    a.knows(&b, inst(2, 1));

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let record = seen.clone();
    b.manager.register_message_handler(
        Actor(7),
        MessageHandlerPair::one_way(move |m, ctx| {
            record.lock().push(m.action().to_owned());
            ctx.accept();
        }),
        None,
    );

    assert!(send(&a, 2, 1, Message::empty(Actor(7), "X")));
    assert_eq!(*seen.lock(), vec!["X".to_owned()]);
    assert!(b.events.rejections().is_empty());

    assert!(b.manager.unregister_message_handler(Actor(7), None));
    assert!(!b.manager.unregister_message_handler(Actor(7), None));

    assert!(send(&a, 2, 1, Message::empty(Actor(7), "X")));
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(b.events.rejections(), vec![FaultCode::MessageHandlerDoesNotExist]);
}

#[tokio::test]
async fn idempotent_messages_tolerate_instance_mismatch() {
    let net = network();
    let a = net.node("a", inst(1, 1));
    let b = net.node("b", inst(2, 5));
    a.knows(&b, inst(2, 4));

    let hits = Arc::new(AtomicUsize::new(0));
    b.manager.register_message_handler(Actor(7), counter(&hits), None);

    let mut vote = Message::empty(Actor(7), "Vote");
    vote.set_idempotent(true);
    assert!(send(&a, 2, 4, vote));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    assert!(send(&a, 2, 4, Message::empty(Actor(7), "Update")));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(b.events.drops(), vec![DropReason::NodeMismatch]);
}

#[tokio::test]
async fn inexact_send_reaches_a_newer_instance() {
    let net = network();
    let a = net.node("a", inst(1, 1));
    let b = net.node("b", inst(2, 5));
    a.knows(&b, inst(2, 4));

    let hits = Arc::new(AtomicUsize::new(0));
    b.manager.register_message_handler(Actor(7), counter(&hits), None);

    assert!(a.manager.ptop_send(
        Message::empty(Actor(7), "Update"),
        inst(2, 4),
        &RingName::default(),
        false,
        PToPActor::Direct,
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn wrong_ring_is_dropped() {
    let net = network();
    let a = net.node("a", inst(1, 1));
    let b = net.node("b", inst(2, 1));
    a.knows_address("b", inst(2, 1), RingName::new("east"));

    let hits = Arc::new(AtomicUsize::new(0));
    b.manager.register_message_handler(Actor(7), counter(&hits), None);

    assert!(a.manager.ptop_send(
        Message::empty(Actor(7), "X"),
        inst(2, 1),
        &RingName::new("east"),
        true,
        PToPActor::Direct,
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(b.events.drops(), vec![DropReason::NodeMismatch]);
}

#[tokio::test]
async fn federation_message_to_a_stale_instance_marks_it_shut_down() {
    let net = network();
    let a = net.node("a", inst(1, 1));
    let b = net.node("b", inst(2, 5));
    a.knows(&b, inst(2, 4));

    assert!(a.manager.ptop_send(
        Message::empty(Actor::FEDERATION, "Ping"),
        inst(2, 4),
        &RingName::default(),
        true,
        PToPActor::Federation,
    ));

    assert_eq!(b.events.rejections(), vec![FaultCode::NodeDoesNotMatch]);
    assert!(
        a.manager
            .partners()
            .is_shutdown(inst(2, 4), &RingName::default())
    );

    b.events.clear();
    assert!(!a.manager.ptop_send(
        Message::empty(Actor::FEDERATION, "Ping"),
        inst(2, 4),
        &RingName::default(),
        true,
        PToPActor::Federation,
    ));
    assert!(b.events.rejections().is_empty());
}

#[tokio::test]
async fn invalid_and_headerless_messages_are_dropped() {
    let net = network();
    let b = net.node("b", inst(2, 1));

    let mut invalid = Message::empty(Actor(7), "X");
    invalid.mark_invalid();
    b.manager.process_incoming_transport_message(invalid, None);
    b.manager
        .process_incoming_transport_message(Message::empty(Actor(7), "X"), None);

    assert_eq!(
        b.events.drops(),
        vec![DropReason::Invalid, DropReason::HeaderMissing]
    );
}
