mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{inst, network};
use federa_p2p::{DeliveryScheduler, DropReason, LeaseAgent, LoopbackDelay, MessageHandlerPair};
use federa_proto::headers::PToPHeader;
use federa_proto::{Actor, Message, NodeInstance, PToPActor, RingName};
use tokio::sync::mpsc;
use tokio::time::Instant;

const APP: Actor = Actor(7);

struct Fixed(LoopbackDelay);

impl DeliveryScheduler for Fixed {
    fn loopback_delay(&self, _message: &Message, _local: NodeInstance) -> LoopbackDelay {
        self.0
    }
}

fn forward_to(tx: mpsc::UnboundedSender<Message>) -> MessageHandlerPair {
    MessageHandlerPair::one_way(move |message, ctx| {
        let _ = tx.send(message);
        ctx.accept();
    })
}

fn point_to_point(message: &Message) -> PToPHeader {
    message
        .headers()
        .try_read_first::<PToPHeader>()
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn loopback_delivery_carries_the_same_headers_as_a_remote_one() {
    let net = network();
    let a = net.node("a", inst(1, 1));
    let b = net.node("b", inst(2, 1));
    a.knows(&b, inst(2, 1));

    let (tx, mut rx) = mpsc::unbounded_channel();
    a.manager.register_message_handler(APP, forward_to(tx.clone()), None);
    b.manager.register_message_handler(APP, forward_to(tx), None);

    let ring = RingName::default();
    let body = vec![1u8, 2, 3];
    assert!(a.manager.ptop_send(
        Message::new(APP, "Hello", &body).unwrap(),
        inst(2, 1),
        &ring,
        true,
        PToPActor::Direct
    ));
    let remote = rx.recv().await.unwrap();

    assert!(a.manager.ptop_send(
        Message::new(APP, "Hello", &body).unwrap(),
        inst(1, 1),
        &ring,
        true,
        PToPActor::Direct
    ));
    let looped = rx.recv().await.unwrap();

    let remote_header = point_to_point(&remote);
    let looped_header = point_to_point(&looped);
    assert_eq!(remote_header.to, inst(2, 1));
    assert_eq!(looped_header.to, inst(1, 1));
    assert_eq!(
        PToPHeader {
            to: remote_header.to,
            ..looped_header.clone()
        },
        remote_header
    );
    assert_eq!(looped.headers().len(), remote.headers().len());
    assert_eq!(looped.body::<Vec<u8>>().unwrap(), body);
    assert!(looped.message_id().is_some());
    assert_ne!(looped.message_id(), remote.message_id());
    assert!(a.events.drops().is_empty());
}

#[tokio::test]
async fn loopback_keeps_send_order() {
    let net = network();
    let a = net.node("a", inst(1, 1));
    let (tx, mut rx) = mpsc::unbounded_channel();
    a.manager.register_message_handler(APP, forward_to(tx), None);

    for n in 0..50u32 {
        let message = Message::new(APP, "Seq", &n).unwrap();
        let sent = a
            .manager
            .ptop_send(message, inst(1, 1), &RingName::default(), true, PToPActor::Direct);
        assert!(sent);
    }
    for n in 0..50u32 {
        assert_eq!(rx.recv().await.unwrap().body::<u32>().unwrap(), n);
    }
}

#[tokio::test]
async fn loopback_request_gets_its_reply() {
    let net = network();
    let a = net.node("a", inst(1, 1));
    a.manager.register_message_handler(
        APP,
        MessageHandlerPair::new(
            |_, ctx| ctx.accept(),
            |_, ctx| {
                ctx.reply(Message::empty(APP, "Yourself"));
            },
        ),
        None,
    );

    let reply = a
        .manager
        .send_request(
            Message::empty(APP, "Who"),
            inst(1, 1),
            &RingName::default(),
            true,
            PToPActor::Direct,
            None,
        )
        .await
        .unwrap();
    assert_eq!(reply.action(), "Yourself");
}

#[tokio::test(start_paused = true)]
async fn delayed_loopback_arrives_after_the_delay() {
    let net = network();
    let delay = Duration::from_millis(500);
    let a = net.node_with("a", inst(1, 1), RingName::default(), |b| {
        b.delivery_scheduler(Arc::new(Fixed(LoopbackDelay::After(delay))))
    });
    let (tx, mut rx) = mpsc::unbounded_channel();
    a.manager.register_message_handler(APP, forward_to(tx), None);

    let started = Instant::now();
    assert!(a.manager.ptop_send(
        Message::empty(APP, "Later"),
        inst(1, 1),
        &RingName::default(),
        true,
        PToPActor::Direct
    ));
    assert!(rx.try_recv().is_err());
    assert_eq!(rx.recv().await.unwrap().action(), "Later");
    assert!(started.elapsed() >= delay);
}

#[tokio::test(start_paused = true)]
async fn partitioned_loopback_is_dropped() {
    let net = network();
    let a = net.node_with("a", inst(1, 1), RingName::default(), |b| {
        b.delivery_scheduler(Arc::new(Fixed(LoopbackDelay::Drop)))
    });
    let (tx, mut rx) = mpsc::unbounded_channel();
    a.manager.register_message_handler(APP, forward_to(tx), None);

    a.manager.ptop_send(
        Message::empty(APP, "Lost"),
        inst(1, 1),
        &RingName::default(),
        true,
        PToPActor::Direct,
    );
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(a.events.drops(), vec![DropReason::SimulatedPartition]);
}

#[tokio::test]
async fn expired_lease_only_lets_arbitration_through() {
    let net = network();
    let lease: Arc<dyn LeaseAgent> = Arc::new(|| true);
    let a = net.node_with("a", inst(1, 1), RingName::default(), |b| b.lease_agent(lease));
    let (tx, mut rx) = mpsc::unbounded_channel();
    a.manager.register_message_handler(APP, forward_to(tx), None);

    let ring = RingName::default();
    assert!(!a.manager.ptop_send(
        Message::empty(APP, "Update"),
        inst(1, 1),
        &ring,
        true,
        PToPActor::Direct
    ));
    assert!(a.manager.ptop_send(
        Message::empty(APP, "ArbitrateRequest"),
        inst(1, 1),
        &ring,
        true,
        PToPActor::Direct
    ));
    assert_eq!(rx.recv().await.unwrap().action(), "ArbitrateRequest");
    assert_eq!(a.events.drops(), vec![DropReason::LeaseExpired]);
}
