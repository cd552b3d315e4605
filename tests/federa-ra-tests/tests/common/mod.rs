#![allow(dead_code)]

use std::sync::Arc;

use federa_common::errors::error_of::ErrorOf;
use federa_common::validation::Validate;
use federa_p2p::{Event, PendingRequest, RequestErrorKind};
use federa_p2p::testing::{Network, Node};
use federa_proto::headers::{GenerationHeader, RetryHeader};
use federa_proto::{
    Actor, FaultCode, Generation, Message, NodeId, NodeInstance, PToPActor, RingName,
};
use federa_ra::{EntityId, MessageHandler, MessageKinds, RaConfig};
use serde::Serialize;
use tokio::runtime::Handle;

pub const AGENT: NodeInstance = NodeInstance::new(NodeId(2), 1);

pub fn logger_config() -> federa_logger::LoggingConfig {
    use federa_logger::*;

    LoggingConfig {
        min_log_level:     Level::TRACE,
        log_target_filter: vec![
            "federa_ra=TRACE".parse().unwrap(),
            "federa_jobs=DEBUG".parse().unwrap(),
            "*=INFO".parse().unwrap(),
        ],
    }
}

pub fn generation(number: u64) -> Generation {
    Generation::new(number, NodeId(9))
}

/// A driver node talking to a node hosting the agent. The agent is built
/// but not opened.
pub struct Setup<E> {
    pub net:     Arc<Network>,
    pub driver:  Node,
    pub agent:   Node,
    pub handler: MessageHandler<E>,
}

impl<E> Setup<E>
where
    E: Send + 'static,
{
    pub fn new(
        config: RaConfig,
        kinds: MessageKinds<E>,
        create: impl Fn(&EntityId) -> E + Send + Sync + 'static,
    ) -> Self {
        let _ = federa_logger::init(&logger_config());

        let net = Network::new();
        let driver = net.node("driver", NodeInstance::new(NodeId(1), 1));
        let agent = net.node("agent", AGENT);
        driver.knows(&agent, AGENT);

        let handler = MessageHandler::new(
            config.validate().unwrap(),
            kinds,
            create,
            agent.events.clone(),
            Handle::current(),
        );
        Self {
            net,
            driver,
            agent,
            handler,
        }
    }

    pub fn opened(self) -> Self {
        self.handler.open(&self.agent.manager);
        self
    }

    pub fn send(&self, message: Message) -> bool {
        self.driver.manager.ptop_send(
            message,
            AGENT,
            &RingName::default(),
            true,
            PToPActor::Direct,
        )
    }

    /// Sends a request without waiting for the answer.
    pub fn begin_request(&self, message: Message) -> PendingRequest {
        self.driver.manager.begin_ptop_send_request(
            message,
            AGENT,
            &RingName::default(),
            true,
            PToPActor::Direct,
            None,
        )
    }

    pub async fn end_request(
        &self,
        pending: PendingRequest,
    ) -> Result<Message, ErrorOf<RequestErrorKind>> {
        self.driver.manager.end_ptop_send_request(pending).await
    }

    /// Yields until the agent has scheduled `count` jobs.
    pub async fn scheduled(&self, count: usize) {
        let scheduled = || {
            self.agent
                .events
                .count(|e| matches!(e, Event::JobScheduled { .. }))
        };
        while scheduled() < count {
            tokio::task::yield_now().await;
        }
    }

    pub async fn request(&self, message: Message) -> Result<Message, ErrorOf<RequestErrorKind>> {
        self.driver
            .manager
            .send_request(message, AGENT, &RingName::default(), true, PToPActor::Direct, None)
            .await
    }
}

pub fn message<B: Serialize>(action: &str, body: &B) -> Message {
    Message::new(Actor::RA, action, body).unwrap()
}

pub fn with_generation(mut message: Message, number: u64) -> Message {
    let header = GenerationHeader {
        generation: generation(number),
    };
    message.headers_mut().add(&header).unwrap();
    message
}

pub fn with_attempt(mut message: Message, attempt: u32) -> Message {
    message.headers_mut().add(&RetryHeader { attempt }).unwrap();
    message
}

pub fn fault_of(result: Result<Message, ErrorOf<RequestErrorKind>>) -> Option<FaultCode> {
    match result {
        Err(e) => {
            match e.kind {
                RequestErrorKind::Fault(code) => Some(code),
                _ => None,
            }
        },
        Ok(_) => None,
    }
}
