#![allow(dead_code)]

use std::sync::Arc;

use federa_p2p::testing::Network;
use federa_proto::{NodeId, NodeInstance};

pub fn logger_config() -> federa_logger::LoggingConfig {
    use federa_logger::*;

    LoggingConfig {
        min_log_level:     Level::TRACE,
        log_target_filter: vec![
            "federa_p2p=TRACE".parse().unwrap(),
            "*=INFO".parse().unwrap(),
        ],
    }
}

pub fn network() -> Arc<Network> {
    let _ = federa_logger::init(&logger_config());
    Network::new()
}

pub fn inst(id: u128, instance: u64) -> NodeInstance {
    NodeInstance::new(NodeId(id), instance)
}
