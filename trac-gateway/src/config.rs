//! Gateway-local configuration: the route table plus the timeouts
//! spec.md §5 lists as gateway defaults.

use std::time::Duration;

use crate::negotiator::NegotiatorConfig;
use crate::router::RouteTable;

#[derive(Debug, Clone, Copy)]
pub struct GatewayTimeouts {
    pub connection_idle: Duration,
    pub request: Duration,
}

impl Default for GatewayTimeouts {
    fn default() -> Self {
        Self { connection_idle: Duration::from_secs(60), request: Duration::from_secs(30) }
    }
}

pub struct GatewayConfig {
    pub routes: RouteTable,
    pub timeouts: GatewayTimeouts,
}

impl GatewayConfig {
    pub fn new(routes: RouteTable) -> Self {
        Self { routes, timeouts: GatewayTimeouts::default() }
    }

    pub fn negotiator_config(&self) -> NegotiatorConfig {
        NegotiatorConfig::with_idle_timeout(self.timeouts.connection_idle)
    }
}
