//! # Configuration
//!
//! Typed knobs for the client, its in-flight tables, and the server. Every struct has a
//! `Default` matching the protocol's stock values and `with_*` builders for overrides.

use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::time::Duration;

use microrpc::DEFAULT_MAX_FRAME_SIZE;

use crate::endpoint::Endpoint;

pub const DEFAULT_PORT: u16 = 9999;

/// Limits for one connection's table of outstanding requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InflightConfig {
    /// Maximum number of outstanding requests.
    pub capacity: usize,
    /// How long `put` waits for a free slot.
    pub submit_timeout: Duration,
    /// Age after which an outstanding request is reaped. Also the reaper's period.
    pub request_timeout: Duration,
}

impl Default for InflightConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            submit_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl InflightConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub inflight: InflightConfig,
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            inflight: InflightConfig::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_inflight(mut self, inflight: InflightConfig) -> Self {
        self.inflight = inflight;
        self
    }

    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Endpoint handed out to name services. `None` means `rpc://localhost:<bound port>`.
    pub advertised: Option<Endpoint>,
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            advertised: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_advertised(mut self, endpoint: Endpoint) -> Self {
        self.advertised = Some(endpoint);
        self
    }

    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// The endpoint to publish, given the port actually bound (if any).
    pub fn advertised_endpoint(&self, bound_port: Option<u16>) -> Endpoint {
        match &self.advertised {
            Some(endpoint) => endpoint.clone(),
            None => Endpoint::localhost(bound_port.unwrap_or(self.bind_addr.port())),
        }
    }
}
