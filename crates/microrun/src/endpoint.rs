//! Network endpoints, written `scheme://host:port`.

use std::str::FromStr;

use url::Url;

use crate::transport;

/// The scheme the TCP transport advertises.
pub const RPC_SCHEME: &str = "rpc";

/// A parsed `scheme://host:port` address. Host and port are mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    scheme: String,
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// `rpc://localhost:<port>`.
    pub fn localhost(port: u16) -> Self {
        Self::new(RPC_SCHEME, "localhost", port)
    }

    pub fn parse(s: &str) -> transport::Result<Self> {
        let url = Url::parse(s)
            .map_err(|e| transport::Error::InvalidEndpoint(format!("{}: {}", s, e)))?;
        Self::from_url(&url)
    }

    pub fn from_url(url: &Url) -> transport::Result<Self> {
        let invalid = |what: &str| transport::Error::InvalidEndpoint(format!("{}: missing {}", url, what));
        let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(|| invalid("host"))?;
        let port = url.port().ok_or_else(|| invalid("port"))?;
        Ok(Self::new(url.scheme(), host, port))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = transport::Error;

    fn from_str(s: &str) -> transport::Result<Self> {
        Self::parse(s)
    }
}
