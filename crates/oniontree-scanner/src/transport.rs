//! Probe transports.
//!
//! A [`Transport`] performs one liveness check against an [`Endpoint`].
//! Workers bound every check with the configured timeout, so a transport
//! only has to report success or the error it hit.
//!
//! Both built-in transports can tunnel through a SOCKS5 proxy. Target
//! host names are resolved by the proxy, which is what a Tor client needs
//! to reach `.onion` addresses.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Empty;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tracing::debug;

use crate::config::{ScannerConfig, TransportKind};

const USER_AGENT: &str = concat!("oniontree-scanner/", env!("CARGO_PKG_VERSION"));

/// Why a probe did not find its URL online.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("proxy connection failed: {0}")]
    Proxy(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    /// The URL stopped being watched because the scan was shut down.
    #[error("scan cancelled")]
    Cancelled,
}

/// URL scheme of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

/// A parsed, probe-ready URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
    scheme: Scheme,
    host: String,
    port: u16,
    path: String,
}

impl Endpoint {
    /// Parse an `http://` or `https://` URL. The port defaults per scheme.
    pub fn parse(url: &str) -> Result<Self, ProbeError> {
        let invalid = |reason: &str| ProbeError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let uri: http::Uri = url
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
        let scheme = match uri.scheme_str() {
            Some("http") => Scheme::Http,
            Some("https") => Scheme::Https,
            Some(other) => return Err(invalid(&format!("unsupported scheme `{other}`"))),
            None => return Err(invalid("missing scheme")),
        };
        let host = uri.host().filter(|h| !h.is_empty()).ok_or_else(|| invalid("missing host"))?;
        let port = uri.port_u16().unwrap_or(match scheme {
            Scheme::Http => 80,
            Scheme::Https => 443,
        });
        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| !pq.is_empty())
            .unwrap_or("/");

        Ok(Self {
            url: url.to_string(),
            scheme,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// The URL exactly as it appears in the service record.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path and query to request, `/` when the URL has none.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Value for the `Host` header.
    fn authority(&self) -> String {
        let default_port = match self.scheme {
            Scheme::Http => 80,
            Scheme::Https => 443,
        };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Boxed future returned by [`Transport::check`].
pub type CheckFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ProbeError>> + Send + 'a>>;

/// One liveness check against an endpoint. Injected for testability.
pub trait Transport: Send + Sync {
    /// `Ok(())` means the endpoint is online.
    fn check<'a>(&'a self, endpoint: &'a Endpoint) -> CheckFuture<'a>;
}

/// Build the transport described by a scanner config.
pub fn from_config(config: &ScannerConfig) -> Arc<dyn Transport> {
    let proxy = config.proxy.clone();
    match config.transport {
        TransportKind::Http => Arc::new(HttpTransport::new(proxy)),
        TransportKind::Tcp => Arc::new(TcpTransport::new(proxy)),
    }
}

/// Opens TCP streams, directly or through a SOCKS5 proxy.
#[derive(Debug, Clone, Default)]
struct Connector {
    proxy: Option<String>,
}

impl Connector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<TcpStream, ProbeError> {
        let target = (endpoint.host(), endpoint.port());
        match &self.proxy {
            Some(proxy) => Socks5Stream::connect(proxy.as_str(), target)
                .await
                .map(Socks5Stream::into_inner)
                .map_err(|e| ProbeError::Proxy(e.to_string())),
            None => TcpStream::connect(target)
                .await
                .map_err(|e| ProbeError::Connect(e.to_string())),
        }
    }
}

/// Checks reachability with a TCP connect.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    connector: Connector,
}

impl TcpTransport {
    pub fn new(proxy: Option<String>) -> Self {
        Self {
            connector: Connector { proxy },
        }
    }
}

impl Transport for TcpTransport {
    fn check<'a>(&'a self, endpoint: &'a Endpoint) -> CheckFuture<'a> {
        Box::pin(async move {
            self.connector.connect(endpoint).await?;
            Ok(())
        })
    }
}

/// Checks reachability with an HTTP/1.1 `GET`.
///
/// Any response, whatever its status, proves the service is up.
/// `https://` endpoints are checked at the TCP level.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    connector: Connector,
}

impl HttpTransport {
    pub fn new(proxy: Option<String>) -> Self {
        Self {
            connector: Connector { proxy },
        }
    }

    async fn get(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        let stream = self.connector.connect(endpoint).await?;
        if endpoint.scheme() == Scheme::Https {
            return Ok(());
        }

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        // Drive the connection in the background.
        let url = endpoint.url().to_string();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, %url, "probe connection closed with error");
            }
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(endpoint.path())
            .header("host", endpoint.authority())
            .header("user-agent", USER_AGENT)
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?;
        debug!(status = %resp.status(), url = %endpoint.url(), "probe response");
        Ok(())
    }
}

impl Transport for HttpTransport {
    fn check<'a>(&'a self, endpoint: &'a Endpoint) -> CheckFuture<'a> {
        Box::pin(self.get(endpoint))
    }
}
