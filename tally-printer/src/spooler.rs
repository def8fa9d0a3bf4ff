//! Async delivery of finished jobs
//!
//! A session produces the whole byte stream; the spooler ships it to a raw
//! TCP printer (port 9100) in one connection. This is the path to use from
//! async services, where the blocking [`Connector`](crate::Connector)
//! transports would stall the runtime.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, lookup_host};
use tracing::{debug, info, instrument, warn};

use crate::error::{PrintError, PrintResult};

/// Raw printing port shared by most network receipt printers
pub const DEFAULT_PORT: u16 = 9100;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Destination for finished print jobs
#[allow(async_fn_in_trait)]
pub trait Spooler {
    /// Deliver a complete ESC/POS stream
    async fn send(&self, data: &[u8]) -> PrintResult<()>;

    /// Whether the printer accepts connections right now
    async fn is_online(&self) -> bool;
}

/// Raw TCP spooler
///
/// The host is resolved on every connection, so DHCP names such as
/// `printer.local` follow the printer across address changes.
#[derive(Debug, Clone)]
pub struct NetworkSpooler {
    host: String,
    port: u16,
    timeout: Duration,
}

impl NetworkSpooler {
    /// Same settings as the `network` connector: host name or IP plus port
    pub fn new(host: &str, port: u16) -> PrintResult<Self> {
        let host = host.trim().trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(PrintError::InvalidConfig("Empty printer host".into()));
        }
        Ok(Self {
            host: host.to_string(),
            port,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Parse `"192.168.1.100:9100"` or `"printer.local:9100"`; without a
    /// port the printer is assumed on 9100
    pub fn from_addr(addr: &str) -> PrintResult<Self> {
        let invalid = || PrintError::InvalidConfig(format!("Invalid address: {addr}"));
        if let Ok(sock) = addr.parse::<SocketAddr>() {
            return Self::new(&sock.ip().to_string(), sock.port());
        }
        if let Ok(ip) = addr.parse::<IpAddr>() {
            return Self::new(&ip.to_string(), DEFAULT_PORT);
        }
        match addr.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| invalid())?;
                Self::new(host, port).map_err(|_| invalid())
            }
            None => Self::new(addr, DEFAULT_PORT).map_err(|_| invalid()),
        }
    }

    /// Connection timeout for [`Spooler::send`], name resolution included
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn peer(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Resolve the host and try each address in turn
    async fn connect(&self) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in lookup_host((self.host.as_str(), self.port)).await? {
            match TcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(%addr, error = %e, "address refused");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        }))
    }
}

impl Spooler for NetworkSpooler {
    #[instrument(skip(data), fields(addr = %self.peer(), data_len = data.len()))]
    async fn send(&self, data: &[u8]) -> PrintResult<()> {
        let mut stream = tokio::time::timeout(self.timeout, self.connect())
            .await
            .map_err(|_| PrintError::Timeout(format!("Connection timeout: {}", self.peer())))?
            .map_err(|e| PrintError::Connection(format!("{}: {e}", self.peer())))?;

        stream.write_all(data).await?;
        stream.flush().await?;
        stream.shutdown().await?;

        info!("job delivered");
        Ok(())
    }

    #[instrument(fields(addr = %self.peer()))]
    async fn is_online(&self) -> bool {
        match tokio::time::timeout(PROBE_TIMEOUT, self.connect()).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "printer offline");
                false
            }
            Err(_) => {
                warn!("printer probe timed out");
                false
            }
        }
    }
}
