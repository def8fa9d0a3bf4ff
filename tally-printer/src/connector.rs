//! Byte sinks for printer sessions
//!
//! A [`Connector`] receives the encoded stream in call order. Three transports
//! ship with the crate:
//!
//! - `dummy`: in-memory capture, for tests and for building jobs offline
//! - `file`: a device node or plain file (`/dev/usb/lp0`, a spool file)
//! - `network`: raw TCP, usually port 9100
//!
//! Sessions obtain a connector through a [`ConnectorSpec`]. Named specs are
//! resolved by a [`ConnectorRegistry`] once, when the session opens.

use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::error::{PrintError, PrintResult};
use crate::spooler::DEFAULT_PORT;

/// Destination for encoded bytes
pub trait Connector: Send {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    /// Release the transport. Called at most once by a session.
    fn close(&mut self) -> io::Result<()>;
}

// ============================================================================
// Dummy
// ============================================================================

#[derive(Debug, Default)]
struct Captured {
    data: Vec<u8>,
    writes: usize,
    flushes: usize,
    closes: usize,
}

/// In-memory connector.
///
/// Clones share the same buffer, so a caller can keep one handle and give the
/// other to a session, then inspect what was written.
#[derive(Debug, Clone, Default)]
pub struct DummyConnector {
    inner: Arc<Mutex<Captured>>,
}

impl DummyConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Captured> {
        // A panic while holding the lock cannot leave `Captured` inconsistent
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Everything written so far
    pub fn contents(&self) -> Vec<u8> {
        self.lock().data.clone()
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }
}

impl Connector for DummyConnector {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut inner = self.lock();
        inner.data.extend_from_slice(bytes);
        inner.writes += 1;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().flushes += 1;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.lock().closes += 1;
        Ok(())
    }
}

// ============================================================================
// File
// ============================================================================

/// Writes to a device node or regular file
#[derive(Debug)]
pub struct FileConnector {
    path: PathBuf,
    file: Option<File>,
}

impl FileConnector {
    /// Open `path` for writing, truncating regular files
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        debug!(path = %path.display(), "file connector opened");
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "file connector closed"))
    }
}

impl Connector for FileConnector {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file()?.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all().or_else(|e| {
                // Character devices reject fsync
                if e.kind() == io::ErrorKind::InvalidInput {
                    Ok(())
                } else {
                    Err(e)
                }
            })?;
        }
        Ok(())
    }
}

// ============================================================================
// Network
// ============================================================================

/// Raw TCP connector (blocking)
#[derive(Debug)]
pub struct NetworkConnector {
    peer: String,
    stream: Option<TcpStream>,
}

impl NetworkConnector {
    /// Connect to `host:port`, trying each resolved address within `timeout`
    #[instrument(skip(timeout))]
    pub fn connect(host: &str, port: u16, timeout: Duration) -> io::Result<Self> {
        let peer = format!("{host}:{port}");
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;
                    info!(%addr, "connected to printer");
                    return Ok(Self {
                        peer,
                        stream: Some(stream),
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no address for {peer}"))
        }))
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "network connector closed"))
    }
}

impl Connector for NetworkConnector {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream()?.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream()?.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.flush()?;
            match stream.shutdown(std::net::Shutdown::Write) {
                Ok(()) => {}
                // Printer already hung up
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

// ============================================================================
// Spec and registry
// ============================================================================

/// How a session obtains its connector
pub enum ConnectorSpec {
    /// A connector the caller already built
    Preloaded(Box<dyn Connector>),
    /// Build one through the registry, e.g. `network` with `host`/`port`
    ByName {
        kind: String,
        config: HashMap<String, String>,
    },
}

impl ConnectorSpec {
    pub fn preloaded(connector: impl Connector + 'static) -> Self {
        Self::Preloaded(Box::new(connector))
    }

    pub fn by_name<K, V>(kind: &str, config: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::ByName {
            kind: kind.to_string(),
            config: config
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Debug for ConnectorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preloaded(_) => f.write_str("Preloaded(..)"),
            Self::ByName { kind, config } => f
                .debug_struct("ByName")
                .field("kind", kind)
                .field("config", config)
                .finish(),
        }
    }
}

/// Builds a connector from string settings
pub type ConnectorFactory = fn(&HashMap<String, String>) -> PrintResult<Box<dyn Connector>>;

/// Maps connector kinds to factories
#[derive(Clone)]
pub struct ConnectorRegistry {
    factories: HashMap<String, ConnectorFactory>,
}

impl ConnectorRegistry {
    /// Registry with no kinds at all
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with `dummy`, `file` and `network`
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("dummy", dummy_factory);
        registry.register("file", file_factory);
        registry.register("network", network_factory);
        registry
    }

    /// Add or replace a kind (names are case-insensitive)
    pub fn register(&mut self, kind: &str, factory: ConnectorFactory) -> &mut Self {
        self.factories.insert(kind.to_ascii_lowercase(), factory);
        self
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Turn a spec into a live connector
    pub fn resolve(&self, spec: ConnectorSpec) -> PrintResult<Box<dyn Connector>> {
        match spec {
            ConnectorSpec::Preloaded(connector) => Ok(connector),
            ConnectorSpec::ByName { kind, config } => {
                let factory = self
                    .factories
                    .get(&kind.to_ascii_lowercase())
                    .ok_or_else(|| PrintError::ConnectorNotFound(kind.clone()))?;
                let connector = factory(&config)?;
                info!(%kind, "connector resolved");
                Ok(connector)
            }
        }
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

fn setting<'a>(config: &'a HashMap<String, String>, key: &str) -> PrintResult<&'a str> {
    config
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PrintError::InvalidConfig(format!("missing connector setting '{key}'")))
}

fn parsed_setting<T: std::str::FromStr>(
    config: &HashMap<String, String>,
    key: &str,
    default: T,
) -> PrintResult<T> {
    match config.get(key).map(|v| v.trim()) {
        None | Some("") => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| PrintError::InvalidConfig(format!("invalid {key}: {raw}"))),
    }
}

fn dummy_factory(_: &HashMap<String, String>) -> PrintResult<Box<dyn Connector>> {
    Ok(Box::new(DummyConnector::new()))
}

fn file_factory(config: &HashMap<String, String>) -> PrintResult<Box<dyn Connector>> {
    let path = setting(config, "path")?;
    Ok(Box::new(FileConnector::open(path)?))
}

fn network_factory(config: &HashMap<String, String>) -> PrintResult<Box<dyn Connector>> {
    let host = setting(config, "host")?;
    let port = parsed_setting(config, "port", DEFAULT_PORT)?;
    let timeout_ms = parsed_setting(config, "timeout_ms", 5000u64)?;
    if timeout_ms == 0 {
        return Err(PrintError::InvalidConfig("timeout_ms must be positive".into()));
    }
    let connector = NetworkConnector::connect(host, port, Duration::from_millis(timeout_ms))
        .map_err(|e| PrintError::Connection(format!("{host}:{port}: {e}")))?;
    Ok(Box::new(connector))
}
