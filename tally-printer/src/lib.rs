//! # tally-printer
//!
//! ESC/POS receipt printer library.
//!
//! ## Scope
//!
//! This crate turns printing intents into the exact bytes a receipt printer
//! expects:
//! - Capability profiles per printer model
//! - Pure command encoders (text style, cuts, drawer, barcodes, PDF417, QR,
//!   bit images)
//! - Unicode to code page transcoding with ASCII folding
//! - A stateful session with a fluent API and pluggable connectors
//! - Async delivery to network printers (TCP port 9100)
//!
//! What to print (receipt layout, business data) stays in application code.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tally_printer::{
//!     BarcodeSymbology, CapabilityProfile, ConnectorSpec, Justification, PrinterSession,
//!     SessionOptions,
//! };
//!
//! let profile = Arc::new(CapabilityProfile::load("default")?);
//! let spec = ConnectorSpec::by_name("network", [("host", "192.168.1.100")]);
//! let options = SessionOptions::default().with_auto_cut(true);
//! let mut session = PrinterSession::open(profile, options, spec)?;
//! session
//!     .set_justification(Justification::Center)?
//!     .println("Café Olé")?
//!     .barcode("A0042", BarcodeSymbology::Code39)?;
//! session.end()?;
//! ```

pub mod config;
pub mod connector;
pub mod encoding;
mod error;
pub mod escpos;
pub mod profile;
pub mod raster;
pub mod session;
pub mod spooler;

// Re-exports
pub use config::{ConnectorConfig, SessionConfig};
pub use connector::{
    Connector, ConnectorRegistry, ConnectorSpec, DummyConnector, FileConnector, NetworkConnector,
};
pub use encoding::{Charset, Transcoder, fold_special_chars};
pub use error::{PrintError, PrintResult};
pub use escpos::barcode::{BarcodeSymbology, HriPosition};
pub use escpos::code2d::{Pdf417Mode, Pdf417Options, QrErrorLevel, QrModel, QrOptions};
pub use escpos::graphics::{ImageScale, RasterCommand};
pub use escpos::{
    CutMode, DrawerPin, EncodedCommand, Font, Justification, PrintMode, PulseConfig, TextSize,
};
pub use profile::{CapabilityProfile, CodePage, Feature};
pub use raster::{Bitmap, RasterSource};
pub use session::{PrinterSession, SessionOptions, with_session};
pub use spooler::{NetworkSpooler, Spooler};
