//! Printer session
//!
//! [`PrinterSession`] is the fluent front end. It remembers the text style the
//! caller asked for, compares it with what the printer last received, and
//! only emits style commands in front of content that will actually be
//! printed. Every byte goes to the connector in call order and is also kept in
//! an output buffer that [`PrinterSession::end`] returns.
//!
//! ```ignore
//! let profile = Arc::new(CapabilityProfile::load("default")?);
//! let mut session = PrinterSession::open(profile, SessionOptions::default(), spec)?;
//! session
//!     .set_justification(Justification::Center)?
//!     .set_emphasis(true)?
//!     .println("RECEIPT")?
//!     .set_emphasis(false)?
//!     .print_columns("Coffee", "3.50")?;
//! let bytes = session.end()?;
//! ```
//!
//! A session is `Open` until [`end`](PrinterSession::end) or
//! [`close`](PrinterSession::close). After that every operation fails with
//! `SessionClosed`; only the read accessors keep working. The connector is
//! released exactly once: by `end`, by `close`, or on drop.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::connector::{Connector, ConnectorRegistry, ConnectorSpec};
use crate::encoding::{DEFAULT_PLACEHOLDER, Transcoder};
use crate::error::{PrintError, PrintResult};
use crate::escpos::barcode::{self, BarcodeSymbology, HriPosition};
use crate::escpos::code2d::{self, Pdf417Options, QrOptions};
use crate::escpos::graphics::{self, ImageScale};
use crate::escpos::{
    self, CutMode, Font, Justification, LF, PrintMode, PulseConfig, TextSize,
};
use crate::profile::CapabilityProfile;
use crate::raster::RasterSource;

/// Barcode height used by [`PrinterSession::barcode`], capped by the profile
pub const DEFAULT_BARCODE_HEIGHT: u8 = 162;

/// Per-session behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Cut the paper in [`PrinterSession::end`]
    pub auto_cut: bool,
    pub cut_mode: CutMode,
    /// Lines fed by the cutter command itself
    pub cut_feed_lines: u8,
    /// Kick the cash drawer in [`PrinterSession::end`]
    pub pulse: Option<PulseConfig>,
    /// Send `ESC @` when the session opens
    pub initialize: bool,
    /// Byte printed for characters that cannot be transcoded
    pub placeholder: u8,
    /// Lines fed before the cut
    pub trailing_feed: u8,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_cut: false,
            cut_mode: CutMode::Full,
            cut_feed_lines: 3,
            pulse: None,
            initialize: true,
            placeholder: DEFAULT_PLACEHOLDER,
            trailing_feed: 2,
        }
    }
}

impl SessionOptions {
    pub fn with_auto_cut(mut self, cut: bool) -> Self {
        self.auto_cut = cut;
        self
    }

    pub fn with_pulse(mut self, pulse: PulseConfig) -> Self {
        self.pulse = Some(pulse);
        self
    }

    /// Check option ranges. Capability mismatches are reported later, by
    /// the operation that needs the feature.
    pub fn validate(&self) -> PrintResult<()> {
        if let Some(pulse) = &self.pulse {
            pulse.validate()?;
        }
        if !self.placeholder.is_ascii() {
            return Err(PrintError::InvalidConfig(format!(
                "placeholder must be an ASCII byte, got 0x{:02X}",
                self.placeholder
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Closed,
}

/// Style as the caller wants it
#[derive(Debug, Clone, Copy, Default)]
struct RequestedStyle {
    mode: PrintMode,
    justification: Justification,
    /// `GS !` override; `None` follows the mode's double bits
    size: Option<TextSize>,
}

impl RequestedStyle {
    fn text_size(&self) -> TextSize {
        self.size.unwrap_or(self.mode.character_size())
    }
}

/// Style the printer was last told about
#[derive(Debug, Clone, Copy, Default)]
struct PrinterStyle {
    mode: PrintMode,
    justification: Justification,
    size: TextSize,
}

/// Stateful ESC/POS writer
pub struct PrinterSession {
    profile: Arc<CapabilityProfile>,
    options: SessionOptions,
    transcoder: Transcoder,
    connector: Option<Box<dyn Connector>>,
    output: Vec<u8>,
    state: State,
    requested: RequestedStyle,
    printer: PrinterStyle,
    code_page_selected: bool,
    double_byte: bool,
}

impl fmt::Debug for PrinterSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrinterSession")
            .field("profile", &self.profile.name)
            .field("state", &self.state)
            .field("bytes", &self.output.len())
            .field("connected", &self.connector.is_some())
            .finish()
    }
}

impl PrinterSession {
    /// Open a session writing to the connector described by `spec`.
    ///
    /// Named connectors are resolved with [`ConnectorRegistry::with_defaults`].
    pub fn open(
        profile: Arc<CapabilityProfile>,
        options: SessionOptions,
        spec: ConnectorSpec,
    ) -> PrintResult<Self> {
        Self::open_with_registry(profile, options, spec, &ConnectorRegistry::with_defaults())
    }

    #[instrument(skip_all, fields(profile = %profile.name))]
    pub fn open_with_registry(
        profile: Arc<CapabilityProfile>,
        options: SessionOptions,
        spec: ConnectorSpec,
        registry: &ConnectorRegistry,
    ) -> PrintResult<Self> {
        options.validate()?;
        let connector = registry.resolve(spec)?;
        Self::start(profile, options, Some(connector))
    }

    /// Session with no connector; bytes are only collected
    pub fn buffered(profile: Arc<CapabilityProfile>, options: SessionOptions) -> PrintResult<Self> {
        options.validate()?;
        Self::start(profile, options, None)
    }

    fn start(
        profile: Arc<CapabilityProfile>,
        options: SessionOptions,
        connector: Option<Box<dyn Connector>>,
    ) -> PrintResult<Self> {
        let transcoder = Transcoder::for_profile(&profile).with_placeholder(options.placeholder);
        let mut session = Self {
            profile,
            options,
            transcoder,
            connector,
            output: Vec::new(),
            state: State::Open,
            requested: RequestedStyle::default(),
            printer: PrinterStyle::default(),
            code_page_selected: false,
            double_byte: false,
        };
        if session.options.initialize {
            session.emit(escpos::initialize().into_bytes())?;
        }
        info!(
            profile = %session.profile.name,
            code_page = %session.transcoder.code_page().charset,
            "printer session opened"
        );
        Ok(session)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Bytes emitted so far
    pub fn bytes(&self) -> &[u8] {
        &self.output
    }

    pub fn profile(&self) -> &CapabilityProfile {
        &self.profile
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Requested print mode
    pub fn mode(&self) -> PrintMode {
        self.requested.mode
    }

    pub fn justification(&self) -> Justification {
        self.requested.justification
    }

    /// Characters per line at the requested text width
    pub fn line_width(&self) -> usize {
        let base = if self.requested.mode.contains(PrintMode::FONT_B) {
            // Font B is 9 dots wide against font A's 12
            self.profile.columns * 4 / 3
        } else {
            self.profile.columns
        };
        (base / usize::from(self.requested.text_size().width)).max(1)
    }

    // ========================================================================
    // Text
    // ========================================================================

    pub fn print(&mut self, text: &str) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        let encoded = self.transcoder.encode(text);
        self.emit_text(encoded)?;
        Ok(self)
    }

    pub fn println(&mut self, text: &str) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        let mut encoded = self.transcoder.encode(text);
        encoded.push(LF);
        self.emit_text(encoded)?;
        Ok(self)
    }

    /// `session.print_fmt(format_args!("Table {}", n))`
    pub fn print_fmt(&mut self, args: fmt::Arguments<'_>) -> PrintResult<&mut Self> {
        match args.as_str() {
            Some(s) => self.print(s),
            None => self.print(&args.to_string()),
        }
    }

    pub fn println_fmt(&mut self, args: fmt::Arguments<'_>) -> PrintResult<&mut Self> {
        match args.as_str() {
            Some(s) => self.println(s),
            None => self.println(&args.to_string()),
        }
    }

    /// Left text flush left, right text flush right, on one line.
    ///
    /// When both do not fit they are separated by a single space and the
    /// printer wraps.
    pub fn print_columns(&mut self, left: &str, right: &str) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        let width = self.line_width();
        let right_width = self.transcoder.width(right);
        let line = if self.transcoder.width(left) + right_width >= width {
            format!("{left} {right}")
        } else {
            format!("{}{right}", self.transcoder.pad(left, width - right_width, false))
        };
        self.println(&line)
    }

    /// A full line of `ch`
    pub fn separator(&mut self, ch: char) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        let cell = self.transcoder.width(ch.encode_utf8(&mut [0; 4])).max(1);
        let line: String = std::iter::repeat_n(ch, self.line_width() / cell).collect();
        self.println(&line)
    }

    /// `ESC d n`
    pub fn feed(&mut self, lines: u8) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        self.emit(escpos::feed(lines).into_bytes())?;
        Ok(self)
    }

    // ========================================================================
    // Style (applied lazily before the next content)
    // ========================================================================

    /// Replace the whole print mode. Clears any `set_text_size` override.
    pub fn select_print_mode(&mut self, mode: PrintMode) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        self.requested.mode = mode;
        self.requested.size = None;
        Ok(self)
    }

    pub fn set_justification(&mut self, justification: Justification) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        self.requested.justification = justification;
        Ok(self)
    }

    pub fn set_emphasis(&mut self, on: bool) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        self.requested.mode.set(PrintMode::EMPHASIZED, on);
        Ok(self)
    }

    pub fn set_underline(&mut self, on: bool) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        self.requested.mode.set(PrintMode::UNDERLINE, on);
        Ok(self)
    }

    pub fn set_font(&mut self, font: Font) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        self.requested.mode.set(PrintMode::FONT_B, font == Font::B);
        Ok(self)
    }

    /// Character magnification, 1..=8 each way
    pub fn set_text_size(&mut self, width: u8, height: u8) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        self.requested.size = Some(TextSize::new(width, height)?);
        Ok(self)
    }

    /// `GS H n`, sent immediately
    pub fn set_barcode_text_position(&mut self, position: HriPosition) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        self.emit(barcode::set_barcode_text_position(position).into_bytes())?;
        Ok(self)
    }

    // ========================================================================
    // Codes and images
    // ========================================================================

    pub fn barcode(
        &mut self,
        content: &str,
        symbology: BarcodeSymbology,
    ) -> PrintResult<&mut Self> {
        let height = DEFAULT_BARCODE_HEIGHT.min(self.profile.max_barcode_height);
        self.barcode_with_height(content, symbology, height)
    }

    pub fn barcode_with_height(
        &mut self,
        content: &str,
        symbology: BarcodeSymbology,
        height: u8,
    ) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        let cmd = barcode::barcode(&self.profile, content.as_bytes(), symbology, height)?;
        self.emit_content(cmd.into_bytes())?;
        Ok(self)
    }

    pub fn pdf417(
        &mut self,
        content: impl AsRef<[u8]>,
        options: &Pdf417Options,
    ) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        let cmds = code2d::pdf417(&self.profile, content.as_ref(), options)?;
        self.emit_content(concat(cmds))?;
        Ok(self)
    }

    pub fn qr_code(
        &mut self,
        content: impl AsRef<[u8]>,
        options: &QrOptions,
    ) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        let cmds = code2d::qr_code(&self.profile, content.as_ref(), options)?;
        self.emit_content(concat(cmds))?;
        Ok(self)
    }

    pub fn image<S>(&mut self, src: &S, scale: ImageScale) -> PrintResult<&mut Self>
    where
        S: RasterSource + ?Sized,
    {
        self.ensure_open()?;
        let cmds = graphics::image(&self.profile, src, scale)?;
        self.emit_content(concat(cmds))?;
        Ok(self)
    }

    /// Load, fit to the printable width and print an image file
    #[cfg(feature = "image")]
    pub fn image_file(
        &mut self,
        path: impl AsRef<std::path::Path>,
        scale: ImageScale,
    ) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        let max_width = self.profile.max_image_width >> u8::from(scale.double_width());
        let bitmap = crate::raster::Bitmap::open(path, Some(max_width))?;
        self.image(&bitmap, scale)
    }

    // ========================================================================
    // Paper and drawer
    // ========================================================================

    /// Cut now, feeding `cut_feed_lines` first
    pub fn cut(&mut self, mode: CutMode) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        let cmd = escpos::cut(&self.profile, mode, self.options.cut_feed_lines)?;
        self.emit(cmd.into_bytes())?;
        Ok(self)
    }

    /// Kick the cash drawer now
    pub fn pulse(&mut self, config: &PulseConfig) -> PrintResult<&mut Self> {
        self.ensure_open()?;
        let cmd = escpos::pulse(&self.profile, config)?;
        self.emit(cmd.into_bytes())?;
        Ok(self)
    }

    // ========================================================================
    // Termination
    // ========================================================================

    /// Write the trailer, release the connector and return every byte sent.
    ///
    /// The trailer is: `FS .` if double-byte mode was entered, the trailing
    /// feed, the cut when `auto_cut` is set, the drawer pulse when configured.
    /// If the cut or pulse fails the session is still closed and the error is
    /// returned; bytes already sent stay sent.
    #[instrument(skip(self), fields(profile = %self.profile.name))]
    pub fn end(&mut self) -> PrintResult<Vec<u8>> {
        self.ensure_open()?;
        let trailer = self.write_trailer();
        let released = self.release();
        if let Err(e) = &trailer {
            warn!(error = %e, "session trailer failed");
        }
        trailer?;
        released?;
        info!(bytes = self.output.len(), "printer session ended");
        Ok(std::mem::take(&mut self.output))
    }

    /// Release the connector without writing a trailer
    pub fn close(&mut self) -> PrintResult<()> {
        self.ensure_open()?;
        debug!(bytes = self.output.len(), "printer session closed without trailer");
        self.release()
    }

    fn write_trailer(&mut self) -> PrintResult<()> {
        if self.double_byte {
            self.emit(escpos::cancel_double_byte().into_bytes())?;
            self.double_byte = false;
        }
        if self.options.trailing_feed > 0 {
            self.emit(escpos::feed(self.options.trailing_feed).into_bytes())?;
        }
        if self.options.auto_cut {
            let cmd = escpos::cut(
                &self.profile,
                self.options.cut_mode,
                self.options.cut_feed_lines,
            )?;
            self.emit(cmd.into_bytes())?;
        }
        if let Some(pulse) = self.options.pulse {
            let cmd = escpos::pulse(&self.profile, &pulse)?;
            self.emit(cmd.into_bytes())?;
        }
        Ok(())
    }

    /// Flush and close the connector, then mark the session closed
    fn release(&mut self) -> PrintResult<()> {
        self.state = State::Closed;
        if let Some(mut connector) = self.connector.take() {
            let flushed = connector.flush();
            let closed = connector.close();
            flushed?;
            closed?;
            debug!("connector released");
        }
        Ok(())
    }

    // ========================================================================
    // Emission
    // ========================================================================

    fn ensure_open(&self) -> PrintResult<()> {
        match self.state {
            State::Open => Ok(()),
            State::Closed => Err(PrintError::SessionClosed),
        }
    }

    /// Send bytes to the connector, then record them
    fn emit(&mut self, bytes: Vec<u8>) -> PrintResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if let Some(connector) = self.connector.as_mut() {
            connector.write(&bytes)?;
        }
        self.output.extend_from_slice(&bytes);
        Ok(())
    }

    /// Style commands needed before the next content, and the printer style
    /// once they are applied
    fn style_prelude(&self) -> PrintResult<(Vec<u8>, PrinterStyle)> {
        let mut bytes = Vec::new();
        let mut printer = self.printer;

        if self.requested.justification != printer.justification {
            let cmd = escpos::set_justification(self.requested.justification);
            bytes.extend_from_slice(cmd.as_bytes());
            printer.justification = self.requested.justification;
        }
        if self.requested.mode != printer.mode {
            bytes.extend_from_slice(escpos::select_print_mode(self.requested.mode).as_bytes());
            printer.mode = self.requested.mode;
            // ESC ! also sets the character size
            printer.size = self.requested.mode.character_size();
        }
        let size = self.requested.text_size();
        if size != printer.size {
            bytes.extend_from_slice(escpos::set_text_size(size)?.as_bytes());
            printer.size = size;
        }
        Ok((bytes, printer))
    }

    fn emit_content(&mut self, content: Vec<u8>) -> PrintResult<()> {
        let (mut bytes, printer) = self.style_prelude()?;
        bytes.extend_from_slice(&content);
        self.emit(bytes)?;
        self.printer = printer;
        Ok(())
    }

    fn emit_text(&mut self, encoded: Vec<u8>) -> PrintResult<()> {
        if encoded.is_empty() {
            return Ok(());
        }
        let (mut bytes, printer) = self.style_prelude()?;
        let page = self.transcoder.code_page();
        let select_page = !self.code_page_selected && !encoded.is_ascii();
        if select_page {
            bytes.extend_from_slice(escpos::select_code_page(page).as_bytes());
        }
        bytes.extend_from_slice(&encoded);
        self.emit(bytes)?;

        self.printer = printer;
        if select_page {
            self.code_page_selected = true;
            self.double_byte = page.charset.is_double_byte();
        }
        Ok(())
    }
}

impl Drop for PrinterSession {
    fn drop(&mut self) {
        if self.connector.is_some() {
            warn!(profile = %self.profile.name, "session dropped while open, releasing connector");
            if let Err(e) = self.release() {
                warn!(error = %e, "failed to release connector");
            }
        }
    }
}

fn concat(cmds: Vec<escpos::EncodedCommand>) -> Vec<u8> {
    cmds.into_iter().flat_map(escpos::EncodedCommand::into_bytes).collect()
}

/// Run `f` on a fresh session, then end it.
///
/// The connector is released whether `f` succeeds or not. `f` must not call
/// [`PrinterSession::end`] itself.
pub fn with_session<F>(
    profile: Arc<CapabilityProfile>,
    options: SessionOptions,
    spec: ConnectorSpec,
    f: F,
) -> PrintResult<Vec<u8>>
where
    F: FnOnce(&mut PrinterSession) -> PrintResult<()>,
{
    let mut session = PrinterSession::open(profile, options, spec)?;
    match f(&mut session) {
        Ok(()) => session.end(),
        Err(e) => {
            if !session.is_closed()
                && let Err(close_err) = session.close()
            {
                warn!(error = %close_err, "failed to close session after error");
            }
            Err(e)
        }
    }
}
