//! ESC/POS command encoder
//!
//! Pure functions turning printing intents into byte sequences. Nothing here
//! holds state: every function depends only on its arguments, so encoders can
//! be unit tested without a printer and called from any thread.
//!
//! Each function returns a complete instruction. Functions that need a
//! capability check take the [`CapabilityProfile`] and fail with
//! `UnsupportedFeature` before producing anything.

pub mod barcode;
pub mod code2d;
pub mod graphics;

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::error::{PrintError, PrintResult};
use crate::profile::{CapabilityProfile, CodePage, Feature};

pub const ESC: u8 = 0x1B;
pub const GS: u8 = 0x1D;
pub const FS: u8 = 0x1C;
pub const LF: u8 = 0x0A;
pub const NUL: u8 = 0x00;

/// One complete ESC/POS instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCommand(Vec<u8>);

impl EncodedCommand {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for EncodedCommand {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// `ESC !` print mode bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PrintMode(u8);

impl PrintMode {
    /// Font A, no emphasis, normal size
    pub const NORMAL: PrintMode = PrintMode(0x00);
    pub const FONT_B: PrintMode = PrintMode(0x01);
    pub const EMPHASIZED: PrintMode = PrintMode(0x08);
    pub const DOUBLE_HEIGHT: PrintMode = PrintMode(0x10);
    pub const DOUBLE_WIDTH: PrintMode = PrintMode(0x20);
    pub const UNDERLINE: PrintMode = PrintMode(0x80);

    const ALL: u8 = 0x01 | 0x08 | 0x10 | 0x20 | 0x80;

    /// Build from raw `ESC !` bits; undefined bits are dropped
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: PrintMode) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: PrintMode) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: PrintMode) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: PrintMode, on: bool) {
        if on {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }

    /// Character size implied by the double-width/height bits
    pub fn character_size(self) -> TextSize {
        TextSize {
            width: if self.contains(Self::DOUBLE_WIDTH) { 2 } else { 1 },
            height: if self.contains(Self::DOUBLE_HEIGHT) { 2 } else { 1 },
        }
    }
}

impl BitOr for PrintMode {
    type Output = PrintMode;

    fn bitor(self, rhs: PrintMode) -> PrintMode {
        PrintMode(self.0 | rhs.0)
    }
}

/// Character font
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Font {
    #[default]
    A,
    B,
}

/// Character magnification, 1..=8 in each direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSize {
    pub width: u8,
    pub height: u8,
}

impl TextSize {
    pub const NORMAL: TextSize = TextSize { width: 1, height: 1 };

    pub fn new(width: u8, height: u8) -> PrintResult<Self> {
        if !(1..=8).contains(&width) || !(1..=8).contains(&height) {
            return Err(PrintError::InvalidArgument(format!(
                "text size must be 1..=8 in each direction, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }
}

impl Default for TextSize {
    fn default() -> Self {
        Self::NORMAL
    }
}

/// Line justification (`ESC a`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Justification {
    #[default]
    Left = 0,
    Center = 1,
    Right = 2,
}

/// Paper cut style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutMode {
    #[default]
    Full,
    /// Leave a small connection
    Partial,
}

/// Cash drawer connector pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawerPin {
    #[default]
    Pin2,
    Pin5,
}

/// Longest pulse phase `ESC p` can express (255 units of 2 ms)
pub const MAX_PULSE_MS: u16 = 510;

/// Cash drawer kick timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub pin: DrawerPin,
    pub on_ms: u16,
    pub off_ms: u16,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            pin: DrawerPin::Pin2,
            on_ms: 120,
            off_ms: 240,
        }
    }
}

impl PulseConfig {
    pub fn validate(&self) -> PrintResult<()> {
        if self.on_ms > MAX_PULSE_MS || self.off_ms > MAX_PULSE_MS {
            return Err(PrintError::InvalidArgument(format!(
                "pulse timings must be at most {MAX_PULSE_MS} ms, got on={} off={}",
                self.on_ms, self.off_ms
            )));
        }
        Ok(())
    }
}

// === Printer control ===

/// `ESC @` - reset the printer to its power-on state
pub fn initialize() -> EncodedCommand {
    EncodedCommand(vec![ESC, b'@'])
}

/// Raw text bytes, already transcoded for the active code page
pub fn text(bytes: &[u8]) -> EncodedCommand {
    EncodedCommand(bytes.to_vec())
}

/// `ESC d n` - print the buffer and feed `lines` lines
pub fn feed(lines: u8) -> EncodedCommand {
    EncodedCommand(vec![ESC, b'd', lines])
}

/// `ESC 3 n` sets line spacing in dots; `None` restores the default (`ESC 2`)
pub fn set_line_spacing(dots: Option<u8>) -> EncodedCommand {
    match dots {
        Some(n) => EncodedCommand(vec![ESC, b'3', n]),
        None => EncodedCommand(vec![ESC, b'2']),
    }
}

// === Text style ===

/// `ESC ! n`
pub fn select_print_mode(mode: PrintMode) -> EncodedCommand {
    EncodedCommand(vec![ESC, b'!', mode.bits()])
}

/// `ESC a n`
pub fn set_justification(justification: Justification) -> EncodedCommand {
    EncodedCommand(vec![ESC, b'a', justification as u8])
}

/// `GS ! n` - character magnification
pub fn set_text_size(size: TextSize) -> PrintResult<EncodedCommand> {
    let size = TextSize::new(size.width, size.height)?;
    let n = ((size.width - 1) << 4) | (size.height - 1);
    Ok(EncodedCommand(vec![GS, b'!', n]))
}

/// Switch the character table.
///
/// Single-byte pages use `ESC t n`; GBK enables Chinese mode (`FS &`) and
/// selects the GBK table (`FS C 1`).
pub fn select_code_page(page: CodePage) -> EncodedCommand {
    if page.charset.is_double_byte() {
        EncodedCommand(vec![FS, b'&', FS, b'C', 0x01])
    } else {
        EncodedCommand(vec![ESC, b't', page.id])
    }
}

/// `FS .` - leave double-byte (Chinese) mode
pub fn cancel_double_byte() -> EncodedCommand {
    EncodedCommand(vec![FS, b'.'])
}

// === Paper control ===

/// `GS V m n` - feed `lines` then cut
pub fn cut(profile: &CapabilityProfile, mode: CutMode, lines: u8) -> PrintResult<EncodedCommand> {
    let m = match mode {
        CutMode::Full => {
            profile.require(Feature::PaperFullCut)?;
            0x41
        }
        CutMode::Partial => {
            profile.require(Feature::PaperPartialCut)?;
            0x42
        }
    };
    Ok(EncodedCommand(vec![GS, b'V', m, lines]))
}

// === Cash drawer ===

/// `ESC p m t1 t2` - pulse the drawer pin, timings in units of 2 ms
pub fn pulse(profile: &CapabilityProfile, config: &PulseConfig) -> PrintResult<EncodedCommand> {
    profile.require(Feature::PulseStandard)?;
    config.validate()?;
    let m = match config.pin {
        DrawerPin::Pin2 => 0,
        DrawerPin::Pin5 => 1,
    };
    Ok(EncodedCommand(vec![
        ESC,
        b'p',
        m,
        (config.on_ms / 2) as u8,
        (config.off_ms / 2) as u8,
    ]))
}

/// Split a length into little-endian `nL nH`
pub(crate) fn low_high(n: usize) -> [u8; 2] {
    [(n & 0xFF) as u8, ((n >> 8) & 0xFF) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> CapabilityProfile {
        CapabilityProfile::load(name).unwrap()
    }

    #[test]
    fn test_basic_commands() {
        assert_eq!(initialize().as_bytes(), &[0x1B, 0x40]);
        assert_eq!(feed(3).as_bytes(), &[0x1B, 0x64, 0x03]);
        assert_eq!(set_justification(Justification::Center).as_bytes(), &[0x1B, 0x61, 0x01]);
        assert_eq!(set_justification(Justification::Right).as_bytes(), &[0x1B, 0x61, 0x02]);
        assert_eq!(set_line_spacing(Some(24)).as_bytes(), &[0x1B, 0x33, 24]);
        assert_eq!(set_line_spacing(None).as_bytes(), &[0x1B, 0x32]);
        assert_eq!(text(b"hi").as_bytes(), b"hi");
    }

    #[test]
    fn test_print_mode_bits() {
        let mode = PrintMode::EMPHASIZED | PrintMode::DOUBLE_WIDTH | PrintMode::UNDERLINE;
        assert_eq!(select_print_mode(mode).as_bytes(), &[0x1B, 0x21, 0xA8]);
        assert_eq!(mode.character_size(), TextSize { width: 2, height: 1 });

        let mut mode = PrintMode::NORMAL;
        mode.set(PrintMode::FONT_B, true);
        assert!(mode.contains(PrintMode::FONT_B));
        mode.set(PrintMode::FONT_B, false);
        assert_eq!(mode, PrintMode::default());
        assert_eq!(PrintMode::from_bits(0xFF).bits(), 0xB9);
    }

    #[test]
    fn test_text_size() {
        let cmd = set_text_size(TextSize::new(2, 2).unwrap()).unwrap();
        assert_eq!(cmd.as_bytes(), &[0x1D, 0x21, 0x11]);
        let cmd = set_text_size(TextSize::new(1, 3).unwrap()).unwrap();
        assert_eq!(cmd.as_bytes(), &[0x1D, 0x21, 0x02]);
        assert!(TextSize::new(0, 1).is_err());
        assert!(set_text_size(TextSize { width: 9, height: 1 }).is_err());
    }

    #[test]
    fn test_code_page_selection() {
        let cmd = select_code_page(CodePage::new(16, crate::encoding::Charset::Windows1252));
        assert_eq!(cmd.as_bytes(), &[0x1B, 0x74, 16]);
        let cmd = select_code_page(CodePage::new(255, crate::encoding::Charset::Gbk));
        assert_eq!(cmd.as_bytes(), &[0x1C, 0x26, 0x1C, 0x43, 0x01]);
        assert_eq!(cancel_double_byte().as_bytes(), &[0x1C, 0x2E]);
    }

    #[test]
    fn test_cut() {
        let p = profile("default");
        assert_eq!(cut(&p, CutMode::Full, 3).unwrap().as_bytes(), &[0x1D, 0x56, 0x41, 3]);
        assert_eq!(cut(&p, CutMode::Partial, 0).unwrap().as_bytes(), &[0x1D, 0x56, 0x42, 0]);

        let simple = profile("simple");
        assert!(matches!(
            cut(&simple, CutMode::Partial, 3),
            Err(PrintError::UnsupportedFeature { .. })
        ));
        assert!(cut(&profile("zj-5870"), CutMode::Full, 3).is_err());
    }

    #[test]
    fn test_pulse() {
        let p = profile("default");
        let cmd = pulse(&p, &PulseConfig::default()).unwrap();
        assert_eq!(cmd.as_bytes(), &[0x1B, 0x70, 0x00, 60, 120]);

        let pin5 = PulseConfig {
            pin: DrawerPin::Pin5,
            on_ms: 50,
            off_ms: 500,
        };
        assert_eq!(pulse(&p, &pin5).unwrap().as_bytes(), &[0x1B, 0x70, 0x01, 25, 250]);

        let too_long = PulseConfig {
            on_ms: 600,
            ..PulseConfig::default()
        };
        assert!(matches!(pulse(&p, &too_long), Err(PrintError::InvalidArgument(_))));
    }

    #[test]
    fn test_pulse_unsupported() {
        let zj = profile("zj-5870");
        assert!(!zj.supports(Feature::PulseStandard));
        assert!(matches!(
            pulse(&zj, &PulseConfig::default()),
            Err(PrintError::UnsupportedFeature { .. })
        ));
    }

    #[test]
    fn test_low_high() {
        assert_eq!(low_high(0x1234), [0x34, 0x12]);
        assert_eq!(low_high(5), [5, 0]);
    }
}
