//! 2D symbol commands (`GS ( k`): PDF417 and QR code
//!
//! Both symbologies follow the same sequence: configure the symbol, store the
//! data in the printer's symbol buffer (function 080), then print it
//! (function 081). Every frame carries a 16-bit length, so one store command
//! holds at most [`MAX_2D_PAYLOAD`] bytes.
//!
//! PDF417 payloads larger than one symbol are split into several store/print
//! pairs. QR payloads are never split.

use serde::{Deserialize, Serialize};

use super::{EncodedCommand, GS, low_high};
use crate::error::{PrintError, PrintResult};
use crate::profile::{CapabilityProfile, Feature};

/// Largest `pL pH` value
const MAX_FRAME: usize = 0xFFFF;

/// Data bytes that fit in one store frame (length also counts `cn fn m`)
pub const MAX_2D_PAYLOAD: usize = MAX_FRAME - 3;

const CN_PDF417: u8 = 48;
const CN_QR: u8 = 49;

/// `GS ( k pL pH cn fn params...`
fn frame(cn: u8, function: u8, params: &[u8]) -> PrintResult<EncodedCommand> {
    let len = params.len() + 2;
    if len > MAX_FRAME {
        return Err(PrintError::PayloadTooLarge {
            len: params.len(),
            max: MAX_FRAME - 2,
        });
    }
    let mut buf = Vec::with_capacity(len + 5);
    buf.extend_from_slice(&[GS, b'(', b'k']);
    buf.extend_from_slice(&low_high(len));
    buf.extend_from_slice(&[cn, function]);
    buf.extend_from_slice(params);
    Ok(EncodedCommand::new(buf))
}

/// Store (function 080) then print (function 081) one symbol's data
fn store_and_print(cn: u8, data: &[u8]) -> PrintResult<[EncodedCommand; 2]> {
    let mut params = Vec::with_capacity(data.len() + 1);
    params.push(b'0');
    params.extend_from_slice(data);
    Ok([frame(cn, 80, &params)?, frame(cn, 81, b"0")?])
}

// ============================================================================
// PDF417
// ============================================================================

/// PDF417 symbol shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pdf417Mode {
    #[default]
    Standard = 0,
    /// Omits the right row indicator and stop pattern
    Truncated = 1,
}

/// PDF417 layout parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pdf417Options {
    /// Module width in dots, 2..=8
    pub width: u8,
    /// Row height as a multiple of the module width, 2..=8
    pub height_multiplier: u8,
    /// Data columns, 0 (automatic) to 30
    pub data_column_count: u8,
    /// Error-correction ratio, 0.01 to 4.00 (1% to 400%)
    pub error_correction: f32,
    pub mode: Pdf417Mode,
}

impl Default for Pdf417Options {
    fn default() -> Self {
        Self {
            width: 3,
            height_multiplier: 3,
            data_column_count: 0,
            error_correction: 0.10,
            mode: Pdf417Mode::Standard,
        }
    }
}

impl Pdf417Options {
    pub fn validate(&self) -> PrintResult<()> {
        let invalid = |msg: String| Err(PrintError::InvalidArgument(msg));
        if !(2..=8).contains(&self.width) {
            return invalid(format!("PDF417 width must be 2..=8, got {}", self.width));
        }
        if !(2..=8).contains(&self.height_multiplier) {
            return invalid(format!(
                "PDF417 height multiplier must be 2..=8, got {}",
                self.height_multiplier
            ));
        }
        if self.data_column_count > 30 {
            return invalid(format!(
                "PDF417 data column count must be 0..=30, got {}",
                self.data_column_count
            ));
        }
        if !(0.01..=4.0).contains(&self.error_correction) {
            return invalid(format!(
                "PDF417 error correction must be 0.01..=4.00, got {}",
                self.error_correction
            ));
        }
        Ok(())
    }

    /// Ratio encoded in tenths, rounded up (0.15 → 2, i.e. 20%)
    fn error_correction_tenths(&self) -> u8 {
        let hundredths = (f64::from(self.error_correction) * 100.0).round() as u32;
        hundredths.div_ceil(10).clamp(1, 40) as u8
    }
}

/// Encode a PDF417 symbol, split over several symbols if needed.
///
/// The settings are sent once; each chunk of at most
/// `min(profile.pdf417_capacity, MAX_2D_PAYLOAD)` bytes then gets a store
/// and a print command.
pub fn pdf417(
    profile: &CapabilityProfile,
    content: &[u8],
    options: &Pdf417Options,
) -> PrintResult<Vec<EncodedCommand>> {
    profile.require(Feature::Pdf417)?;
    options.validate()?;
    if content.is_empty() {
        return Err(PrintError::InvalidBarcodeContent(
            "PDF417 content must not be empty".to_string(),
        ));
    }

    let chunk_size = profile.pdf417_capacity.min(MAX_2D_PAYLOAD);
    if chunk_size == 0 {
        return Err(PrintError::PayloadTooLarge {
            len: content.len(),
            max: 0,
        });
    }

    let chunks = content.chunks(chunk_size);
    let mut commands = Vec::with_capacity(5 + 2 * chunks.len());
    commands.push(frame(CN_PDF417, 70, &[options.mode as u8])?);
    commands.push(frame(CN_PDF417, 65, &[options.data_column_count])?);
    commands.push(frame(CN_PDF417, 67, &[options.width])?);
    commands.push(frame(CN_PDF417, 68, &[options.height_multiplier])?);
    commands.push(frame(
        CN_PDF417,
        69,
        &[b'1', options.error_correction_tenths()],
    )?);
    for chunk in chunks {
        commands.extend(store_and_print(CN_PDF417, chunk)?);
    }
    Ok(commands)
}

// ============================================================================
// QR code
// ============================================================================

/// QR symbol model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QrModel {
    Model1 = 49,
    #[default]
    Model2 = 50,
    Micro = 51,
}

/// QR error-correction level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QrErrorLevel {
    /// ~7% recovery
    #[default]
    L = 48,
    /// ~15% recovery
    M = 49,
    /// ~25% recovery
    Q = 50,
    /// ~30% recovery
    H = 51,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QrOptions {
    /// Module size in dots, 1..=16
    pub size: u8,
    pub error_level: QrErrorLevel,
    pub model: QrModel,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self {
            size: 3,
            error_level: QrErrorLevel::L,
            model: QrModel::Model2,
        }
    }
}

/// Encode a QR code
pub fn qr_code(
    profile: &CapabilityProfile,
    content: &[u8],
    options: &QrOptions,
) -> PrintResult<Vec<EncodedCommand>> {
    profile.require(Feature::QrCode)?;
    if !(1..=16).contains(&options.size) {
        return Err(PrintError::InvalidArgument(format!(
            "QR module size must be 1..=16, got {}",
            options.size
        )));
    }
    if content.is_empty() {
        return Err(PrintError::InvalidBarcodeContent(
            "QR content must not be empty".to_string(),
        ));
    }
    if content.len() > MAX_2D_PAYLOAD {
        return Err(PrintError::PayloadTooLarge {
            len: content.len(),
            max: MAX_2D_PAYLOAD,
        });
    }

    let mut commands = vec![
        // Function 165: model
        frame(CN_QR, 65, &[options.model as u8, 0])?,
        // Function 167: module size
        frame(CN_QR, 67, &[options.size])?,
        // Function 169: error correction
        frame(CN_QR, 69, &[options.error_level as u8])?,
    ];
    commands.extend(store_and_print(CN_QR, content)?);
    Ok(commands)
}
