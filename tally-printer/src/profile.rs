//! Printer capability profiles
//!
//! A profile describes what a printer model understands: which code pages it
//! can select, which command families it implements and how large barcodes
//! and images may be. Profiles are immutable once loaded and are shared
//! read-only between a session and the command encoder.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::encoding::Charset;
use crate::error::{PrintError, PrintResult};

/// Command families a printer may implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// `GS k m d1..dk NUL` barcodes
    BarcodeA,
    /// `GS k m n d1..dn` barcodes
    BarcodeB,
    /// `ESC *` column-format bit images
    BitImageColumn,
    /// `GS v 0` raster bit images
    BitImageRaster,
    /// `GS ( L` graphics
    Graphics,
    /// `GS ( k` PDF417 symbols
    Pdf417,
    /// `GS ( k` QR codes
    QrCode,
    /// `ESC p` cash-drawer pulse
    PulseStandard,
    PaperFullCut,
    PaperPartialCut,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feature::BarcodeA => "barcode_a",
            Feature::BarcodeB => "barcode_b",
            Feature::BitImageColumn => "bit_image_column",
            Feature::BitImageRaster => "bit_image_raster",
            Feature::Graphics => "graphics",
            Feature::Pdf417 => "pdf417",
            Feature::QrCode => "qr_code",
            Feature::PulseStandard => "pulse_standard",
            Feature::PaperFullCut => "paper_full_cut",
            Feature::PaperPartialCut => "paper_partial_cut",
        };
        f.write_str(name)
    }
}

/// A selectable character table (`ESC t n`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodePage {
    /// Table number sent with `ESC t`
    pub id: u8,
    pub charset: Charset,
}

impl CodePage {
    pub const ASCII: CodePage = CodePage::new(0, Charset::Ascii);

    pub const fn new(id: u8, charset: Charset) -> Self {
        Self { id, charset }
    }
}

/// Static descriptor of one printer model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    pub name: String,
    pub vendor: String,
    /// Selectable code pages. The first entry is used for text.
    pub code_pages: Vec<CodePage>,
    pub features: BTreeSet<Feature>,
    /// Characters per line in font A
    pub columns: usize,
    pub max_barcode_height: u8,
    /// Printable width in dots
    pub max_image_width: u32,
    /// Tallest image accepted in one call, in dots
    pub max_image_height: u32,
    /// Bytes that fit in one PDF417 symbol
    pub pdf417_capacity: usize,
}

/// Names accepted by [`CapabilityProfile::load`]
const PROFILE_NAMES: &[&str] = &["default", "simple", "tm-u220", "zj-5870", "ascii"];

impl CapabilityProfile {
    /// Load a built-in profile by name (case-insensitive)
    pub fn load(name: &str) -> PrintResult<Self> {
        let profile = match name.trim().to_ascii_lowercase().as_str() {
            "default" => Self::generic(),
            "simple" => Self::simple(),
            "tm-u220" => Self::tm_u220(),
            "zj-5870" => Self::zj_5870(),
            "ascii" => Self::ascii(),
            _ => return Err(PrintError::ProfileNotFound(name.to_string())),
        };
        debug!(profile = %profile.name, "capability profile loaded");
        Ok(profile)
    }

    /// Names of the built-in profiles
    pub fn names() -> &'static [&'static str] {
        PROFILE_NAMES
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Fail with `UnsupportedFeature` unless the profile has `feature`
    pub fn require(&self, feature: Feature) -> PrintResult<()> {
        if self.supports(feature) {
            Ok(())
        } else {
            Err(PrintError::unsupported(feature, &self.name))
        }
    }

    /// The code page carrying `charset`, if the printer has one
    pub fn code_page(&self, charset: Charset) -> Option<&CodePage> {
        self.code_pages.iter().find(|cp| cp.charset == charset)
    }

    /// Code page used for text; plain ASCII when the profile lists none
    pub fn active_code_page(&self) -> CodePage {
        self.code_pages.first().copied().unwrap_or(CodePage::ASCII)
    }

    /// Epson-compatible 80 mm thermal printer with the full command set
    fn generic() -> Self {
        Self {
            name: "default".to_string(),
            vendor: "Generic".to_string(),
            code_pages: vec![
                CodePage::new(0, Charset::Cp437),
                CodePage::new(16, Charset::Windows1252),
                CodePage::new(17, Charset::Cp866),
                CodePage::new(39, Charset::Iso8859_2),
                CodePage::new(40, Charset::Iso8859_15),
                CodePage::new(45, Charset::Windows1250),
                CodePage::new(46, Charset::Windows1251),
            ],
            features: BTreeSet::from([
                Feature::BarcodeA,
                Feature::BarcodeB,
                Feature::BitImageColumn,
                Feature::BitImageRaster,
                Feature::Graphics,
                Feature::Pdf417,
                Feature::QrCode,
                Feature::PulseStandard,
                Feature::PaperFullCut,
                Feature::PaperPartialCut,
            ]),
            columns: 48,
            max_barcode_height: 255,
            max_image_width: 576,
            max_image_height: 2048,
            pdf417_capacity: 1850,
        }
    }

    /// Conservative subset that most ESC/POS clones accept
    fn simple() -> Self {
        Self {
            name: "simple".to_string(),
            vendor: "Generic".to_string(),
            code_pages: vec![CodePage::new(0, Charset::Cp437)],
            features: BTreeSet::from([
                Feature::BarcodeB,
                Feature::BitImageColumn,
                Feature::BitImageRaster,
                Feature::QrCode,
                Feature::PulseStandard,
                Feature::PaperFullCut,
            ]),
            columns: 42,
            max_barcode_height: 255,
            max_image_width: 512,
            max_image_height: 2048,
            pdf417_capacity: 0,
        }
    }

    /// Epson TM-U220 impact printer
    fn tm_u220() -> Self {
        Self {
            name: "tm-u220".to_string(),
            vendor: "Epson".to_string(),
            code_pages: vec![
                CodePage::new(0, Charset::Cp437),
                CodePage::new(16, Charset::Windows1252),
            ],
            features: BTreeSet::from([
                Feature::BitImageColumn,
                Feature::PulseStandard,
                Feature::PaperFullCut,
                Feature::PaperPartialCut,
            ]),
            columns: 33,
            max_barcode_height: 0,
            max_image_width: 200,
            max_image_height: 1024,
            pdf417_capacity: 0,
        }
    }

    /// Zjiang ZJ-5870 58 mm printer (GBK, no cutter, no drawer port)
    fn zj_5870() -> Self {
        Self {
            name: "zj-5870".to_string(),
            vendor: "Zjiang".to_string(),
            code_pages: vec![
                CodePage::new(255, Charset::Gbk),
                CodePage::new(0, Charset::Cp437),
            ],
            features: BTreeSet::from([
                Feature::BarcodeB,
                Feature::BitImageRaster,
                Feature::QrCode,
            ]),
            columns: 32,
            max_barcode_height: 255,
            max_image_width: 384,
            max_image_height: 2048,
            pdf417_capacity: 0,
        }
    }

    /// Line printers with no usable code page
    fn ascii() -> Self {
        Self {
            name: "ascii".to_string(),
            vendor: "Generic".to_string(),
            code_pages: vec![CodePage::ASCII],
            features: BTreeSet::from([
                Feature::BarcodeA,
                Feature::BitImageColumn,
                Feature::PaperFullCut,
            ]),
            columns: 40,
            max_barcode_height: 162,
            max_image_width: 384,
            max_image_height: 1024,
            pdf417_capacity: 0,
        }
    }
}
