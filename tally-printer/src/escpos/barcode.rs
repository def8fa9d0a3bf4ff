//! 1D barcode commands
//!
//! | Symbology | Function B code | Function A code | Content rule |
//! |-----------|-----------------|-----------------|--------------|
//! | UPC-A     | 65 | 0 | 11–12 digits |
//! | UPC-E     | 66 | 1 | 6–8 or 11–12 digits |
//! | JAN13     | 67 | 2 | 12–13 digits |
//! | JAN8      | 68 | 3 | 7–8 digits |
//! | CODE39    | 69 | 4 | `0-9 A-Z space - . $ / + % *` |
//! | ITF       | 70 | 5 | even number of digits |
//! | CODABAR   | 71 | 6 | `A-D` start/stop around `0-9 $ % + - . / :` |
//! | CODE93    | 72 | -  | 7-bit ASCII |
//! | CODE128   | 73 | -  | `{A`, `{B` or `{C` then 7-bit ASCII |
//!
//! Function B (`GS k m n d1..dn`) is used whenever the profile supports it;
//! function A (`GS k m d1..dk NUL`) is the fallback for older printers.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{EncodedCommand, GS, NUL};
use crate::error::{PrintError, PrintResult};
use crate::profile::{CapabilityProfile, Feature};

/// Longest payload a function B barcode can carry (`n` is one byte)
pub const MAX_BARCODE_LEN: usize = 255;

/// Barcode standard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeSymbology {
    UpcA,
    UpcE,
    Jan13,
    Jan8,
    Code39,
    Itf,
    Codabar,
    Code93,
    Code128,
}

impl BarcodeSymbology {
    fn function_b(self) -> u8 {
        match self {
            BarcodeSymbology::UpcA => 65,
            BarcodeSymbology::UpcE => 66,
            BarcodeSymbology::Jan13 => 67,
            BarcodeSymbology::Jan8 => 68,
            BarcodeSymbology::Code39 => 69,
            BarcodeSymbology::Itf => 70,
            BarcodeSymbology::Codabar => 71,
            BarcodeSymbology::Code93 => 72,
            BarcodeSymbology::Code128 => 73,
        }
    }

    fn function_a(self) -> Option<u8> {
        match self {
            BarcodeSymbology::UpcA => Some(0),
            BarcodeSymbology::UpcE => Some(1),
            BarcodeSymbology::Jan13 => Some(2),
            BarcodeSymbology::Jan8 => Some(3),
            BarcodeSymbology::Code39 => Some(4),
            BarcodeSymbology::Itf => Some(5),
            BarcodeSymbology::Codabar => Some(6),
            BarcodeSymbology::Code93 | BarcodeSymbology::Code128 => None,
        }
    }

    /// Check `content` against the symbology's character set and length
    pub fn validate(self, content: &[u8]) -> PrintResult<()> {
        let len = content.len();
        let digits = content.iter().all(u8::is_ascii_digit);
        let valid = len > 0
            && match self {
                BarcodeSymbology::UpcA => digits && (11..=12).contains(&len),
                BarcodeSymbology::UpcE => digits && matches!(len, 6..=8 | 11..=12),
                BarcodeSymbology::Jan13 => digits && (12..=13).contains(&len),
                BarcodeSymbology::Jan8 => digits && (7..=8).contains(&len),
                BarcodeSymbology::Code39 => content.iter().all(|b| is_code39_char(*b)),
                BarcodeSymbology::Itf => digits && len % 2 == 0,
                BarcodeSymbology::Codabar => is_codabar(content),
                BarcodeSymbology::Code93 => content.is_ascii(),
                BarcodeSymbology::Code128 => {
                    len > 2
                        && content[0] == b'{'
                        && matches!(content[1], b'A' | b'B' | b'C')
                        && content.is_ascii()
                }
            };
        if !valid {
            return Err(PrintError::InvalidBarcodeContent(format!(
                "{:?} is not valid {self} data",
                String::from_utf8_lossy(content)
            )));
        }
        Ok(())
    }
}

impl fmt::Display for BarcodeSymbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BarcodeSymbology::UpcA => "UPC-A",
            BarcodeSymbology::UpcE => "UPC-E",
            BarcodeSymbology::Jan13 => "JAN13",
            BarcodeSymbology::Jan8 => "JAN8",
            BarcodeSymbology::Code39 => "CODE39",
            BarcodeSymbology::Itf => "ITF",
            BarcodeSymbology::Codabar => "CODABAR",
            BarcodeSymbology::Code93 => "CODE93",
            BarcodeSymbology::Code128 => "CODE128",
        };
        f.write_str(name)
    }
}

fn is_code39_char(b: u8) -> bool {
    b.is_ascii_digit() || b.is_ascii_uppercase() || b" -.$/+%*".contains(&b)
}

fn is_codabar(content: &[u8]) -> bool {
    let is_guard = |b: &u8| matches!(b, b'A'..=b'D' | b'a'..=b'd');
    match content {
        [start, body @ .., stop] if !body.is_empty() => {
            is_guard(start)
                && is_guard(stop)
                && body
                    .iter()
                    .all(|b| b.is_ascii_digit() || b"$%+-./:".contains(b))
        }
        _ => false,
    }
}

/// Where the human readable text goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HriPosition {
    #[default]
    None = 0,
    Above = 1,
    Below = 2,
    Both = 3,
}

/// `GS H n`
pub fn set_barcode_text_position(position: HriPosition) -> EncodedCommand {
    EncodedCommand::new(vec![GS, b'H', position as u8])
}

/// `GS h n` followed by `GS k`
///
/// Content and height are validated before anything is encoded.
pub fn barcode(
    profile: &CapabilityProfile,
    content: &[u8],
    symbology: BarcodeSymbology,
    height: u8,
) -> PrintResult<EncodedCommand> {
    if !profile.supports(Feature::BarcodeA) && !profile.supports(Feature::BarcodeB) {
        return Err(PrintError::unsupported(Feature::BarcodeB, &profile.name));
    }
    if height == 0 || height > profile.max_barcode_height {
        return Err(PrintError::InvalidArgument(format!(
            "barcode height must be 1..={}, got {height}",
            profile.max_barcode_height
        )));
    }
    symbology.validate(content)?;

    let mut buf = Vec::with_capacity(content.len() + 8);
    buf.extend_from_slice(&[GS, b'h', height]);

    if profile.supports(Feature::BarcodeB) {
        if content.len() > MAX_BARCODE_LEN {
            return Err(PrintError::InvalidBarcodeContent(format!(
                "{symbology} content is {} bytes, max {MAX_BARCODE_LEN}",
                content.len()
            )));
        }
        buf.extend_from_slice(&[GS, b'k', symbology.function_b(), content.len() as u8]);
        buf.extend_from_slice(content);
    } else if let Some(m) = symbology.function_a()
        && profile.supports(Feature::BarcodeA)
    {
        buf.extend_from_slice(&[GS, b'k', m]);
        buf.extend_from_slice(content);
        buf.push(NUL);
    } else {
        return Err(PrintError::unsupported(
            format!("{symbology} barcode"),
            &profile.name,
        ));
    }

    Ok(EncodedCommand::new(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> CapabilityProfile {
        CapabilityProfile::load(name).unwrap()
    }

    #[test]
    fn test_code39_function_b() {
        let p = profile("default");
        let cmd = barcode(&p, b"HELLO-123", BarcodeSymbology::Code39, 80).unwrap();
        let bytes = cmd.as_bytes();
        assert_eq!(&bytes[..3], &[0x1D, 0x68, 80]);
        assert_eq!(&bytes[3..7], &[0x1D, 0x6B, 69, 9]);
        assert_eq!(&bytes[7..], b"HELLO-123");
    }

    #[test]
    fn test_code39_payload_length_for_every_profile_with_barcodes() {
        let samples: [&[u8]; 4] = [b"0", b"ABC 123", b"*TALLY*", b"$/+%.-"];
        for name in CapabilityProfile::names() {
            let p = profile(name);
            if !p.supports(Feature::BarcodeA) && !p.supports(Feature::BarcodeB) {
                continue;
            }
            for content in samples {
                let cmd = barcode(&p, content, BarcodeSymbology::Code39, 48).unwrap();
                let bytes = cmd.as_bytes();
                let payload = if p.supports(Feature::BarcodeB) {
                    assert_eq!(bytes[5], 69);
                    assert_eq!(bytes[6] as usize, content.len());
                    &bytes[7..]
                } else {
                    assert_eq!(bytes[5], 4);
                    assert_eq!(*bytes.last().unwrap(), 0);
                    &bytes[6..bytes.len() - 1]
                };
                assert_eq!(payload, content);
            }
        }
    }

    #[test]
    fn test_empty_content_rejected() {
        let p = profile("default");
        let err = barcode(&p, b"", BarcodeSymbology::Code39, 48).unwrap_err();
        assert!(matches!(err, PrintError::InvalidBarcodeContent(_)));
    }

    #[test]
    fn test_code39_charset() {
        assert!(BarcodeSymbology::Code39.validate(b"ABC-12 $/+%.*").is_ok());
        assert!(BarcodeSymbology::Code39.validate(b"abc").is_err());
        assert!(BarcodeSymbology::Code39.validate(b"A_B").is_err());
    }

    #[test]
    fn test_symbology_rules() {
        use BarcodeSymbology::*;
        let cases: &[(BarcodeSymbology, &[u8], bool)] = &[
            (UpcA, b"01234567890", true),
            (UpcA, b"012345678901", true),
            (UpcA, b"0123456789", false),
            (UpcA, b"01234567890A", false),
            (UpcE, b"123456", true),
            (UpcE, b"123456789", false),
            (UpcE, b"01234567890", true),
            (Jan13, b"4901234567894", true),
            (Jan13, b"490123456789", true),
            (Jan13, b"49012345678", false),
            (Jan8, b"4901234", true),
            (Jan8, b"49012345", true),
            (Jan8, b"490123", false),
            (Itf, b"1234", true),
            (Itf, b"123", false),
            (Codabar, b"A40156B", true),
            (Codabar, b"a1-2:3d", true),
            (Codabar, b"A40156", false),
            (Codabar, b"AB", false),
            (Code93, b"any text 123", true),
            (Code93, "olé".as_bytes(), false),
            (Code128, b"{BTally-01", true),
            (Code128, b"{C1234", true),
            (Code128, b"Tally", false),
            (Code128, b"{B", false),
        ];
        for (symbology, content, ok) in cases {
            assert_eq!(
                symbology.validate(content).is_ok(),
                *ok,
                "{symbology} {:?}",
                String::from_utf8_lossy(content)
            );
        }
    }

    #[test]
    fn test_function_a_fallback() {
        let p = profile("ascii");
        let cmd = barcode(&p, b"12345678", BarcodeSymbology::Itf, 100).unwrap();
        assert_eq!(
            cmd.as_bytes(),
            &[0x1D, 0x68, 100, 0x1D, 0x6B, 5, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', 0]
        );

        let err = barcode(&p, b"{B12", BarcodeSymbology::Code128, 100).unwrap_err();
        assert!(matches!(err, PrintError::UnsupportedFeature { .. }));
    }

    #[test]
    fn test_no_barcode_support() {
        let p = profile("tm-u220");
        for height in [0, 50] {
            assert!(matches!(
                barcode(&p, b"123", BarcodeSymbology::Code39, height),
                Err(PrintError::UnsupportedFeature { .. })
            ));
        }
    }

    #[test]
    fn test_height_limits() {
        let p = profile("ascii");
        assert!(matches!(
            barcode(&p, b"123", BarcodeSymbology::Code39, 0),
            Err(PrintError::InvalidArgument(_))
        ));
        assert!(matches!(
            barcode(&p, b"123", BarcodeSymbology::Code39, 200),
            Err(PrintError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_content_too_long_for_function_b() {
        let p = profile("default");
        let content = vec![b'1'; 256];
        assert!(matches!(
            barcode(&p, &content, BarcodeSymbology::Code93, 50),
            Err(PrintError::InvalidBarcodeContent(_))
        ));
    }

    #[test]
    fn test_hri_position() {
        assert_eq!(
            set_barcode_text_position(HriPosition::Below).as_bytes(),
            &[0x1D, 0x48, 2]
        );
    }
}
