//! JSON print jobs
//!
//! ```json
//! {
//!   "config": { "profile": "default", "auto_cut": true },
//!   "steps": [
//!     { "op": "justify", "align": "center" },
//!     { "op": "mode", "emphasized": true, "double_height": true },
//!     { "op": "line", "text": "CAFE" },
//!     { "op": "mode" },
//!     { "op": "columns", "left": "Espresso", "right": "2.20" },
//!     { "op": "barcode", "content": "A0042", "symbology": "code39" }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tally_printer::{
    BarcodeSymbology, Bitmap, CutMode, Font, HriPosition, ImageScale, Justification,
    Pdf417Options, PrintMode, PrinterSession, PulseConfig, QrOptions, SessionConfig,
};
use tracing::{debug, instrument};

/// A job file
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    /// Session settings; the environment is used when absent
    pub config: Option<SessionConfig>,
    pub steps: Vec<Step>,
}

impl Job {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading job file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing job file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// One print instruction
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Text {
        text: String,
    },
    Line {
        #[serde(default)]
        text: String,
    },
    Feed {
        #[serde(default = "one")]
        lines: u8,
    },
    /// Replaces the whole print mode; omitted flags are off
    Mode {
        #[serde(default)]
        emphasized: bool,
        #[serde(default)]
        underline: bool,
        #[serde(default)]
        double_width: bool,
        #[serde(default)]
        double_height: bool,
        #[serde(default)]
        font: Font,
    },
    Justify {
        align: Justification,
    },
    TextSize {
        width: u8,
        height: u8,
    },
    Barcode {
        content: String,
        symbology: BarcodeSymbology,
        height: Option<u8>,
        hri: Option<HriPosition>,
    },
    Pdf417 {
        content: String,
        #[serde(default)]
        options: Pdf417Options,
    },
    Qr {
        content: String,
        #[serde(default)]
        options: QrOptions,
    },
    /// From a file or an inline base64 payload
    Image {
        path: Option<PathBuf>,
        base64: Option<String>,
        #[serde(default)]
        double_width: bool,
        #[serde(default)]
        double_height: bool,
    },
    Columns {
        left: String,
        right: String,
    },
    Separator {
        #[serde(default = "dash")]
        ch: char,
    },
    Cut {
        #[serde(default)]
        mode: CutMode,
    },
    Pulse {
        #[serde(default)]
        config: PulseConfig,
    },
}

fn one() -> u8 {
    1
}

fn dash() -> char {
    '-'
}

/// Apply every step, then end the session and return its bytes
#[instrument(skip_all, fields(steps = steps.len()))]
pub fn run(steps: &[Step], mut session: PrinterSession) -> anyhow::Result<Vec<u8>> {
    for (index, step) in steps.iter().enumerate() {
        apply(&mut session, step).with_context(|| format!("step {} ({step:?})", index + 1))?;
    }
    Ok(session.end()?)
}

fn apply(session: &mut PrinterSession, step: &Step) -> anyhow::Result<()> {
    debug!(?step, "applying step");
    match step {
        Step::Text { text } => {
            session.print(text)?;
        }
        Step::Line { text } => {
            session.println(text)?;
        }
        Step::Feed { lines } => {
            session.feed(*lines)?;
        }
        Step::Mode {
            emphasized,
            underline,
            double_width,
            double_height,
            font,
        } => {
            let mut mode = PrintMode::NORMAL;
            mode.set(PrintMode::EMPHASIZED, *emphasized);
            mode.set(PrintMode::UNDERLINE, *underline);
            mode.set(PrintMode::DOUBLE_WIDTH, *double_width);
            mode.set(PrintMode::DOUBLE_HEIGHT, *double_height);
            mode.set(PrintMode::FONT_B, *font == Font::B);
            session.select_print_mode(mode)?;
        }
        Step::Justify { align } => {
            session.set_justification(*align)?;
        }
        Step::TextSize { width, height } => {
            session.set_text_size(*width, *height)?;
        }
        Step::Barcode {
            content,
            symbology,
            height,
            hri,
        } => {
            if let Some(position) = hri {
                session.set_barcode_text_position(*position)?;
            }
            match height {
                Some(h) => session.barcode_with_height(content, *symbology, *h)?,
                None => session.barcode(content, *symbology)?,
            };
        }
        Step::Pdf417 { content, options } => {
            session.pdf417(content, options)?;
        }
        Step::Qr { content, options } => {
            session.qr_code(content, options)?;
        }
        Step::Image {
            path,
            base64,
            double_width,
            double_height,
        } => {
            let scale = ImageScale::new(*double_width, *double_height);
            let max_width = session.profile().max_image_width >> u8::from(*double_width);
            let bitmap = match (path, base64) {
                (Some(path), None) => Bitmap::open(path, Some(max_width))?,
                (None, Some(data)) => {
                    let bytes = STANDARD
                        .decode(data.trim())
                        .context("decoding base64 image")?;
                    Bitmap::from_encoded(&bytes, Some(max_width))?
                }
                _ => bail!("image step needs exactly one of `path` or `base64`"),
            };
            session.image(&bitmap, scale)?;
        }
        Step::Columns { left, right } => {
            session.print_columns(left, right)?;
        }
        Step::Separator { ch } => {
            session.separator(*ch)?;
        }
        Step::Cut { mode } => {
            session.cut(*mode)?;
        }
        Step::Pulse { config } => {
            session.pulse(config)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tally_printer::{CapabilityProfile, SessionOptions};

    fn session(profile: &str) -> PrinterSession {
        let profile = Arc::new(CapabilityProfile::load(profile).unwrap());
        let options = SessionOptions {
            initialize: false,
            trailing_feed: 0,
            ..SessionOptions::default()
        };
        PrinterSession::buffered(profile, options).unwrap()
    }

    #[test]
    fn test_parse_and_run() {
        let job = Job::parse(
            r#"{
                "steps": [
                    { "op": "justify", "align": "center" },
                    { "op": "mode", "emphasized": true },
                    { "op": "line", "text": "Hi" },
                    { "op": "mode" },
                    { "op": "feed" },
                    { "op": "cut", "mode": "partial" }
                ]
            }"#,
        )
        .unwrap();
        assert!(job.config.is_none());
        let out = run(&job.steps, session("default")).unwrap();
        assert_eq!(
            out,
            vec![
                0x1B, 0x61, 0x01, 0x1B, 0x21, 0x08, b'H', b'i', 0x0A, 0x1B, 0x64, 0x01, 0x1D,
                0x56, 0x42, 0x03
            ]
        );
    }

    #[test]
    fn test_codes_and_layout() {
        let job = Job::parse(
            r#"{
                "config": { "profile": "simple" },
                "steps": [
                    { "op": "columns", "left": "Tea", "right": "1.80" },
                    { "op": "separator", "ch": "=" },
                    {
                        "op": "barcode", "content": "A0042", "symbology": "code39",
                        "height": 60, "hri": "below"
                    },
                    { "op": "qr", "content": "https://example.com", "options": { "size": 6 } }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(job.config.as_ref().map(|c| c.profile.as_str()), Some("simple"));
        let out = run(&job.steps, session("simple")).unwrap();
        assert!(out.starts_with(format!("Tea{}1.80\n", " ".repeat(35)).as_bytes()));
        assert!(out.windows(3).any(|w| w == [0x1D, 0x48, 0x02]));
        assert!(out.windows(3).any(|w| w == [0x1D, 0x68, 60]));
    }

    #[test]
    fn test_failing_step_names_its_index() {
        let job = Job::parse(
            r#"{ "steps": [
                { "op": "text", "text": "ok" },
                { "op": "pdf417", "content": "x" }
            ] }"#,
        )
        .unwrap();
        let err = run(&job.steps, session("simple")).unwrap_err();
        assert!(format!("{err:#}").contains("step 2"));
    }

    #[test]
    fn test_image_step_needs_one_source() {
        let job = Job::parse(r#"{ "steps": [ { "op": "image" } ] }"#).unwrap();
        assert!(run(&job.steps, session("default")).is_err());

        let job = Job::parse(r#"{ "steps": [ { "op": "image", "base64": "!!!" } ] }"#).unwrap();
        let err = run(&job.steps, session("default")).unwrap_err();
        assert!(format!("{err:#}").contains("base64"));
    }

    #[test]
    fn test_unknown_op_rejected() {
        assert!(Job::parse(r#"{ "steps": [ { "op": "staple" } ] }"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        std::fs::write(&path, r#"{ "steps": [ { "op": "line", "text": "x" } ] }"#).unwrap();
        let job = Job::load(&path).unwrap();
        assert_eq!(job.steps.len(), 1);
        assert!(Job::load(&dir.path().join("missing.json")).is_err());
    }
}
