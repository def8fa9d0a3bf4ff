//! Bit images
//!
//! Three encodings exist for the same picture. The encoder picks the best one
//! the profile supports: `GS ( L` graphics, then `GS v 0` raster, then the
//! legacy `ESC *` column format that even impact printers understand.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EncodedCommand, ESC, GS, LF, low_high};
use crate::error::{PrintError, PrintResult};
use crate::profile::{CapabilityProfile, Feature};
use crate::raster::RasterSource;

/// `GS v 0` accepts at most this many rows per command on common firmware
pub const RASTER_BAND_ROWS: u32 = 256;

/// Image magnification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ImageScale(u8);

impl ImageScale {
    pub const NORMAL: ImageScale = ImageScale(0);
    pub const DOUBLE_WIDTH: ImageScale = ImageScale(1);
    pub const DOUBLE_HEIGHT: ImageScale = ImageScale(2);
    pub const QUADRUPLE: ImageScale = ImageScale(3);

    pub fn new(double_width: bool, double_height: bool) -> Self {
        Self(u8::from(double_width) | (u8::from(double_height) << 1))
    }

    pub fn double_width(self) -> bool {
        self.0 & 1 != 0
    }

    pub fn double_height(self) -> bool {
        self.0 & 2 != 0
    }

    /// Raw `m` for `GS v 0`
    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Image command family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterCommand {
    Graphics,
    Raster,
    Column,
}

impl RasterCommand {
    /// Best image command the profile implements
    pub fn preferred(profile: &CapabilityProfile) -> Option<Self> {
        if profile.supports(Feature::Graphics) {
            Some(Self::Graphics)
        } else if profile.supports(Feature::BitImageRaster) {
            Some(Self::Raster)
        } else if profile.supports(Feature::BitImageColumn) {
            Some(Self::Column)
        } else {
            None
        }
    }
}

/// Encode `src` with the best command the profile supports
pub fn image<S>(
    profile: &CapabilityProfile,
    src: &S,
    scale: ImageScale,
) -> PrintResult<Vec<EncodedCommand>>
where
    S: RasterSource + ?Sized,
{
    let command = RasterCommand::preferred(profile)
        .ok_or_else(|| PrintError::unsupported(Feature::BitImageRaster, &profile.name))?;
    image_with(profile, src, scale, command)
}

/// Encode `src` with an explicit command family
pub fn image_with<S>(
    profile: &CapabilityProfile,
    src: &S,
    scale: ImageScale,
    command: RasterCommand,
) -> PrintResult<Vec<EncodedCommand>>
where
    S: RasterSource + ?Sized,
{
    let feature = match command {
        RasterCommand::Graphics => Feature::Graphics,
        RasterCommand::Raster => Feature::BitImageRaster,
        RasterCommand::Column => Feature::BitImageColumn,
    };
    profile.require(feature)?;
    check_dimensions(profile, src, scale)?;

    let commands = match command {
        RasterCommand::Graphics => graphics(src, scale),
        RasterCommand::Raster => raster(src, scale),
        RasterCommand::Column => column(src, scale),
    };
    debug!(
        width = src.width(),
        height = src.height(),
        ?command,
        commands = commands.len(),
        "image encoded"
    );
    Ok(commands)
}

fn check_dimensions<S>(profile: &CapabilityProfile, src: &S, scale: ImageScale) -> PrintResult<()>
where
    S: RasterSource + ?Sized,
{
    let (width, height) = (src.width(), src.height());
    if width == 0 || height == 0 {
        return Err(PrintError::InvalidArgument(format!(
            "image has no dots ({width}x{height})"
        )));
    }
    let scaled_width = u64::from(width) << u8::from(scale.double_width());
    let scaled_height = u64::from(height) << u8::from(scale.double_height());
    if scaled_width > u64::from(profile.max_image_width)
        || scaled_height > u64::from(profile.max_image_height)
        || width.div_ceil(8) > 0xFFFF
    {
        return Err(PrintError::ImageTooLarge {
            width,
            height,
            max_width: profile.max_image_width,
            max_height: profile.max_image_height,
        });
    }
    Ok(())
}

/// `GS ( L` store + print; `GS 8 L` when the data outgrows a 16-bit length
fn graphics<S: RasterSource + ?Sized>(src: &S, scale: ImageScale) -> Vec<EncodedCommand> {
    let (width, height) = (src.width() as usize, src.height() as usize);
    let bx = if scale.double_width() { 2 } else { 1 };
    let by = if scale.double_height() { 2 } else { 1 };

    let mut params = vec![48, 112, 48, bx, by, 49];
    params.extend_from_slice(&low_high(width));
    params.extend_from_slice(&low_high(height));
    params.extend_from_slice(&src.raster_rows());

    let mut store = Vec::with_capacity(params.len() + 7);
    if params.len() <= 0xFFFF {
        store.extend_from_slice(&[GS, b'(', b'L']);
        store.extend_from_slice(&low_high(params.len()));
    } else {
        store.extend_from_slice(&[GS, b'8', b'L']);
        store.extend_from_slice(&(params.len() as u32).to_le_bytes());
    }
    store.extend_from_slice(&params);

    vec![
        EncodedCommand::new(store),
        EncodedCommand::new(vec![GS, b'(', b'L', 2, 0, 48, 50]),
    ]
}

/// `GS v 0 m xL xH yL yH d...`, split into bands of [`RASTER_BAND_ROWS`]
fn raster<S: RasterSource + ?Sized>(src: &S, scale: ImageScale) -> Vec<EncodedCommand> {
    let width_bytes = src.width().div_ceil(8) as usize;
    let rows = src.raster_rows();
    rows.chunks(width_bytes * RASTER_BAND_ROWS as usize)
        .map(|band| {
            let band_rows = band.len() / width_bytes;
            let mut cmd = Vec::with_capacity(band.len() + 8);
            cmd.extend_from_slice(&[GS, b'v', b'0', scale.bits()]);
            cmd.extend_from_slice(&low_high(width_bytes));
            cmd.extend_from_slice(&low_high(band_rows));
            cmd.extend_from_slice(band);
            EncodedCommand::new(cmd)
        })
        .collect()
}

/// `ESC *` column bands, bracketed by line-spacing changes so bands touch
fn column<S: RasterSource + ?Sized>(src: &S, scale: ImageScale) -> Vec<EncodedCommand> {
    let high_vertical = !scale.double_height();
    let high_horizontal = !scale.double_width();
    let dots: u32 = if high_vertical { 24 } else { 8 };
    let m = u8::from(high_horizontal) | if high_vertical { 32 } else { 0 };
    let spacing = if high_vertical { 24 } else { 16 };

    let width = src.width();
    let mut commands = vec![super::set_line_spacing(Some(spacing))];
    for top in (0..src.height()).step_by(dots as usize) {
        let mut cmd = vec![ESC, b'*', m];
        cmd.extend_from_slice(&low_high(width as usize));
        for x in 0..width {
            for byte in 0..dots / 8 {
                let mut b = 0u8;
                for bit in 0..8 {
                    if src.is_black(x, top + byte * 8 + bit) {
                        b |= 0x80 >> bit;
                    }
                }
                cmd.push(b);
            }
        }
        cmd.push(LF);
        commands.push(EncodedCommand::new(cmd));
    }
    commands.push(super::set_line_spacing(None));
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Bitmap;

    fn profile(name: &str) -> CapabilityProfile {
        CapabilityProfile::load(name).unwrap()
    }

    #[test]
    fn test_preferred_command() {
        assert_eq!(RasterCommand::preferred(&profile("default")), Some(RasterCommand::Graphics));
        assert_eq!(RasterCommand::preferred(&profile("zj-5870")), Some(RasterCommand::Raster));
        assert_eq!(RasterCommand::preferred(&profile("tm-u220")), Some(RasterCommand::Column));

        let mut none = profile("ascii");
        none.features.clear();
        assert_eq!(RasterCommand::preferred(&none), None);
        let bmp = Bitmap::new(8, 8);
        assert!(matches!(
            image(&none, &bmp, ImageScale::NORMAL),
            Err(PrintError::UnsupportedFeature { .. })
        ));
    }

    #[test]
    fn test_scale_bits() {
        assert_eq!(ImageScale::new(true, false), ImageScale::DOUBLE_WIDTH);
        assert_eq!(ImageScale::new(true, true), ImageScale::QUADRUPLE);
        assert!(ImageScale::DOUBLE_HEIGHT.double_height());
        assert!(!ImageScale::DOUBLE_HEIGHT.double_width());
    }

    #[test]
    fn test_graphics_bytes() {
        let bmp = Bitmap::from_packed(8, 2, vec![0xF0, 0x0F]).unwrap();
        let cmds = image(&profile("default"), &bmp, ImageScale::NORMAL).unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(
            cmds[0].as_bytes(),
            &[0x1D, 0x28, 0x4C, 12, 0, 48, 112, 48, 1, 1, 49, 8, 0, 2, 0, 0xF0, 0x0F]
        );
        assert_eq!(cmds[1].as_bytes(), &[0x1D, 0x28, 0x4C, 2, 0, 48, 50]);
    }

    #[test]
    fn test_graphics_large_uses_gs8l() {
        let bmp = Bitmap::new(576, 1000);
        let cmds = image(&profile("default"), &bmp, ImageScale::NORMAL).unwrap();
        let params = 10 + 72 * 1000;
        assert_eq!(&cmds[0].as_bytes()[..3], &[0x1D, 0x38, 0x4C]);
        assert_eq!(&cmds[0].as_bytes()[3..7], &(params as u32).to_le_bytes());
        assert_eq!(cmds[0].len(), 7 + params);
    }

    #[test]
    fn test_raster_bands() {
        let bmp = Bitmap::from_fn(16, 300, |x, _| x == 0);
        let cmds = image_with(&profile("default"), &bmp, ImageScale::NORMAL, RasterCommand::Raster)
            .unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(&cmds[0].as_bytes()[..8], &[0x1D, 0x76, 0x30, 0, 2, 0, 0, 1]);
        assert_eq!(cmds[0].len(), 8 + 2 * 256);
        assert_eq!(&cmds[1].as_bytes()[..8], &[0x1D, 0x76, 0x30, 0, 2, 0, 44, 0]);
        assert_eq!(&cmds[1].as_bytes()[8..10], &[0x80, 0x00]);
    }

    #[test]
    fn test_raster_scale_mode() {
        let bmp = Bitmap::new(8, 1);
        let cmds = image(&profile("zj-5870"), &bmp, ImageScale::QUADRUPLE).unwrap();
        assert_eq!(cmds[0].as_bytes()[3], 3);
    }

    #[test]
    fn test_column_format() {
        // 2 columns, 24 rows; column 0 fully black
        let bmp = Bitmap::from_fn(2, 24, |x, _| x == 0);
        let cmds = image(&profile("tm-u220"), &bmp, ImageScale::NORMAL).unwrap();
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[0].as_bytes(), &[0x1B, 0x33, 24]);
        assert_eq!(
            cmds[1].as_bytes(),
            &[0x1B, 0x2A, 33, 2, 0, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0x0A]
        );
        assert_eq!(cmds[2].as_bytes(), &[0x1B, 0x32]);
    }

    #[test]
    fn test_column_double_height_uses_8_dot_bands() {
        let bmp = Bitmap::from_fn(1, 10, |_, y| y == 9);
        let cmds = image(&profile("tm-u220"), &bmp, ImageScale::DOUBLE_HEIGHT).unwrap();
        // spacing, two 8-dot bands, restore
        assert_eq!(cmds.len(), 4);
        assert_eq!(cmds[0].as_bytes(), &[0x1B, 0x33, 16]);
        assert_eq!(cmds[1].as_bytes(), &[0x1B, 0x2A, 1, 1, 0, 0x00, 0x0A]);
        assert_eq!(cmds[2].as_bytes(), &[0x1B, 0x2A, 1, 1, 0, 0x40, 0x0A]);
    }

    #[test]
    fn test_image_limits() {
        let p = profile("zj-5870");
        let empty = Bitmap::new(0, 10);
        assert!(matches!(
            image(&p, &empty, ImageScale::NORMAL),
            Err(PrintError::InvalidArgument(_))
        ));

        let wide = Bitmap::new(385, 10);
        assert!(matches!(
            image(&p, &wide, ImageScale::NORMAL),
            Err(PrintError::ImageTooLarge { width: 385, .. })
        ));

        let fits = Bitmap::new(384, 10);
        assert!(image(&p, &fits, ImageScale::NORMAL).is_ok());
        assert!(matches!(
            image(&p, &fits, ImageScale::DOUBLE_WIDTH),
            Err(PrintError::ImageTooLarge { .. })
        ));
    }
}
