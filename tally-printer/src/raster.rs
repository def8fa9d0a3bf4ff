//! Monochrome raster sources
//!
//! The encoder only needs to know which dots are black. [`RasterSource`] is
//! that narrow interface; [`Bitmap`] is the in-memory implementation, stored
//! as rows packed MSB-first (the layout `GS v 0` and `GS ( L` expect).
//!
//! With the `image` feature, bitmaps can be created from image files. Pixels
//! are thresholded, not dithered: callers who need dithering should convert
//! the image themselves and hand over a finished bit matrix.

use crate::error::{PrintError, PrintResult};

/// A monochrome bit matrix with explicit dimensions
pub trait RasterSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Whether the dot at (`x`, `y`) is printed. Out-of-range dots are white.
    fn is_black(&self, x: u32, y: u32) -> bool;

    /// Rows packed MSB-first, `ceil(width / 8)` bytes per row
    fn raster_rows(&self) -> Vec<u8> {
        let width_bytes = self.width().div_ceil(8) as usize;
        let mut data = vec![0u8; width_bytes * self.height() as usize];
        for y in 0..self.height() {
            let row = y as usize * width_bytes;
            for x in 0..self.width() {
                if self.is_black(x, y) {
                    data[row + (x / 8) as usize] |= 0x80 >> (x % 8);
                }
            }
        }
        data
    }
}

/// Packed 1-bit image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Bitmap {
    /// All-white bitmap
    pub fn new(width: u32, height: u32) -> Self {
        let len = width.div_ceil(8) as usize * height as usize;
        Self {
            width,
            height,
            data: vec![0; len],
        }
    }

    /// Wrap rows that are already packed MSB-first
    pub fn from_packed(width: u32, height: u32, data: Vec<u8>) -> PrintResult<Self> {
        let expected = width.div_ceil(8) as usize * height as usize;
        if data.len() != expected {
            return Err(PrintError::InvalidArgument(format!(
                "{width}x{height} bitmap needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build a bitmap by asking `f` for every dot
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        let mut bitmap = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                if f(x, y) {
                    bitmap.set(x, y, true);
                }
            }
        }
        bitmap
    }

    pub fn width_bytes(&self) -> usize {
        self.width.div_ceil(8) as usize
    }

    /// Set one dot; out-of-range coordinates are ignored
    pub fn set(&mut self, x: u32, y: u32, black: bool) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = y as usize * self.width_bytes() + (x / 8) as usize;
        let mask = 0x80 >> (x % 8);
        if black {
            self.data[idx] |= mask;
        } else {
            self.data[idx] &= !mask;
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl RasterSource for Bitmap {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn is_black(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let idx = y as usize * self.width_bytes() + (x / 8) as usize;
        self.data[idx] & (0x80 >> (x % 8)) != 0
    }

    fn raster_rows(&self) -> Vec<u8> {
        self.data.clone()
    }
}

// ============================================================================
// Image loading
// ============================================================================

#[cfg(feature = "image")]
impl Bitmap {
    /// Threshold an image: opaque pixels darker than mid-grey print black,
    /// transparent pixels stay white.
    pub fn from_image(img: &image::DynamicImage) -> Self {
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_fn(width, height, |x, y| {
            let [r, g, b, a] = rgba.get_pixel(x, y).0;
            if a < 128 {
                return false;
            }
            let luma = (299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b)) / 1000;
            luma < 128
        })
    }

    /// Decode an image from memory, shrinking it to `max_width` dots if wider
    pub fn from_encoded(bytes: &[u8], max_width: Option<u32>) -> PrintResult<Self> {
        let img = image::load_from_memory(bytes).map_err(|e| PrintError::Image(e.to_string()))?;
        Ok(Self::from_image(&fit_width(img, max_width)))
    }

    /// Open an image file, shrinking it to `max_width` dots if wider
    #[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>, max_width: Option<u32>) -> PrintResult<Self> {
        let img = image::open(path.as_ref()).map_err(|e| {
            tracing::error!(error = %e, "open image failed");
            PrintError::Image(e.to_string())
        })?;
        tracing::debug!(width = img.width(), height = img.height(), "image opened");
        Ok(Self::from_image(&fit_width(img, max_width)))
    }
}

#[cfg(feature = "image")]
fn fit_width(img: image::DynamicImage, max_width: Option<u32>) -> image::DynamicImage {
    match max_width {
        Some(max) if img.width() > max => {
            let height = (u64::from(img.height()) * u64::from(max) / u64::from(img.width())) as u32;
            img.resize_exact(max, height.max(1), image::imageops::FilterType::Nearest)
        }
        _ => img,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut bmp = Bitmap::new(10, 2);
        assert_eq!(bmp.width_bytes(), 2);
        assert_eq!(bmp.as_bytes().len(), 4);
        bmp.set(0, 0, true);
        bmp.set(9, 1, true);
        bmp.set(20, 20, true);
        assert!(bmp.is_black(0, 0));
        assert!(bmp.is_black(9, 1));
        assert!(!bmp.is_black(1, 0));
        assert!(!bmp.is_black(20, 20));
        assert_eq!(bmp.as_bytes(), &[0x80, 0x00, 0x00, 0x40]);
        bmp.set(0, 0, false);
        assert!(!bmp.is_black(0, 0));
    }

    #[test]
    fn test_from_packed_checks_length() {
        assert!(Bitmap::from_packed(9, 2, vec![0; 4]).is_ok());
        assert!(matches!(
            Bitmap::from_packed(9, 2, vec![0; 3]),
            Err(PrintError::InvalidArgument(_))
        ));
    }

    struct Checker;

    impl RasterSource for Checker {
        fn width(&self) -> u32 {
            12
        }
        fn height(&self) -> u32 {
            2
        }
        fn is_black(&self, x: u32, y: u32) -> bool {
            (x + y) % 2 == 0
        }
    }

    #[test]
    fn test_default_raster_rows_matches_bitmap() {
        let bmp = Bitmap::from_fn(12, 2, |x, y| Checker.is_black(x, y));
        assert_eq!(Checker.raster_rows(), bmp.raster_rows());
        assert_eq!(Checker.raster_rows(), vec![0xAA, 0xA0, 0x55, 0x50]);
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_from_image_threshold() {
        let mut img = image::RgbaImage::new(3, 1);
        img.put_pixel(0, 0, image::Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 0, image::Rgba([255, 255, 255, 255]));
        img.put_pixel(2, 0, image::Rgba([0, 0, 0, 0]));
        let bmp = Bitmap::from_image(&image::DynamicImage::ImageRgba8(img));
        assert!(bmp.is_black(0, 0));
        assert!(!bmp.is_black(1, 0));
        assert!(!bmp.is_black(2, 0));
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_from_encoded_fits_width() {
        let img = image::RgbaImage::from_pixel(40, 20, image::Rgba([0, 0, 0, 255]));
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let bmp = Bitmap::from_encoded(&png, Some(20)).unwrap();
        assert_eq!((bmp.width(), bmp.height()), (20, 10));
        assert!(bmp.is_black(19, 9));

        assert!(matches!(
            Bitmap::from_encoded(b"not an image", None),
            Err(PrintError::Image(_))
        ));
    }
}
