//! Raster images and the offscreen buffer provider pages are rendered into.

use image::{DynamicImage, Rgba, RgbaImage};
use log::warn;

use crate::geometry::{DeviceTransform, PixelSize};
use crate::page::Page;
use crate::PdfResult;

/// Largest offscreen buffer handed out by [`allocate_canvas`], in pixels.
pub const MAX_RASTER_PIXELS: u64 = 1 << 28;

/// A raster image, possibly without a decoded pixel buffer behind it.
///
/// An image can know its dimensions without having pixels, for instance a
/// thumbnail placeholder whose data was never loaded. Such images cannot be
/// drawn and are skipped wherever a sequence of images is turned into pages.
#[derive(Debug, Clone)]
pub struct RasterImage {
    width: u32,
    height: u32,
    pixels: Option<RgbaImage>,
}

impl RasterImage {
    pub fn new(pixels: RgbaImage) -> RasterImage {
        let (width, height) = pixels.dimensions();
        RasterImage { width, height, pixels: Some(pixels) }
    }

    /// An image of the given size with no pixel buffer.
    pub fn unbacked(width: u32, height: u32) -> RasterImage {
        RasterImage { width, height, pixels: None }
    }

    /// Decode an encoded image (PNG, JPEG, ...).
    pub fn decode(bytes: &[u8]) -> PdfResult<RasterImage> {
        Ok(image::load_from_memory(bytes)?.into())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The pixel buffer, if there is a non-empty one.
    pub fn pixels(&self) -> Option<&RgbaImage> {
        self.pixels.as_ref().filter(|p| p.width() > 0 && p.height() > 0)
    }

    pub fn has_pixels(&self) -> bool {
        self.pixels().is_some()
    }

    pub fn into_pixels(self) -> Option<RgbaImage> {
        self.pixels.filter(|p| p.width() > 0 && p.height() > 0)
    }
}

impl From<RgbaImage> for RasterImage {
    fn from(pixels: RgbaImage) -> RasterImage {
        RasterImage::new(pixels)
    }
}

impl From<DynamicImage> for RasterImage {
    fn from(image: DynamicImage) -> RasterImage {
        RasterImage::new(image.into_rgba8())
    }
}

/// Allocate a white, opaque buffer of `size`, or `None` when it is empty or
/// larger than [`MAX_RASTER_PIXELS`].
pub fn allocate_canvas(size: PixelSize) -> Option<RgbaImage> {
    let pixels = u64::from(size.width) * u64::from(size.height);
    if pixels == 0 {
        warn!("Refusing to allocate an empty {}x{} raster", size.width, size.height);
        return None;
    }
    if pixels > MAX_RASTER_PIXELS {
        warn!("Refusing to allocate a {}x{} raster ({} pixels, max {})",
              size.width, size.height, pixels, MAX_RASTER_PIXELS);
        return None;
    }
    Some(RgbaImage::from_pixel(size.width, size.height, Rgba([255, 255, 255, 255])))
}

/// Provider of offscreen pixel buffers and the rasterizer that paints page
/// content into them.
pub trait RasterBackend {
    /// Allocate a buffer to render into. `None` means no surface is available.
    fn begin_offscreen(&mut self, size: PixelSize) -> Option<RgbaImage> {
        allocate_canvas(size)
    }

    /// Paint `page` into `canvas`, mapping PDF user space onto the canvas with
    /// `transform`.
    fn paint_page(
        &mut self,
        page: &Page<'_>,
        transform: &DeviceTransform,
        canvas: &mut RgbaImage,
    ) -> PdfResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use euclid::size2;

    #[test]
    fn unbacked_images_have_no_pixels() {
        let image = RasterImage::unbacked(100, 200);
        assert_eq!((image.width(), image.height()), (100, 200));
        assert!(!image.has_pixels());
        assert!(image.into_pixels().is_none());
    }

    #[test]
    fn empty_buffers_count_as_missing() {
        let image = RasterImage::new(RgbaImage::new(0, 10));
        assert!(!image.has_pixels());
    }

    #[test]
    fn decodes_png() {
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::new(3, 2))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let image = RasterImage::decode(&png).unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));
        assert!(image.has_pixels());
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(RasterImage::decode(b"definitely not an image").is_err());
    }

    #[test]
    fn canvas_allocation_limits() {
        let canvas = allocate_canvas(size2(4, 3)).unwrap();
        assert_eq!(canvas.dimensions(), (4, 3));
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));

        assert!(allocate_canvas(size2(0, 3)).is_none());
        assert!(allocate_canvas(size2(1 << 15, 1 << 15)).is_none());
    }
}
