//! Wrapping raster images into a PDF, one page per image.

use euclid::{Rect, rect};
use log::{debug, warn};

use crate::metadata::Metadata;
use crate::raster::RasterImage;
use crate::surface::{DrawingSurface, PdfWriter, WriteOptions};
use crate::{PdfError, PdfResult};

/// Output of [`ImagePdfBuilder::build`].
#[derive(Debug, Clone)]
pub struct BuiltPdf {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    /// Indices of the input images that had no pixels and were left out.
    pub skipped: Vec<usize>,
}

/// Builds a PDF whose pages are the given images, one point per pixel.
#[derive(Debug, Clone, Default)]
pub struct ImagePdfBuilder {
    options: WriteOptions,
    metadata: Metadata,
}

impl ImagePdfBuilder {
    pub fn new() -> ImagePdfBuilder {
        ImagePdfBuilder::default()
    }

    pub fn options(mut self, options: WriteOptions) -> ImagePdfBuilder {
        self.options = options;
        self
    }

    /// Metadata written to the info dictionary of the result.
    pub fn metadata(mut self, metadata: Metadata) -> ImagePdfBuilder {
        self.metadata = metadata;
        self
    }

    /// Emit one page per image that has pixels, in order.
    ///
    /// Fails with [`PdfError::EmptyOutput`] when no image had pixels.
    pub fn build(&self, images: &[RasterImage]) -> PdfResult<BuiltPdf> {
        let mut writer = PdfWriter::with_options(Rect::zero(), self.metadata.to_info_dictionary(), &self.options);
        let mut skipped = Vec::new();

        for (index, image) in images.iter().enumerate() {
            let Some(pixels) = image.pixels() else {
                warn!("Skipping image {} ({}x{}): no pixel data", index, image.width(), image.height());
                skipped.push(index);
                continue;
            };
            let page = rect(0., 0., f64::from(pixels.width()), f64::from(pixels.height()));
            writer.begin_page(Some(&page))?;
            writer.draw_image(pixels, &page)?;
            writer.end_page()?;
        }

        let page_count = writer.page_count();
        if page_count == 0 {
            return Err(PdfError::EmptyOutput);
        }
        let bytes = writer.finish_to_bytes()?;
        debug!("Built {} image pages ({} bytes, {} skipped)", page_count, bytes.len(), skipped.len());
        Ok(BuiltPdf { bytes, page_count, skipped })
    }
}
