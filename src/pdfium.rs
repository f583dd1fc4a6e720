//! Page rasterization through PDFium.

use image::RgbaImage;
use image::imageops::{self, FilterType};
use log::debug;
use pdfium_render::prelude::*;

use crate::geometry::DeviceTransform;
use crate::page::Page;
use crate::raster::RasterBackend;
use crate::{PdfError, PdfResult};

/// A [`RasterBackend`] painting pages with the PDFium library.
///
/// The library is looked up next to the executable, then in
/// `/opt/pdfium/lib`, then on the system library path.
pub struct PdfiumBackend {
    pdfium: Pdfium,
}

impl PdfiumBackend {
    pub fn new() -> PdfResult<PdfiumBackend> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                    "/opt/pdfium/lib",
                ))
            })
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| PdfError::Pdfium(format!("Failed to initialize PDFium: {}", e)))?;

        Ok(PdfiumBackend { pdfium: Pdfium::new(bindings) })
    }
}

impl RasterBackend for PdfiumBackend {
    fn paint_page(
        &mut self,
        page: &Page<'_>,
        transform: &DeviceTransform,
        canvas: &mut RgbaImage,
    ) -> PdfResult<()> {
        // PDFium needs a serialized file, and never sees a password
        let bytes = page.document().plain_bytes()?;

        let document = self.pdfium.load_pdf_from_byte_slice(bytes.as_ref(), None)
            .map_err(|e| PdfError::Pdfium(format!("Failed to load document: {}", e)))?;
        let index = u16::try_from(page.number() - 1)
            .map_err(|_| PdfError::Pdfium(format!("Page {} out of range", page.number())))?;
        let pdfium_page = document.pages().get(index)
            .map_err(|e| PdfError::Pdfium(format!("Failed to get page {}: {}", page.number(), e)))?;

        let target = transform.outer_transformed_rect(&page.frame()).round();
        let (width, height) = (target.size.width as i32, target.size.height as i32);
        if width <= 0 || height <= 0 {
            return Err(PdfError::SurfaceUnavailable(format!("{}x{} render target", width, height)));
        }

        let config = PdfRenderConfig::new()
            .set_target_size(width, height)
            .render_form_data(true)
            .render_annotations(true);
        let bitmap = pdfium_page.render_with_config(&config)
            .map_err(|e| PdfError::Pdfium(format!("Failed to render page {}: {}", page.number(), e)))?;

        let mut rendered = bitmap.as_image().into_rgba8();
        if rendered.dimensions() != (width as u32, height as u32) {
            rendered = imageops::resize(&rendered, width as u32, height as u32, FilterType::Triangle);
        }
        debug!("Rendered page {} at {}x{}", page.number(), width, height);
        imageops::overlay(canvas, &rendered, target.origin.x as i64, target.origin.y as i64);
        Ok(())
    }
}
