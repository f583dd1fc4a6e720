use euclid::{Box2D, Transform2D, rect};
use log::debug;
use lopdf::{Document as PdfDocument, ObjectId};

use crate::document::Document;
use crate::geometry::{self, PdfRect, PdfSize, rect_from_array, validate_box};
use crate::raster::{RasterBackend, RasterImage};
use crate::surface::DrawingSurface;
use crate::{PdfError, PdfResult, get_inherited};

/// US Letter, assumed for pages that have no media box anywhere in their
/// ancestry.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0., 0., 612., 792.];

/// What a [`Document`] remembers about one of its pages between refreshes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PageRecord {
    pub(crate) id: ObjectId,
    pub(crate) number: u32,
    pub(crate) frame: PdfRect,
    pub(crate) crop_box: PdfRect,
}

impl PageRecord {
    pub(crate) fn resolve(doc: &PdfDocument, number: u32, id: ObjectId) -> PdfResult<PageRecord> {
        let dict = doc.get_dictionary(id)?;

        let frame = match get_inherited::<[f64; 4]>(doc, dict, b"MediaBox") {
            Some(media_box) => rect_from_array(media_box),
            None => {
                debug!("Page {} has no MediaBox, assuming US Letter", number);
                rect_from_array(DEFAULT_MEDIA_BOX)
            }
        };
        validate_box(&frame)?;

        let crop_box = get_inherited::<[f64; 4]>(doc, dict, b"CropBox")
            .map(rect_from_array)
            .and_then(|crop| crop.intersection(&frame))
            .filter(|crop| validate_box(crop).is_ok())
            .unwrap_or(frame);

        Ok(PageRecord { id, number, frame, crop_box })
    }
}

/// A view of one page of a [`Document`].
///
/// Pages borrow their document, so they cannot outlive it or be held across
/// a refresh.
#[derive(Clone, Copy)]
pub struct Page<'a> {
    document: &'a Document,
    record: &'a PageRecord,
}

impl<'a> Page<'a> {
    pub(crate) fn new(document: &'a Document, record: &'a PageRecord) -> Page<'a> {
        Page { document, record }
    }

    /// 1-based position of the page in its document.
    pub fn number(&self) -> u32 {
        self.record.number
    }

    /// The page's object id in [`Page::pdf`].
    pub fn id(&self) -> ObjectId {
        self.record.id
    }

    /// The media box.
    pub fn frame(&self) -> PdfRect {
        self.record.frame
    }

    pub fn size(&self) -> PdfSize {
        self.record.frame.size
    }

    /// The crop box, clipped to the media box.
    pub fn crop_box(&self) -> PdfRect {
        self.record.crop_box
    }

    pub fn document(&self) -> &'a Document {
        self.document
    }

    pub fn pdf(&self) -> &'a PdfDocument {
        self.document.reference()
    }

    /// Draw the page unscaled onto a new page of its own size.
    pub fn draw_onto_page(&self, surface: &mut dyn DrawingSurface) -> PdfResult<()> {
        let frame = self.frame();
        let transform = Transform2D::translation(-frame.origin.x, -frame.origin.y);
        self.draw_with(surface, &rect(0., 0., frame.size.width, frame.size.height), &transform)
    }

    /// Draw the page onto a new page of `size`, stretching the crop box to
    /// fill it.
    pub fn draw_onto_page_at_size(&self, surface: &mut dyn DrawingSurface, size: &PdfSize) -> PdfResult<()> {
        let transform = geometry::reframe_to_crop_box(&self.crop_box(), size)?;
        self.draw_with(surface, &Box2D::from_size(*size).to_rect(), &transform)
    }

    /// Draw the page onto a new page of `size`, scaled uniformly and centered.
    pub fn draw_onto_page_fitted(&self, surface: &mut dyn DrawingSurface, size: &PdfSize) -> PdfResult<()> {
        let transform = geometry::fit_transform(&self.frame(), size, true)?;
        self.draw_with(surface, &Box2D::from_size(*size).to_rect(), &transform)
    }

    /// Content streams of a locked document are still ciphertext.
    fn ensure_unlocked(&self) -> PdfResult<()> {
        if self.document.is_unlocked() { Ok(()) } else { Err(PdfError::Locked) }
    }

    fn draw_with(
        &self,
        surface: &mut dyn DrawingSurface,
        media_box: &PdfRect,
        transform: &geometry::PdfTransform,
    ) -> PdfResult<()> {
        self.ensure_unlocked()?;
        surface.begin_page(Some(media_box))?;
        surface.save_state()?;
        surface.concat(transform)?;
        surface.draw_page(self)?;
        surface.restore_state()?;
        surface.end_page()
    }

    /// Render the page into a new raster at `pixels_per_point` pixels per
    /// point, preserving its aspect ratio.
    pub fn rasterize(&self, backend: &mut dyn RasterBackend, pixels_per_point: u32) -> PdfResult<RasterImage> {
        self.ensure_unlocked()?;
        let pixel_size = geometry::scaled_pixel_size(&self.size(), pixels_per_point);
        let mut canvas = backend.begin_offscreen(pixel_size)
            .ok_or_else(|| PdfError::SurfaceUnavailable(format!(
                "no {}x{} buffer for page {}", pixel_size.width, pixel_size.height, self.number()
            )))?;
        if canvas.dimensions() != (pixel_size.width, pixel_size.height) {
            return Err(PdfError::SurfaceUnavailable(format!(
                "backend returned a {}x{} buffer, expected {}x{}",
                canvas.width(), canvas.height(), pixel_size.width, pixel_size.height
            )));
        }

        let transform = geometry::draw_transform(&self.frame(), &pixel_size.to_f64(), true)?;
        backend.paint_page(self, &transform, &mut canvas)?;
        Ok(RasterImage::new(canvas))
    }
}

impl std::fmt::Debug for Page<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("number", &self.record.number)
            .field("id", &self.record.id)
            .field("frame", &self.record.frame)
            .field("crop_box", &self.record.crop_box)
            .finish()
    }
}
