//! Drawing into a new PDF.
//!
//! [`DrawingSurface`] is the page-at-a-time interface the rest of the crate
//! draws through. [`PdfWriter`] implements it on top of `lopdf`: every
//! source page drawn becomes a Form XObject and every raster image an Image
//! XObject, placed on the output page by the current transform.

use std::collections::HashMap;
use std::io::Write;

use image::RgbaImage;
use log::debug;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document as PdfDocument, Object, ObjectId, Stream, dictionary};

use crate::geometry::{PdfRect, PdfTransform, rect_to_array, validate_box};
use crate::page::Page;
use crate::{PdfError, PdfResult, get_inherited};

/// A page-oriented drawing target.
///
/// Calls are expected in the order `begin_page`, any number of drawing
/// calls, `end_page`. State saves and restores must balance within a page.
pub trait DrawingSurface {
    /// Open a new page. Without a media box the surface's default box is
    /// used.
    fn begin_page(&mut self, media_box: Option<&PdfRect>) -> PdfResult<()>;
    fn end_page(&mut self) -> PdfResult<()>;

    fn save_state(&mut self) -> PdfResult<()>;
    fn restore_state(&mut self) -> PdfResult<()>;

    /// Concatenate `transform` onto the current transformation matrix.
    fn concat(&mut self, transform: &PdfTransform) -> PdfResult<()>;

    /// Paint the content of `page`, clipped to its crop box, in the current
    /// user space.
    fn draw_page(&mut self, page: &Page<'_>) -> PdfResult<()>;

    /// Paint `image` stretched over `rect`.
    fn draw_image(&mut self, image: &RgbaImage, rect: &PdfRect) -> PdfResult<()>;
}

/// Output settings for [`PdfWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Version written to the file header.
    pub version: String,
    /// Flate-compress streams before saving.
    pub compress: bool,
}

impl Default for WriteOptions {
    fn default() -> WriteOptions {
        WriteOptions { version: "1.7".to_string(), compress: true }
    }
}

struct OpenPage {
    media_box: PdfRect,
    operations: Vec<Operation>,
    xobjects: Dictionary,
    depth: usize,
}

/// A [`DrawingSurface`] accumulating pages into a new `lopdf` document.
pub struct PdfWriter {
    doc: PdfDocument,
    pages_id: ObjectId,
    kids: Vec<Object>,
    default_box: PdfRect,
    info: Dictionary,
    compress: bool,
    current: Option<OpenPage>,
    xobject_count: usize,
}

impl PdfWriter {
    pub fn new(default_box: PdfRect, info: Dictionary) -> PdfWriter {
        PdfWriter::with_options(default_box, info, &WriteOptions::default())
    }

    pub fn with_options(default_box: PdfRect, info: Dictionary, options: &WriteOptions) -> PdfWriter {
        let mut doc = PdfDocument::with_version(options.version.as_str());
        let pages_id = doc.new_object_id();
        PdfWriter {
            doc,
            pages_id,
            kids: Vec::new(),
            default_box,
            info,
            compress: options.compress,
            current: None,
            xobject_count: 0,
        }
    }

    /// Number of pages completed so far.
    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    fn open_page(&mut self) -> PdfResult<&mut OpenPage> {
        self.current.as_mut()
            .ok_or_else(|| PdfError::Drawing("no page is open".to_string()))
    }

    fn next_xobject_name(&mut self, prefix: &str) -> String {
        self.xobject_count += 1;
        format!("{}{}", prefix, self.xobject_count)
    }

    /// Place the XObject `id` on the open page under a fresh name.
    fn paint_xobject(&mut self, prefix: &str, id: ObjectId, placement: Option<&PdfTransform>) -> PdfResult<()> {
        let name = self.next_xobject_name(prefix);
        let page = self.open_page()?;
        page.xobjects.set(name.as_bytes(), Object::Reference(id));
        page.operations.push(Operation::new("q", vec![]));
        if let Some(placement) = placement {
            page.operations.push(Operation::new("cm", matrix_operands(placement)));
        }
        page.operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
        page.operations.push(Operation::new("Q", vec![]));
        Ok(())
    }

    /// Close any open page and assemble the document.
    pub fn finish(mut self) -> PdfResult<PdfDocument> {
        if self.current.is_some() {
            debug!("Closing page left open at finish");
            self.end_page()?;
        }

        let count = self.kids.len() as i64;
        self.doc.objects.insert(self.pages_id, Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => count,
        }));
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        if !self.info.is_empty() {
            let info_id = self.doc.add_object(self.info);
            self.doc.trailer.set("Info", info_id);
        }
        if self.compress {
            self.doc.compress();
        }
        debug!("Finished document with {} pages", count);
        Ok(self.doc)
    }

    /// Close the writer and serialize the document into `out`.
    pub fn finish_to<W: Write>(self, out: &mut W) -> PdfResult<()> {
        let mut doc = self.finish()?;
        doc.save_to(out)?;
        Ok(())
    }

    pub fn finish_to_bytes(self) -> PdfResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.finish_to(&mut bytes)?;
        Ok(bytes)
    }
}

impl DrawingSurface for PdfWriter {
    fn begin_page(&mut self, media_box: Option<&PdfRect>) -> PdfResult<()> {
        if self.current.is_some() {
            return Err(PdfError::Drawing("a page is already open".to_string()));
        }
        let media_box = media_box.copied().unwrap_or(self.default_box);
        validate_box(&media_box)?;
        self.current = Some(OpenPage {
            media_box,
            operations: Vec::new(),
            xobjects: Dictionary::new(),
            depth: 0,
        });
        Ok(())
    }

    fn end_page(&mut self) -> PdfResult<()> {
        let mut page = self.current.take()
            .ok_or_else(|| PdfError::Drawing("no page is open".to_string()))?;
        if page.depth > 0 {
            debug!("Balancing {} unrestored graphics states", page.depth);
            page.operations.extend((0..page.depth).map(|_| Operation::new("Q", vec![])));
        }

        let content = Content { operations: page.operations }.encode()?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), content));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => rect_to_array(&page.media_box).map(number).to_vec(),
            "Resources" => dictionary! { "XObject" => page.xobjects },
            "Contents" => content_id,
        });
        self.kids.push(page_id.into());
        debug!("Emitted page {} ({}x{})", self.kids.len(),
               page.media_box.size.width, page.media_box.size.height);
        Ok(())
    }

    fn save_state(&mut self) -> PdfResult<()> {
        let page = self.open_page()?;
        page.depth += 1;
        page.operations.push(Operation::new("q", vec![]));
        Ok(())
    }

    fn restore_state(&mut self) -> PdfResult<()> {
        let page = self.open_page()?;
        if page.depth == 0 {
            return Err(PdfError::Drawing("restore without a matching save".to_string()));
        }
        page.depth -= 1;
        page.operations.push(Operation::new("Q", vec![]));
        Ok(())
    }

    fn concat(&mut self, transform: &PdfTransform) -> PdfResult<()> {
        let page = self.open_page()?;
        page.operations.push(Operation::new("cm", matrix_operands(transform)));
        Ok(())
    }

    fn draw_page(&mut self, page: &Page<'_>) -> PdfResult<()> {
        self.open_page()?;
        let form_id = embed_page(&mut self.doc, page.pdf(), page.id(), &page.crop_box())?;
        self.paint_xobject("P", form_id, None)
    }

    fn draw_image(&mut self, image: &RgbaImage, rect: &PdfRect) -> PdfResult<()> {
        self.open_page()?;
        let image_id = embed_image(&mut self.doc, image)?;
        let placement = PdfTransform::new(
            rect.size.width, 0., 0., rect.size.height, rect.origin.x, rect.origin.y,
        );
        self.paint_xobject("Im", image_id, Some(&placement))
    }
}

/// Whole numbers are written as integers so page sizes and offsets survive
/// exactly; `lopdf` stores reals as `f32`.
fn number(value: f64) -> Object {
    if value.fract() == 0.0 && value.abs() <= f64::from(i32::MAX) {
        Object::Integer(value as i64)
    } else {
        Object::Real(value as f32)
    }
}

fn matrix_operands(t: &PdfTransform) -> Vec<Object> {
    t.to_array().into_iter().map(number).collect()
}

/// Copy page `page_id` of `source` into `output` as a Form XObject clipped to
/// `bbox`.
fn embed_page(output: &mut PdfDocument, source: &PdfDocument, page_id: ObjectId, bbox: &PdfRect) -> PdfResult<ObjectId> {
    let page_dict = source.get_dictionary(page_id)?;
    let content = source.get_page_content(page_id)?;

    let mut form = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "FormType" => 1,
        "BBox" => rect_to_array(bbox).map(number).to_vec(),
    };
    if let Some(resources) = get_inherited::<&Dictionary>(source, page_dict, b"Resources") {
        let mut copied = HashMap::new();
        let resources = copy_object_deep(output, source, &Object::Dictionary(resources.clone()), &mut copied)?;
        form.set("Resources", resources);
    }
    Ok(output.add_object(Stream::new(form, content)))
}

/// Copy `obj` and everything it references from `source` into `output`.
///
/// Each source object is copied once; its new id is reserved before its
/// children are visited so reference cycles terminate.
fn copy_object_deep(
    output: &mut PdfDocument,
    source: &PdfDocument,
    obj: &Object,
    copied: &mut HashMap<ObjectId, ObjectId>,
) -> PdfResult<Object> {
    match obj {
        Object::Reference(id) => {
            if let Some(&new_id) = copied.get(id) {
                return Ok(Object::Reference(new_id));
            }
            let new_id = output.new_object_id();
            copied.insert(*id, new_id);
            let target = match source.get_object(*id) {
                Ok(target) => copy_object_deep(output, source, target, copied)?,
                Err(e) => {
                    debug!("Dangling reference {:?} copied as null: {}", id, e);
                    Object::Null
                }
            };
            output.objects.insert(new_id, target);
            Ok(Object::Reference(new_id))
        }
        Object::Dictionary(dict) => Ok(Object::Dictionary(copy_dictionary(output, source, dict, copied)?)),
        Object::Array(items) => items.iter()
            .map(|item| copy_object_deep(output, source, item, copied))
            .collect::<PdfResult<Vec<_>>>()
            .map(Object::Array),
        Object::Stream(stream) => {
            let dict = copy_dictionary(output, source, &stream.dict, copied)?;
            let mut copy = Stream::new(dict, stream.content.clone());
            copy.allows_compression = stream.allows_compression;
            Ok(Object::Stream(copy))
        }
        _ => Ok(obj.clone()),
    }
}

fn copy_dictionary(
    output: &mut PdfDocument,
    source: &PdfDocument,
    dict: &Dictionary,
    copied: &mut HashMap<ObjectId, ObjectId>,
) -> PdfResult<Dictionary> {
    let mut copy = Dictionary::new();
    for (key, value) in dict.iter() {
        copy.set(key.clone(), copy_object_deep(output, source, value, copied)?);
    }
    Ok(copy)
}

/// Add `image` to `output` as an RGB Image XObject, with a soft mask when any
/// pixel is not fully opaque.
fn embed_image(output: &mut PdfDocument, image: &RgbaImage) -> PdfResult<ObjectId> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PdfError::Drawing("cannot draw an empty image".to_string()));
    }

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    let mut alpha = Vec::with_capacity(width as usize * height as usize);
    for pixel in image.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    if alpha.iter().any(|&a| a != u8::MAX) {
        let smask_id = output.add_object(Stream::new(dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        }, alpha));
        dict.set("SMask", smask_id);
    }
    Ok(output.add_object(Stream::new(dict, rgb)))
}
