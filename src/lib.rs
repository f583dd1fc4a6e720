//! Read, render and re-write PDF pages.
//!
//! A [`Document`] wraps a parsed PDF together with its standard metadata and
//! the geometry of each page. Pages can be rasterized through a
//! [`RasterBackend`], re-drawn into a new PDF through a [`DrawingSurface`],
//! and a sequence of raster images can be wrapped into a PDF with one page
//! per image.
use lopdf::{Dictionary, Document as PdfDocument, Object};
use thiserror::Error;

pub use lopdf;

pub mod encoding;
pub mod geometry;
pub mod metadata;
pub mod surface;
pub mod raster;
mod page;
mod document;
mod images;
#[cfg(feature = "pdfium")]
mod pdfium;

pub use document::{Document, RefreshReport};
pub use geometry::{DeviceTransform, PdfRect, PdfSize, PdfSpace, PdfTransform, PixelSize, PixelSpace};
pub use images::{BuiltPdf, ImagePdfBuilder};
pub use metadata::Metadata;
pub use page::Page;
pub use raster::{RasterBackend, RasterImage};
pub use surface::{DrawingSurface, PdfWriter, WriteOptions};
#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumBackend;

/// Error type for every fallible operation in this crate
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF parsing error: {0}")]
    Parse(#[from] lopdf::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid PDF structure: {0}")]
    InvalidStructure(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Degenerate box: {width}x{height}")]
    DegenerateBox { width: f64, height: f64 },

    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("Document is locked")]
    Locked,

    #[error("Rendering surface unavailable: {0}")]
    SurfaceUnavailable(String),

    #[error("Drawing error: {0}")]
    Drawing(String),

    #[error("No output produced")]
    EmptyOutput,

    #[cfg(feature = "pdfium")]
    #[error("PDFium error: {0}")]
    Pdfium(String),
}

pub type PdfResult<T> = std::result::Result<T, PdfError>;

/// PDF document helper functions
pub mod document_utils {
    use super::*;

    /// Get document catalog
    pub fn get_catalog(doc: &PdfDocument) -> PdfResult<&Dictionary> {
        doc.trailer.get(b"Root")
            .map_err(|_| PdfError::MissingField("Root".to_string()))
            .and_then(|obj| object_utils::maybe_deref(doc, obj))
            .and_then(|obj| obj.as_dict()
                .map_err(|_| PdfError::InvalidStructure("Root must be a dictionary".to_string())))
    }

    /// Get the root of the page tree
    pub fn get_pages(doc: &PdfDocument) -> PdfResult<&Dictionary> {
        let catalog = get_catalog(doc)?;
        catalog.get(b"Pages")
            .map_err(|_| PdfError::MissingField("Pages".to_string()))
            .and_then(|obj| object_utils::maybe_deref(doc, obj))
            .and_then(|obj| obj.as_dict()
                .map_err(|_| PdfError::InvalidStructure("Pages must be a dictionary".to_string())))
    }

    /// Number of pages the page tree claims to hold.
    ///
    /// Falls back to the number of leaves reachable from the tree when
    /// `/Count` is missing or nonsensical. Every page is an object, so the
    /// count never exceeds the number of objects in the file.
    pub fn page_count(doc: &PdfDocument) -> u32 {
        let objects = u32::try_from(doc.objects.len()).unwrap_or(u32::MAX);
        get_pages(doc).ok()
            .and_then(|pages| maybe_get::<i64>(doc, pages, b"Count"))
            .and_then(|count| u32::try_from(count).ok())
            .map(|count| count.min(objects))
            .unwrap_or_else(|| doc.get_pages().len() as u32)
    }
}

/// Object dereferencing and extraction utilities
pub mod object_utils {
    use super::*;

    /// Dereference an object if it's a reference
    pub fn maybe_deref<'a>(doc: &'a PdfDocument, obj: &'a Object) -> PdfResult<&'a Object> {
        match obj {
            Object::Reference(r) => doc.get_object(*r)
                .map_err(PdfError::Parse),
            _ => Ok(obj),
        }
    }

    /// Get object from dictionary with dereferencing
    pub fn maybe_get_obj<'a>(
        doc: &'a PdfDocument,
        dict: &'a Dictionary,
        key: &[u8]
    ) -> Option<&'a Object> {
        dict.get(key).ok()
            .and_then(|o| maybe_deref(doc, o).ok())
    }

    /// Convert object to number
    pub fn as_num(obj: &Object) -> PdfResult<f64> {
        match obj {
            Object::Integer(i) => Ok(*i as f64),
            Object::Real(f) => Ok((*f).into()),
            _ => Err(PdfError::InvalidStructure("Expected number".to_string())),
        }
    }
}

trait FromObj<'a>: Sized {
    fn from_obj(doc: &'a PdfDocument, obj: &'a Object) -> PdfResult<Self>;
}

impl<'a, T: FromObj<'a>> FromObj<'a> for Vec<T> {
    fn from_obj(doc: &'a PdfDocument, obj: &'a Object) -> PdfResult<Self> {
        object_utils::maybe_deref(doc, obj)?
            .as_array()
            .map_err(|_| PdfError::InvalidStructure("Expected array".to_string()))
            .and_then(|arr| {
                arr.iter()
                    .map(|x| T::from_obj(doc, x))
                    .collect::<PdfResult<Vec<_>>>()
            })
    }
}

impl<'a, T: FromObj<'a>, const N: usize> FromObj<'a> for [T; N] {
    fn from_obj(doc: &'a PdfDocument, obj: &'a Object) -> PdfResult<Self> {
        let vec = Vec::<T>::from_obj(doc, obj)?;
        vec.try_into()
            .map_err(|v: Vec<T>| PdfError::InvalidStructure(
                format!("Expected array of length {}, got {}", N, v.len())
            ))
    }
}

impl<'a> FromObj<'a> for f64 {
    fn from_obj(doc: &'a PdfDocument, obj: &'a Object) -> PdfResult<Self> {
        object_utils::as_num(object_utils::maybe_deref(doc, obj)?)
    }
}

impl<'a> FromObj<'a> for i64 {
    fn from_obj(doc: &'a PdfDocument, obj: &'a Object) -> PdfResult<Self> {
        match object_utils::maybe_deref(doc, obj)? {
            Object::Integer(i) => Ok(*i),
            _ => Err(PdfError::InvalidStructure("Expected integer".to_string())),
        }
    }
}

impl<'a> FromObj<'a> for &'a Dictionary {
    fn from_obj(doc: &'a PdfDocument, obj: &'a Object) -> PdfResult<&'a Dictionary> {
        object_utils::maybe_deref(doc, obj)?
            .as_dict()
            .map_err(|_| PdfError::InvalidStructure("Expected dictionary".to_string()))
    }
}

fn maybe_get<'a, T: FromObj<'a>>(doc: &'a PdfDocument, dict: &'a Dictionary, key: &[u8]) -> Option<T> {
    object_utils::maybe_get_obj(doc, dict, key)
        .and_then(|o| T::from_obj(doc, o).ok())
}

/// Deepest page tree walked when resolving inherited attributes.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Look `key` up on `dict`, then on its ancestors in the page tree.
fn get_inherited<'a, T: FromObj<'a>>(doc: &'a PdfDocument, dict: &'a Dictionary, key: &[u8]) -> Option<T> {
    let mut dict = dict;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Some(o) = maybe_get(doc, dict, key) {
            return Some(o);
        }
        let parent = dict.get(b"Parent").ok()?
            .as_reference().ok()?;
        dict = doc.get_dictionary(parent).ok()?;
    }
    None
}
