#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use lopdf::{Dictionary, Document, EncryptionState, EncryptionVersion, Object, ObjectId, Permissions, Stream, dictionary};
use pdf_pages::{DeviceTransform, DrawingSurface, Page, PdfRect, PdfResult, PdfTransform, PixelSize, RasterBackend};

pub fn numbers(values: [i64; 4]) -> Object {
    Object::Array(values.iter().map(|&v| Object::Integer(v)).collect())
}

pub fn literal(s: &str) -> Object {
    Object::String(s.as_bytes().to_vec(), lopdf::StringFormat::Literal)
}

/// Builds small PDFs in memory.
pub struct Fixture {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    pages_node: Dictionary,
    count: Option<i64>,
    info: Option<Dictionary>,
}

impl Fixture {
    pub fn new() -> Fixture {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Fixture { doc, pages_id, kids: Vec::new(), pages_node: Dictionary::new(), count: None, info: None }
    }

    /// A page with a media box and a filled square as content.
    pub fn page(self, media_box: [i64; 4]) -> Fixture {
        self.page_dict(dictionary! { "MediaBox" => numbers(media_box) })
    }

    pub fn page_dict(mut self, mut dict: Dictionary) -> Fixture {
        let content = self.doc.add_object(Stream::new(Dictionary::new(), b"0 0 1 rg 0 0 10 10 re f".to_vec()));
        dict.set("Type", "Page");
        dict.set("Parent", self.pages_id);
        dict.set("Contents", content);
        dict.set("Resources", dictionary! {});
        let id = self.doc.add_object(dict);
        self.kids.push(id.into());
        self
    }

    /// Set a key on the root of the page tree, for inheritance.
    pub fn inherit(mut self, key: &str, value: Object) -> Fixture {
        self.pages_node.set(key, value);
        self
    }

    /// Override the page count the tree claims.
    pub fn count(mut self, count: i64) -> Fixture {
        self.count = Some(count);
        self
    }

    pub fn info(mut self, info: Dictionary) -> Fixture {
        self.info = Some(info);
        self
    }

    pub fn into_lopdf(mut self) -> Document {
        let count = self.count.unwrap_or(self.kids.len() as i64);
        let mut pages = self.pages_node;
        pages.set("Type", "Pages");
        pages.set("Kids", self.kids);
        pages.set("Count", count);
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let catalog = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog);
        if let Some(info) = self.info {
            let info = self.doc.add_object(info);
            self.doc.trailer.set("Info", info);
        }
        self.doc
    }

    pub fn to_bytes(self) -> Vec<u8> {
        let mut doc = self.into_lopdf();
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    /// Serialize with 128-bit RC4 encryption, owner password `"owner"`.
    pub fn to_encrypted_bytes(self, user_password: &str, permissions: Permissions) -> Vec<u8> {
        let mut doc = self.into_lopdf();
        doc.trailer.set("ID", Object::Array(vec![
            Object::string_literal("pdf-pages-fixture"),
            Object::string_literal("pdf-pages-fixture"),
        ]));
        let state = EncryptionState::try_from(EncryptionVersion::V2 {
            document: &doc,
            owner_password: "owner",
            user_password,
            key_length: 128,
            permissions,
        }).unwrap();
        doc.encrypt(&state).unwrap();
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }
}

/// Media boxes of every page of a serialized PDF, in page order.
pub fn media_boxes(bytes: &[u8]) -> Vec<[f64; 4]> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages().values().map(|&id| {
        let media_box = doc.get_dictionary(id).unwrap().get(b"MediaBox").unwrap().as_array().unwrap();
        let values: Vec<f64> = media_box.iter().map(|v| match v {
            Object::Integer(i) => *i as f64,
            Object::Real(r) => f64::from(*r),
            other => panic!("not a number: {other:?}"),
        }).collect();
        values.try_into().unwrap()
    }).collect()
}

/// A surface remembering the calls made on it.
#[derive(Default)]
pub struct RecordingSurface {
    pub calls: Vec<String>,
    pub media_boxes: Vec<PdfRect>,
    pub transforms: Vec<PdfTransform>,
}

impl DrawingSurface for RecordingSurface {
    fn begin_page(&mut self, media_box: Option<&PdfRect>) -> PdfResult<()> {
        self.calls.push("begin".to_string());
        self.media_boxes.extend(media_box.copied());
        Ok(())
    }

    fn end_page(&mut self) -> PdfResult<()> {
        self.calls.push("end".to_string());
        Ok(())
    }

    fn save_state(&mut self) -> PdfResult<()> {
        self.calls.push("save".to_string());
        Ok(())
    }

    fn restore_state(&mut self) -> PdfResult<()> {
        self.calls.push("restore".to_string());
        Ok(())
    }

    fn concat(&mut self, transform: &PdfTransform) -> PdfResult<()> {
        self.calls.push("concat".to_string());
        self.transforms.push(*transform);
        Ok(())
    }

    fn draw_page(&mut self, page: &Page<'_>) -> PdfResult<()> {
        self.calls.push(format!("page {}", page.number()));
        Ok(())
    }

    fn draw_image(&mut self, image: &RgbaImage, _rect: &PdfRect) -> PdfResult<()> {
        self.calls.push(format!("image {}x{}", image.width(), image.height()));
        Ok(())
    }
}

/// A backend painting every page in one color and remembering what it was
/// asked to do.
pub struct FillBackend {
    pub refuse: bool,
    pub painted: Vec<(u32, DeviceTransform, (u32, u32))>,
}

impl FillBackend {
    pub fn new() -> FillBackend {
        FillBackend { refuse: false, painted: Vec::new() }
    }
}

impl RasterBackend for FillBackend {
    fn begin_offscreen(&mut self, size: PixelSize) -> Option<RgbaImage> {
        if self.refuse {
            return None;
        }
        pdf_pages::raster::allocate_canvas(size)
    }

    fn paint_page(&mut self, page: &Page<'_>, transform: &DeviceTransform, canvas: &mut RgbaImage) -> PdfResult<()> {
        self.painted.push((page.number(), *transform, canvas.dimensions()));
        for pixel in canvas.pixels_mut() {
            *pixel = Rgba([0, 0, 255, 255]);
        }
        Ok(())
    }
}
