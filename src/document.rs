use std::borrow::Cow;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use euclid::Rect;
use log::{debug, warn};
use lopdf::{Document as PdfDocument, Error, Permissions, encryption::DecryptionError};

use crate::document_utils::page_count;
use crate::geometry::PdfSize;
use crate::images::ImagePdfBuilder;
use crate::metadata::Metadata;
use crate::page::{Page, PageRecord};
use crate::raster::RasterImage;
use crate::surface::{PdfWriter, WriteOptions};
use crate::{PdfError, PdfResult, object_utils};

/// Encryption state of a loaded file.
#[derive(Debug, Clone, Copy)]
struct Security {
    permissions: Permissions,
    unlocked: bool,
}

/// The parsed file and what we know about its encryption.
struct Reference {
    pdf: PdfDocument,
    security: Option<Security>,
}

impl Reference {
    /// `lopdf` decrypts files whose user password is empty while parsing.
    /// Those arrive with an `encryption_state` and no `/Encrypt` entry.
    fn new(pdf: PdfDocument) -> Reference {
        let security = if let Some(state) = &pdf.encryption_state {
            Some(Security { permissions: state.permissions(), unlocked: true })
        } else if pdf.is_encrypted() {
            Some(Security {
                permissions: encrypt_permissions(&pdf).unwrap_or_else(Permissions::all),
                unlocked: false,
            })
        } else {
            None
        };
        Reference { pdf, security }
    }

    fn is_locked(&self) -> bool {
        self.security.is_some_and(|s| !s.unlocked)
    }

    fn allows(&self, permission: Permissions) -> bool {
        match self.security {
            Some(security) => security.permissions.contains(permission),
            None => true,
        }
    }

    fn decrypt(&mut self, password: &str) -> PdfResult<()> {
        let Some(security) = self.security.as_mut() else {
            return Ok(());
        };
        if security.unlocked {
            return Ok(());
        }
        match self.pdf.decrypt(password) {
            Ok(()) => {
                if let Some(state) = &self.pdf.encryption_state {
                    security.permissions = state.permissions();
                }
                security.unlocked = true;
                Ok(())
            }
            Err(Error::Decryption(DecryptionError::IncorrectPassword)) => Err(PdfError::IncorrectPassword),
            Err(e) => Err(PdfError::Parse(e)),
        }
    }
}

/// Permissions from the `/P` entry of a still encrypted file.
fn encrypt_permissions(pdf: &PdfDocument) -> Option<Permissions> {
    let encrypt = pdf.trailer.get(b"Encrypt").ok()?;
    let encrypt = object_utils::maybe_deref(pdf, encrypt).ok()?.as_dict().ok()?;
    let p = encrypt.get(b"P").ok()?.as_i64().ok()?;
    Some(Permissions::from_bits_truncate(p as u64))
}

/// Pages left out by a [`Document::refresh`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Numbers of the pages that could not be resolved, in order.
    pub skipped: Vec<u32>,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// A PDF document: its pages, their geometry and the standard metadata.
pub struct Document {
    reference: Reference,
    raw_bytes: Option<Vec<u8>>,
    pages: Vec<PageRecord>,
    metadata: Metadata,
}

impl Document {
    /// Parse a PDF held in memory.
    ///
    /// Encrypted files are opened with the empty user password when that
    /// works, the way viewers do; otherwise the document stays locked until
    /// [`Document::unlock`] succeeds.
    pub fn from_bytes(bytes: Vec<u8>) -> PdfResult<Document> {
        let pdf = PdfDocument::load_mem(&bytes)?;
        let reference = Reference::new(pdf);
        if reference.is_locked() {
            debug!("Empty password does not open the document");
        }
        Ok(Document::with_reference(reference, Some(bytes)))
    }

    /// Parse an encrypted PDF and unlock it with `password`.
    pub fn from_bytes_with_password(bytes: Vec<u8>, password: &str) -> PdfResult<Document> {
        let mut doc = Document::from_bytes(bytes)?;
        if !doc.unlock(password) {
            debug!("Wrong password for encrypted document");
            return Err(PdfError::IncorrectPassword);
        }
        Ok(doc)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> PdfResult<Document> {
        Document::from_bytes(std::fs::read(path)?)
    }

    /// Wrap a document parsed elsewhere. The document has no raw bytes.
    pub fn from_reference(pdf: PdfDocument) -> Document {
        Document::with_reference(Reference::new(pdf), None)
    }

    /// Build a document with one page per image that has pixels.
    pub fn from_images(images: &[RasterImage]) -> PdfResult<Document> {
        let built = ImagePdfBuilder::new().build(images)?;
        Document::from_bytes(built.bytes)
    }

    fn with_reference(reference: Reference, raw_bytes: Option<Vec<u8>>) -> Document {
        let mut doc = Document {
            reference,
            raw_bytes,
            pages: Vec::new(),
            metadata: Metadata::default(),
        };
        doc.refresh();
        doc
    }

    /// Re-read metadata and page geometry from the parsed file.
    ///
    /// Pages that cannot be resolved, or whose media box is degenerate, are
    /// left out and listed in the report. A locked document has no readable
    /// metadata.
    pub fn refresh(&mut self) -> RefreshReport {
        let pdf = &self.reference.pdf;
        self.metadata = if self.reference.is_locked() {
            Metadata::default()
        } else {
            Metadata::from_document(pdf)
        };

        let ids = pdf.get_pages();
        let count = page_count(pdf);
        let mut report = RefreshReport::default();
        self.pages.clear();
        for number in 1..=count {
            let Some(&id) = ids.get(&number) else {
                warn!("Skipping page {}: not in the page tree", number);
                report.skipped.push(number);
                continue;
            };
            match PageRecord::resolve(pdf, number, id) {
                Ok(record) => self.pages.push(record),
                Err(e) => {
                    warn!("Skipping page {}: {}", number, e);
                    report.skipped.push(number);
                }
            }
        }

        debug!("Loaded PDF {} with {} of {} pages (encrypted: {}, locked: {})",
               self.reference.pdf.version, self.pages.len(), count,
               self.is_encrypted(), self.reference.is_locked());
        report
    }

    /// Try to unlock an encrypted document with `password`.
    ///
    /// Unlocking a locked document refreshes it so the metadata hidden by
    /// encryption becomes visible. A failed attempt changes nothing, and
    /// documents that are not locked report success without refreshing.
    pub fn unlock(&mut self, password: &str) -> bool {
        if !self.reference.is_locked() {
            return true;
        }
        match self.reference.decrypt(password) {
            Ok(()) => {
                debug!("Document unlocked");
                self.refresh();
                true
            }
            Err(e) => {
                debug!("Unlock failed: {}", e);
                false
            }
        }
    }

    pub fn pages(&self) -> impl ExactSizeIterator<Item = Page<'_>> + '_ {
        self.pages.iter().map(move |record| Page::new(self, record))
    }

    /// The page numbered `number`, if it was resolved.
    pub fn page(&self, number: u32) -> Option<Page<'_>> {
        self.pages.iter()
            .find(|record| record.number == number)
            .map(|record| Page::new(self, record))
    }

    /// Number of pages the file declares, including any that were skipped.
    pub fn page_count(&self) -> u32 {
        page_count(&self.reference.pdf)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Metadata to be written by the next write. [`Document::refresh`]
    /// discards edits.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.title.as_deref()
    }

    pub fn author(&self) -> Option<&str> {
        self.metadata.author.as_deref()
    }

    pub fn creator(&self) -> Option<&str> {
        self.metadata.creator.as_deref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.metadata.subject.as_deref()
    }

    pub fn is_encrypted(&self) -> bool {
        self.reference.security.is_some()
    }

    pub fn is_unlocked(&self) -> bool {
        !self.reference.is_locked()
    }

    pub fn allows_copying(&self) -> bool {
        self.reference.allows(Permissions::COPYABLE)
    }

    pub fn allows_printing(&self) -> bool {
        self.reference.allows(Permissions::PRINTABLE)
    }

    /// `(major, minor)` from the file header, `(0, 0)` when unparsable.
    pub fn version(&self) -> (u32, u32) {
        parse_version(&self.reference.pdf.version).unwrap_or((0, 0))
    }

    /// The bytes this document was loaded from, if any.
    pub fn raw_bytes(&self) -> Option<&[u8]> {
        self.raw_bytes.as_deref()
    }

    pub fn reference(&self) -> &PdfDocument {
        &self.reference.pdf
    }

    /// A serialized copy of the file that opens without a password.
    ///
    /// Files that were never encrypted hand back [`Document::raw_bytes`].
    /// Decrypted files are written out again, since their raw bytes still
    /// hold ciphertext.
    pub fn plain_bytes(&self) -> PdfResult<Cow<'_, [u8]>> {
        if self.reference.is_locked() {
            return Err(PdfError::Locked);
        }
        match (&self.raw_bytes, self.reference.security) {
            (Some(bytes), None) => Ok(Cow::Borrowed(bytes.as_slice())),
            _ => {
                let mut bytes = Vec::new();
                self.reference.pdf.clone().save_to(&mut bytes)?;
                Ok(Cow::Owned(bytes))
            }
        }
    }

    /// Write a new PDF with every page redrawn at its own size.
    pub fn write_to<W: Write>(&self, out: &mut W) -> PdfResult<()> {
        self.write_with(out, &WriteOptions::default(), None)
    }

    /// Fails with [`PdfError::Locked`] while the document is locked.
    pub fn write_with<W: Write>(&self, out: &mut W, options: &WriteOptions, page_size: Option<&PdfSize>) -> PdfResult<()> {
        if self.reference.is_locked() {
            return Err(PdfError::Locked);
        }
        let default_box = self.pages.last().map(|page| page.frame).unwrap_or_else(Rect::zero);
        let mut writer = PdfWriter::with_options(default_box, self.metadata.to_info_dictionary(), options);
        for page in self.pages() {
            match page_size {
                Some(size) => page.draw_onto_page_at_size(&mut writer, size)?,
                None => page.draw_onto_page(&mut writer)?,
            }
        }
        writer.finish_to(out)
    }

    /// Write to `path`. The file is only created once the whole document has
    /// been rendered.
    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> PdfResult<()> {
        let bytes = self.to_bytes()?;
        let mut file = File::create(path)?;
        file.write_all(&bytes)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> PdfResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }

    /// Write with every page's crop box stretched over a page of `page_size`.
    pub fn to_bytes_normalized(&self, page_size: &PdfSize) -> PdfResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_with(&mut bytes, &WriteOptions::default(), Some(page_size))?;
        Ok(bytes)
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.reference.pdf.version)
            .field("pages", &self.pages.len())
            .field("metadata", &self.metadata)
            .field("security", &self.reference.security)
            .finish()
    }
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let (major, minor) = version.trim().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}
