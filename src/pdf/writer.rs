//! Output document assembly and finalization

use std::collections::HashSet;

use lopdf::{dictionary, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

use crate::error::{Error, Result};
use crate::pdf::compress::Compressor;
use crate::pdf::crypt::Encryptor;
use crate::pdf::document::{Page, DEFAULT_VERSION};
use crate::pdf::objects;

/// What happens to an output document right before it is written
#[derive(Default)]
pub struct FinishOptions {
    compressor: Option<Box<dyn Compressor + Send + Sync>>,
    encryptor: Option<Box<dyn Encryptor + Send + Sync>>,
}

impl FinishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompress page contents and form XObjects
    pub fn compress_with(mut self, compressor: impl Compressor + Send + Sync + 'static) -> Self {
        self.compressor = Some(Box::new(compressor));
        self
    }

    /// Protect the document
    pub fn encrypt_with(mut self, encryptor: impl Encryptor + Send + Sync + 'static) -> Self {
        self.encryptor = Some(Box::new(encryptor));
        self
    }

    pub fn compresses(&self) -> bool {
        self.compressor.is_some()
    }

    pub fn encrypts(&self) -> bool {
        self.encryptor.is_some()
    }
}

/// Pages collected for a single output file
///
/// `finish` consumes the document, so it is finalized exactly once.
#[derive(Debug, Clone)]
pub struct OutputDocument {
    version: String,
    pages: Vec<Page>,
}

impl Default for OutputDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDocument {
    pub fn new() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            pages: Vec::new(),
        }
    }

    pub fn push_page(&mut self, page: Page) {
        self.pages.push(page);
    }

    /// Append a deep copy of `page`
    pub fn append_page(&mut self, page: &Page) {
        self.pages.push(page.clone());
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Compress, then encrypt, then serialize
    pub fn finish(self, options: &FinishOptions) -> Result<Vec<u8>> {
        write_pages(&self.version, &self.pages, options)
    }
}

/// Assemble, finalize and serialize a list of pages
pub(crate) fn write_pages(version: &str, pages: &[Page], options: &FinishOptions) -> Result<Vec<u8>> {
    let (mut doc, content_ids) = assemble(version, pages)?;

    if let Some(compressor) = &options.compressor {
        let changed = compress_streams(&mut doc, &content_ids, compressor.as_ref())?;
        debug!(changed, "compressed content streams");
    }

    // The identifier must be in place before encryption keys are derived
    let plain = save(&mut doc)?;
    let file_id = md5::compute(&plain).0.to_vec();
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::String(file_id.clone(), StringFormat::Hexadecimal),
            Object::String(file_id, StringFormat::Hexadecimal),
        ]),
    );

    if let Some(encryptor) = &options.encryptor {
        encryptor.encrypt(&mut doc)?;
    }

    let bytes = save(&mut doc)?;
    debug!(pages = pages.len(), bytes = bytes.len(), "serialized document");
    Ok(bytes)
}

/// Build a lopdf document holding `pages` in order
///
/// Returns the document and the ids of the page content streams.
fn assemble(version: &str, pages: &[Page]) -> Result<(lopdf::Document, HashSet<ObjectId>)> {
    let mut doc = lopdf::Document::with_version(version);
    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(pages.len());
    let mut content_ids = HashSet::with_capacity(pages.len());

    for page in pages {
        let resources = objects::import_into_document(
            &mut doc,
            page.objects(),
            &Object::Dictionary(page.resources().clone()),
        );
        let content_id = doc.add_object(Stream::new(dictionary! {}, page.content_bytes()?));
        content_ids.insert(content_id);

        let mut page_dict = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => page.media_box().to_pdf_array(),
            "Resources" => resources,
            "Contents" => content_id,
        };
        if page.rotation() != 0 {
            page_dict.set("Rotate", page.rotation());
        }
        kids.push(Object::Reference(doc.add_object(page_dict)));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    Ok((doc, content_ids))
}

fn compress_streams(
    doc: &mut lopdf::Document,
    content_ids: &HashSet<ObjectId>,
    compressor: &dyn Compressor,
) -> Result<usize> {
    let mut changed = 0;
    for (id, object) in doc.objects.iter_mut() {
        if let Object::Stream(stream) = object {
            let is_form = matches!(stream.dict.get(b"Subtype").and_then(Object::as_name), Ok(b"Form"));
            if (content_ids.contains(id) || is_form) && compressor.compress(stream)? {
                changed += 1;
            }
        }
    }
    Ok(changed)
}

fn save(doc: &mut lopdf::Document) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(bytes)
}
