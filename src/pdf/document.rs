//! In-memory document model
//!
//! A [`Document`] is an ordered list of [`Page`]s. Every page owns its
//! content as decoded operations and its resources as a self-contained
//! object arena, so pages can be cloned, composed and moved between
//! documents without any shared state.

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId};
use tracing::debug;

use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::pdf::crypt;
use crate::pdf::objects::{self, ObjectArena};
use crate::pdf::writer::{self, FinishOptions};

/// Default PDF version of documents built from scratch
pub const DEFAULT_VERSION: &str = "1.5";

/// A single page: bounding box, content operations and owned resources
#[derive(Debug, Clone)]
pub struct Page {
    pub(crate) media_box: Rect,
    pub(crate) rotation: i64,
    pub(crate) operations: Vec<Operation>,
    pub(crate) resources: Dictionary,
    pub(crate) objects: ObjectArena,
}

impl Page {
    /// An empty page with the given bounding box
    pub fn new(media_box: Rect) -> Self {
        Self {
            media_box,
            rotation: 0,
            operations: Vec::new(),
            resources: Dictionary::new(),
            objects: ObjectArena::new(),
        }
    }

    /// A page with content operations and resources whose references point
    /// into `objects`
    pub fn with_content(
        media_box: Rect,
        operations: Vec<Operation>,
        resources: Dictionary,
        objects: ObjectArena,
    ) -> Self {
        Self {
            media_box,
            rotation: 0,
            operations,
            resources,
            objects,
        }
    }

    pub fn media_box(&self) -> Rect {
        self.media_box
    }

    pub fn width(&self) -> f32 {
        self.media_box.width()
    }

    pub fn height(&self) -> f32 {
        self.media_box.height()
    }

    /// Clockwise rotation in degrees: 0, 90, 180 or 270
    pub fn rotation(&self) -> i64 {
        self.rotation
    }

    pub fn set_rotation(&mut self, degrees: i64) {
        self.rotation = degrees.rem_euclid(360) / 90 * 90;
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn operations_mut(&mut self) -> &mut Vec<Operation> {
        &mut self.operations
    }

    pub fn resources(&self) -> &Dictionary {
        &self.resources
    }

    /// Number of indirect objects owned by this page
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub(crate) fn objects(&self) -> &ObjectArena {
        &self.objects
    }

    /// Names defined in one resource category (`Font`, `XObject`, ...)
    pub fn resource_names(&self, category: &[u8]) -> Vec<Vec<u8>> {
        self.resources
            .get(category)
            .ok()
            .and_then(|entry| objects::resolve_dict(&self.objects, entry))
            .map(|dict| dict.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    /// Decoded content stream bytes
    pub fn content_bytes(&self) -> Result<Vec<u8>> {
        Content {
            operations: self.operations.clone(),
        }
        .encode()
        .map_err(|e| Error::Serialization(format!("cannot encode page content: {e}")))
    }
}

/// An ordered sequence of pages
#[derive(Debug, Clone)]
pub struct Document {
    version: String,
    pages: Vec<Page>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            pages: Vec::new(),
        }
    }

    /// Parse a PDF, opening it with the empty user password if it is encrypted
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Self::parse_with_password(bytes, "")
    }

    /// Parse a PDF, opening it with `password` if it is encrypted
    pub fn parse_with_password(bytes: &[u8], password: &str) -> Result<Self> {
        if !has_header_near_start(bytes) {
            return Err(Error::Parse("missing %PDF- header".to_string()));
        }

        let raw = crypt::load_document(bytes, password)?;
        Self::from_lopdf(&raw)
    }

    /// Read and parse a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        Self::parse(&std::fs::read(path)?)
    }

    /// Build the model from an already loaded (and decrypted) lopdf document
    pub fn from_lopdf(raw: &lopdf::Document) -> Result<Self> {
        let catalog = raw
            .catalog()
            .map_err(|_| Error::Parse("trailer has no document catalog".to_string()))?;
        catalog
            .get(b"Pages")
            .and_then(Object::as_reference)
            .map_err(|_| Error::Parse("catalog has no page tree".to_string()))?;

        let page_ids = raw.get_pages();
        let mut pages = Vec::with_capacity(page_ids.len());
        for (number, page_id) in page_ids {
            let page = read_page(raw, page_id)
                .map_err(|e| Error::Parse(format!("page {number}: {}", strip_parse_prefix(e))))?;
            pages.push(page);
        }

        debug!(pages = pages.len(), version = %raw.version, "parsed document");
        Ok(Self {
            version: raw.version.clone(),
            pages,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn page_mut(&mut self, index: usize) -> Option<&mut Page> {
        self.pages.get_mut(index)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Append a deep copy of a page owned elsewhere
    pub fn append_page(&mut self, page: &Page) {
        self.pages.push(page.clone());
    }

    /// Append an owned page
    pub fn push_page(&mut self, page: Page) {
        self.pages.push(page);
    }

    /// Give up ownership of the pages
    pub fn into_pages(self) -> Vec<Page> {
        self.pages
    }

    /// Serialize to PDF bytes; the same document always yields the same bytes
    pub fn serialize(&self) -> Result<Vec<u8>> {
        writer::write_pages(&self.version, &self.pages, &FinishOptions::new())
    }
}

fn read_page(raw: &lopdf::Document, page_id: ObjectId) -> Result<Page> {
    let media_box = match inherited_attribute(raw, page_id, b"MediaBox")? {
        Some(value) => {
            let array = resolve(raw, value)?
                .as_array()
                .map_err(|_| Error::Parse("MediaBox is not an array".to_string()))?;
            Rect::from_pdf_array(array)
                .ok_or_else(|| Error::Parse("MediaBox is not a rectangle".to_string()))?
        }
        None => Rect::letter(),
    };

    let rotation = match inherited_attribute(raw, page_id, b"Rotate")? {
        Some(value) => resolve(raw, value)?.as_i64().unwrap_or(0),
        None => 0,
    };

    let resources_root = match inherited_attribute(raw, page_id, b"Resources")? {
        Some(value) => match resolve(raw, value)? {
            Object::Dictionary(dict) => Object::Dictionary(dict.clone()),
            _ => return Err(Error::Parse("Resources is not a dictionary".to_string())),
        },
        None => Object::Dictionary(Dictionary::new()),
    };
    let (resources, objects) = objects::extract_closure(raw, &resources_root)?;
    let resources = match resources {
        Object::Dictionary(dict) => dict,
        _ => Dictionary::new(),
    };

    let content = page_content(raw, page_id)?;
    let operations = Content::decode(&content)
        .map_err(|e| Error::Parse(format!("undecodable content stream: {e}")))?
        .operations;

    let mut page = Page {
        media_box,
        rotation: 0,
        operations,
        resources,
        objects,
    };
    page.set_rotation(rotation);
    Ok(page)
}

/// Look an attribute up on the page, then on each ancestor in the page tree
pub(crate) fn inherited_attribute<'a>(
    raw: &'a lopdf::Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>> {
    let mut current = page_id;
    // Bounded walk; malformed trees may loop
    for _ in 0..64 {
        let dict = raw
            .get_dictionary(current)
            .map_err(|_| Error::Parse(format!("page node {} {} R is missing", current.0, current.1)))?;
        if let Ok(value) = dict.get(key) {
            return Ok(Some(value));
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => current = parent,
            Err(_) => return Ok(None),
        }
    }
    Err(Error::Parse("page tree is too deep or cyclic".to_string()))
}

fn resolve<'a>(raw: &'a lopdf::Document, object: &'a Object) -> Result<&'a Object> {
    match object {
        Object::Reference(id) => raw.get_object(*id).map_err(|_| {
            Error::Parse(format!("unresolvable object reference {} {} R", id.0, id.1))
        }),
        other => Ok(other),
    }
}

/// Concatenate and decode every content stream of a page
fn page_content(raw: &lopdf::Document, page_id: ObjectId) -> Result<Vec<u8>> {
    let page = raw
        .get_dictionary(page_id)
        .map_err(|_| Error::Parse("page object is not a dictionary".to_string()))?;

    let contents = match page.get(b"Contents") {
        Ok(contents) => resolve(raw, contents)?,
        Err(_) => return Ok(Vec::new()),
    };

    let streams: Vec<&Object> = match contents {
        Object::Array(items) => items
            .iter()
            .map(|item| resolve(raw, item))
            .collect::<Result<_>>()?,
        single => vec![single],
    };

    let mut content = Vec::new();
    for object in streams {
        let stream = object
            .as_stream()
            .map_err(|_| Error::Parse("page content is not a stream".to_string()))?;
        if stream.dict.has(b"Filter") {
            let decoded = stream
                .decompressed_content()
                .map_err(|e| Error::Parse(format!("cannot decode content stream: {e}")))?;
            content.extend_from_slice(&decoded);
        } else {
            content.extend_from_slice(&stream.content);
        }
        content.push(b'\n');
    }
    Ok(content)
}

/// Some producers put junk before the header; readers accept it within 1 KiB
fn has_header_near_start(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(1024)];
    window.windows(5).any(|w| w == b"%PDF-")
}

fn strip_parse_prefix(error: Error) -> String {
    match error {
        Error::Parse(reason) => reason,
        other => other.to_string(),
    }
}
