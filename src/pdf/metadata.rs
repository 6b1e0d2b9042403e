//! PDF metadata extraction

use std::path::Path;

use lopdf::{Document, Object};

use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::pdf::crypt;
use crate::pdf::document::inherited_attribute;

/// PDF metadata
#[derive(Debug, Clone)]
pub struct PdfMetadata {
    /// Number of pages in the PDF
    pub page_count: usize,
    /// PDF version from the header
    pub version: String,
    /// Document title (if present)
    pub title: Option<String>,
    /// Document author (if present)
    pub author: Option<String>,
    /// Whether the file is password protected
    pub encrypted: bool,
    /// Bounding box of every page, in order
    pub page_sizes: Vec<Rect>,
}

/// Count pages by reading the Count field from the Pages dictionary
fn count_pages_from_catalog(doc: &Document) -> Result<usize> {
    let catalog = doc
        .catalog()
        .map_err(|_| Error::Parse("trailer has no document catalog".to_string()))?;
    let pages_id = catalog
        .get(b"Pages")
        .and_then(Object::as_reference)
        .map_err(|_| Error::Parse("catalog has no page tree".to_string()))?;
    let pages = doc
        .get_dictionary(pages_id)
        .map_err(|_| Error::Parse("page tree root is not a dictionary".to_string()))?;

    match pages.get(b"Count").and_then(Object::as_i64) {
        Ok(n) if n >= 0 => Ok(n as usize),
        _ => Err(Error::Parse("page tree has no valid Count".to_string())),
    }
}

/// Extract metadata from PDF bytes
///
/// Encrypted files are opened with the empty password when possible;
/// otherwise only the page tree is read and title and author are left out.
pub fn inspect(bytes: &[u8]) -> Result<PdfMetadata> {
    let mut doc = crypt::read_objects(bytes)?;
    let encrypted = doc.trailer.has(b"Encrypt");
    let readable = !encrypted || crypt::decrypt_document(&mut doc, "").is_ok();

    let page_count = count_pages_from_catalog(&doc)?;

    let mut page_sizes = Vec::with_capacity(page_count);
    for (_, page_id) in doc.get_pages() {
        let bbox = inherited_attribute(&doc, page_id, b"MediaBox")?
            .and_then(|value| match value {
                Object::Reference(id) => doc.get_object(*id).ok(),
                other => Some(other),
            })
            .and_then(|value| value.as_array().ok())
            .and_then(|array| Rect::from_pdf_array(array))
            .unwrap_or_else(Rect::letter);
        page_sizes.push(bbox);
    }

    let (title, author) = if readable {
        (info_string(&doc, b"Title"), info_string(&doc, b"Author"))
    } else {
        (None, None)
    };

    Ok(PdfMetadata {
        page_count,
        version: doc.version.clone(),
        title,
        author,
        encrypted,
        page_sizes,
    })
}

/// Extract metadata from a PDF file
pub fn inspect_path(path: &Path) -> Result<PdfMetadata> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    inspect(&std::fs::read(path)?)
}

/// Count the number of pages in a PDF file
///
/// This is a quick operation that reads the Count field from the Pages dictionary.
pub fn count_pages(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let doc = crypt::read_objects(&std::fs::read(path)?)?;
    count_pages_from_catalog(&doc)
}

fn info_string(doc: &Document, key: &[u8]) -> Option<String> {
    let info = match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok()?,
        Object::Dictionary(dict) => dict,
        _ => return None,
    };
    let text = decode_text_string(info.get(key).ok()?.as_str().ok()?);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Decode a PDF text string: UTF-16BE with a byte order mark, else Latin-1
pub fn decode_text_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        _ => bytes.iter().map(|&b| b as char).collect(),
    }
}
