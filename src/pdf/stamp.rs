//! Text watermarks
//!
//! Builds a one-page document with a label drawn across the page diagonal.
//! The page can be used as an overlay template just like a watermark PDF.

use lopdf::content::Operation;
use lopdf::{dictionary, Object, StringFormat};

use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::pdf::document::{Document, Page};
use crate::pdf::objects::ObjectArena;

/// Average Helvetica glyph width as a fraction of the font size
const AVERAGE_GLYPH_WIDTH: f32 = 0.5;

/// Helvetica cap height as a fraction of the font size
const CAP_HEIGHT: f32 = 0.72;

const MAX_FONT_SIZE: f32 = 144.0;

/// Appearance of a text watermark
#[derive(Debug, Clone, Copy)]
pub struct StampOptions {
    /// Page the label is laid out on
    pub page: Rect,
    /// Fixed font size; `None` sizes the label to span most of the diagonal
    pub font_size: Option<f32>,
    /// Fill gray level, 0 (black) to 1 (white)
    pub gray: f32,
    /// Fill opacity, 0 to 1
    pub opacity: f32,
}

impl Default for StampOptions {
    fn default() -> Self {
        Self {
            page: Rect::letter(),
            font_size: None,
            gray: 0.5,
            opacity: 0.3,
        }
    }
}

impl StampOptions {
    pub fn with_page(mut self, page: Rect) -> Self {
        self.page = page;
        self
    }

    pub fn with_font_size(mut self, size: f32) -> Self {
        self.font_size = Some(size);
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }
}

/// Estimate the width of text in points, assuming Helvetica
pub fn estimate_text_width(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * font_size * AVERAGE_GLYPH_WIDTH
}

/// Build a watermark document showing `text` along the page diagonal
pub fn text_watermark(text: &str, options: &StampOptions) -> Result<Document> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidJob("stamp text is empty".to_string()));
    }
    let page = options.page;
    if page.width() <= 0.0 || page.height() <= 0.0 {
        return Err(Error::DegenerateGeometry {
            width: page.width(),
            height: page.height(),
        });
    }

    let diagonal = page.width().hypot(page.height());
    let font_size = options.font_size.unwrap_or_else(|| {
        (diagonal * 0.75 / estimate_text_width(text, 1.0)).min(MAX_FONT_SIZE)
    });
    let (sin, cos) = page.height().atan2(page.width()).sin_cos();

    // Put the middle of the label on the middle of the page
    let half_width = estimate_text_width(text, font_size) / 2.0;
    let half_height = font_size * CAP_HEIGHT / 2.0;
    let cx = page.llx + page.width() / 2.0;
    let cy = page.lly + page.height() / 2.0;
    let x = cx - (cos * half_width - sin * half_height);
    let y = cy - (sin * half_width + cos * half_height);

    let mut objects = ObjectArena::new();
    objects.insert(
        (1, 0),
        Object::Dictionary(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        }),
    );
    objects.insert(
        (2, 0),
        Object::Dictionary(dictionary! {
            "Type" => "ExtGState",
            "ca" => options.opacity.clamp(0.0, 1.0),
            "CA" => options.opacity.clamp(0.0, 1.0),
        }),
    );
    let resources = dictionary! {
        "Font" => dictionary! { "F1" => Object::Reference((1, 0)) },
        "ExtGState" => dictionary! { "GS1" => Object::Reference((2, 0)) },
    };

    let operations = vec![
        Operation::new("q", vec![]),
        Operation::new("gs", vec![Object::Name(b"GS1".to_vec())]),
        Operation::new("g", vec![options.gray.clamp(0.0, 1.0).into()]),
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), font_size.into()]),
        Operation::new(
            "Tm",
            vec![cos.into(), sin.into(), (-sin).into(), cos.into(), x.into(), y.into()],
        ),
        Operation::new("Tj", vec![Object::String(win_ansi(text), StringFormat::Literal)]),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ];

    let mut doc = Document::new();
    doc.push_page(Page::with_content(page, operations, resources, objects));
    Ok(doc)
}

/// Encode text for a WinAnsi font; unmappable characters become `?`
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u8,
            _ => b'?',
        })
        .collect()
}
