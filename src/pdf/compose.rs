//! Page compositing: stamp one page on top of another
//!
//! The overlay is scaled so its bounding box covers the base page's
//! bounding box. Both content sequences are isolated in their own
//! graphics state, and overlay resources that clash with base resource
//! names are renamed before being merged into the result.

use std::collections::{HashMap, HashSet};

use lopdf::content::Operation;
use lopdf::{Dictionary, Object};
use tracing::trace;

use crate::error::{Error, Result};
use crate::geometry::{Matrix, Rect};
use crate::pdf::document::Page;
use crate::pdf::objects::{self, ObjectArena};

/// Resource categories whose entries are referenced by name from content
const NAMED_CATEGORIES: [&[u8]; 7] = [
    b"Font",
    b"XObject",
    b"ExtGState",
    b"ColorSpace",
    b"Pattern",
    b"Shading",
    b"Properties",
];

type Renames = HashMap<Vec<u8>, HashMap<Vec<u8>, Vec<u8>>>;

/// Fail when `overlay` cannot be scaled onto another page
pub fn check_overlay(overlay: &Page) -> Result<()> {
    let bbox = overlay.media_box();
    if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
        return Err(Error::DegenerateGeometry {
            width: bbox.width(),
            height: bbox.height(),
        });
    }
    Ok(())
}

/// Transformation that maps `overlay` onto `base`, corner to corner
pub fn fit_transform(base: &Rect, overlay: &Rect) -> Result<Matrix> {
    if overlay.width() <= 0.0 || overlay.height() <= 0.0 {
        return Err(Error::DegenerateGeometry {
            width: overlay.width(),
            height: overlay.height(),
        });
    }
    let sx = base.width() / overlay.width();
    let sy = base.height() / overlay.height();
    Ok(Matrix::translate(-overlay.llx, -overlay.lly)
        .then(&Matrix::scale(sx, sy))
        .then(&Matrix::translate(base.llx, base.lly)))
}

/// Draw `overlay` over `base`, scaled to fit, and return the new page
///
/// Neither input is modified. The result keeps the base page's bounding
/// box and rotation.
pub fn compose(base: &Page, overlay: &Page) -> Result<Page> {
    let fit = fit_transform(&base.media_box(), &overlay.media_box())?;

    let mut arena = base.objects().clone();
    let overlay_resources = objects::import(
        &mut arena,
        overlay.objects(),
        &Object::Dictionary(overlay.resources().clone()),
    );
    let overlay_resources = match overlay_resources {
        Object::Dictionary(dict) => dict,
        _ => Dictionary::new(),
    };

    let (resources, renames) = merge_resources(base.resources(), &overlay_resources, &arena);

    let mut operations = Vec::with_capacity(base.operations().len() + overlay.operations().len() + 5);
    operations.push(Operation::new("q", vec![]));
    operations.extend(base.operations().iter().cloned());
    operations.push(Operation::new("Q", vec![]));
    operations.push(Operation::new("q", vec![]));
    operations.push(Operation::new("cm", fit.to_operands()));
    operations.extend(
        overlay
            .operations()
            .iter()
            .map(|op| rename_operands(op, &renames)),
    );
    operations.push(Operation::new("Q", vec![]));

    let mut page = Page::with_content(base.media_box(), operations, resources, arena);
    page.set_rotation(base.rotation());
    Ok(page)
}

/// Merge overlay resources into a copy of the base resources
///
/// Both dictionaries must already point into `arena`. Named categories are
/// inlined so the result never aliases a category dictionary that another
/// page might share.
fn merge_resources(base: &Dictionary, overlay: &Dictionary, arena: &ObjectArena) -> (Dictionary, Renames) {
    let mut merged = base.clone();
    let mut renames = Renames::new();

    for (key, overlay_value) in overlay.iter() {
        let category = key.as_slice();

        if NAMED_CATEGORIES.contains(&category) {
            let base_entries = merged
                .get(category)
                .ok()
                .and_then(|v| objects::resolve_dict(arena, v))
                .cloned()
                .unwrap_or_default();
            let overlay_entries = match objects::resolve_dict(arena, overlay_value) {
                Some(dict) => dict,
                None => continue,
            };

            let mut taken: HashSet<Vec<u8>> = base_entries.iter().map(|(n, _)| n.clone()).collect();
            taken.extend(overlay_entries.iter().map(|(n, _)| n.clone()));

            let mut combined = base_entries.clone();
            let mut category_renames = HashMap::new();
            for (name, value) in overlay_entries.iter() {
                let target = if base_entries.has(name) {
                    let fresh = fresh_name(name, &taken);
                    taken.insert(fresh.clone());
                    category_renames.insert(name.clone(), fresh.clone());
                    fresh
                } else {
                    name.clone()
                };
                combined.set(target, value.clone());
            }

            if !category_renames.is_empty() {
                trace!(
                    category = %String::from_utf8_lossy(category),
                    renamed = category_renames.len(),
                    "renamed clashing overlay resources"
                );
                renames.insert(category.to_vec(), category_renames);
            }
            merged.set(key.clone(), Object::Dictionary(combined));
        } else if category == b"ProcSet" {
            let mut sets: Vec<Object> = merged
                .get(b"ProcSet")
                .ok()
                .and_then(|v| objects::resolve(arena, v))
                .and_then(|v| v.as_array().ok())
                .cloned()
                .unwrap_or_default();
            if let Some(Ok(extra)) = objects::resolve(arena, overlay_value).map(Object::as_array) {
                for item in extra {
                    let name = item.as_name().ok();
                    if !sets.iter().any(|s| s.as_name().ok() == name) {
                        sets.push(item.clone());
                    }
                }
            }
            merged.set("ProcSet", Object::Array(sets));
        } else if !merged.has(category) {
            merged.set(key.clone(), overlay_value.clone());
        }
    }

    (merged, renames)
}

fn fresh_name(name: &[u8], taken: &HashSet<Vec<u8>>) -> Vec<u8> {
    (1..)
        .map(|n| {
            let mut candidate = name.to_vec();
            candidate.extend_from_slice(format!("_o{n}").as_bytes());
            candidate
        })
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_vec())
}

/// Which operand of an operator names a resource, and in which category
fn resource_operand(operator: &str, operands: &[Object]) -> Option<(usize, &'static str)> {
    match operator {
        "Tf" => Some((0, "Font")),
        "Do" => Some((0, "XObject")),
        "gs" => Some((0, "ExtGState")),
        "cs" | "CS" => Some((0, "ColorSpace")),
        "sh" => Some((0, "Shading")),
        "scn" | "SCN" => match operands.last() {
            Some(Object::Name(_)) => Some((operands.len() - 1, "Pattern")),
            _ => None,
        },
        "BDC" | "DP" => Some((1, "Properties")),
        _ => None,
    }
}

fn rename_operands(op: &Operation, renames: &Renames) -> Operation {
    let mut op = op.clone();
    if renames.is_empty() {
        return op;
    }
    if let Some((index, category)) = resource_operand(&op.operator, &op.operands) {
        if let (Some(Object::Name(name)), Some(map)) = (op.operands.get_mut(index), renames.get(category.as_bytes())) {
            if let Some(fresh) = map.get(name.as_slice()) {
                *name = fresh.clone();
            }
        }
    }
    op
}
