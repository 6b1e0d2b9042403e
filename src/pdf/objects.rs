//! Object graph helpers
//!
//! Pages own their resources through a page-local arena: a map from object id
//! to object that holds every object the page's resources reach. Copying a
//! page between documents is then a matter of renumbering one arena into
//! another, and no two documents ever share an object.

use std::collections::{BTreeMap, HashMap, VecDeque};

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{Error, Result};

/// Objects owned by a single page, keyed by arena-local ids
pub type ObjectArena = BTreeMap<ObjectId, Object>;

/// Copy `root` and every object it reaches in `doc` into a fresh arena
///
/// References are renumbered from 1 in discovery order. References to page
/// tree nodes (`/Type /Page` or `/Pages`) and `/Parent` back links are cut
/// to `null` so a resource can never drag other pages along with it.
/// A reference that does not resolve is a parse error.
pub fn extract_closure(doc: &Document, root: &Object) -> Result<(Object, ObjectArena)> {
    let mut id_map: HashMap<ObjectId, ObjectId> = HashMap::new();
    let mut queue: VecDeque<ObjectId> = VecDeque::new();
    let mut next = 1u32;

    collect_references(root, &mut |id| {
        if !id_map.contains_key(&id) {
            id_map.insert(id, (next, 0));
            next += 1;
            queue.push_back(id);
        }
    });

    let mut found: Vec<(ObjectId, &Object)> = Vec::new();
    while let Some(id) = queue.pop_front() {
        let object = doc.get_object(id).map_err(|_| {
            Error::Parse(format!("unresolvable object reference {} {} R", id.0, id.1))
        })?;

        if is_page_tree_node(object) {
            id_map.remove(&id);
            continue;
        }

        collect_references(object, &mut |child| {
            if !id_map.contains_key(&child) {
                id_map.insert(child, (next, 0));
                next += 1;
                queue.push_back(child);
            }
        });
        found.push((id, object));
    }

    let mut arena = ObjectArena::new();
    for (old_id, object) in found {
        if let Some(new_id) = id_map.get(&old_id) {
            arena.insert(*new_id, renumber_object_references(object, &id_map));
        }
    }

    Ok((renumber_object_references(root, &id_map), arena))
}

/// Move the objects of `source` into `target` under fresh ids
///
/// Returns `root` with its references rewritten to the new ids.
pub fn import(target: &mut ObjectArena, source: &ObjectArena, root: &Object) -> Object {
    let mut next = target.keys().map(|id| id.0).max().unwrap_or(0) + 1;
    let mut id_map = HashMap::with_capacity(source.len());
    for old_id in source.keys() {
        id_map.insert(*old_id, (next, 0));
        next += 1;
    }

    for (old_id, object) in source {
        target.insert(id_map[old_id], renumber_object_references(object, &id_map));
    }

    renumber_object_references(root, &id_map)
}

/// Move the objects of `source` into a lopdf document under fresh ids
pub fn import_into_document(doc: &mut Document, source: &ObjectArena, root: &Object) -> Object {
    let mut id_map = HashMap::with_capacity(source.len());
    for old_id in source.keys() {
        id_map.insert(*old_id, doc.new_object_id());
    }

    for (old_id, object) in source {
        doc.objects
            .insert(id_map[old_id], renumber_object_references(object, &id_map));
    }

    renumber_object_references(root, &id_map)
}

/// Follow a reference inside an arena; direct objects are returned as-is
pub fn resolve<'a>(arena: &'a ObjectArena, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => arena.get(id),
        other => Some(other),
    }
}

/// Resolve a dictionary-valued entry, whether inline or referenced
pub fn resolve_dict<'a>(arena: &'a ObjectArena, object: &'a Object) -> Option<&'a Dictionary> {
    match resolve(arena, object)? {
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Renumber all object references in an object
///
/// References missing from `id_map` become `null`.
pub fn renumber_object_references(object: &Object, id_map: &HashMap<ObjectId, ObjectId>) -> Object {
    match object {
        Object::Reference(old_id) => match id_map.get(old_id) {
            Some(new_id) => Object::Reference(*new_id),
            None => Object::Null,
        },
        Object::Array(arr) => Object::Array(
            arr.iter()
                .map(|obj| renumber_object_references(obj, id_map))
                .collect(),
        ),
        Object::Dictionary(dict) => Object::Dictionary(renumber_dictionary(dict, id_map)),
        Object::Stream(stream) => {
            let mut stream = stream.clone();
            stream.dict = renumber_dictionary(&stream.dict, id_map);
            Object::Stream(stream)
        }
        _ => object.clone(),
    }
}

fn renumber_dictionary(dict: &Dictionary, id_map: &HashMap<ObjectId, ObjectId>) -> Dictionary {
    let mut new_dict = Dictionary::new();
    for (key, value) in dict.iter() {
        if key.as_slice() == b"Parent" {
            continue;
        }
        new_dict.set(key.clone(), renumber_object_references(value, id_map));
    }
    new_dict
}

fn collect_references(object: &Object, visit: &mut impl FnMut(ObjectId)) {
    match object {
        Object::Reference(id) => visit(*id),
        Object::Array(arr) => arr.iter().for_each(|obj| collect_references(obj, visit)),
        Object::Dictionary(dict) => collect_dictionary_references(dict, visit),
        Object::Stream(stream) => collect_dictionary_references(&stream.dict, visit),
        _ => {}
    }
}

fn collect_dictionary_references(dict: &Dictionary, visit: &mut impl FnMut(ObjectId)) {
    for (key, value) in dict.iter() {
        if key.as_slice() != b"Parent" {
            collect_references(value, visit);
        }
    }
}

fn is_page_tree_node(object: &Object) -> bool {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        _ => return false,
    };
    matches!(
        dict.get(b"Type").and_then(|t| t.as_name()),
        Ok(b"Page") | Ok(b"Pages")
    )
}
