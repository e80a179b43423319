//! Reading values out of lopdf objects

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

const MAX_REFERENCE_CHAIN: usize = 8;
const MAX_TREE_DEPTH: usize = 32;

/// Follow indirect references to the object they point at.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    let mut current = obj;
    for _ in 0..MAX_REFERENCE_CHAIN {
        match current {
            Object::Reference(id) => current = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

/// A dictionary, or the dictionary of a stream
pub(crate) fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

pub(crate) fn resolve_array<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a [Object]> {
    match resolve(doc, obj)? {
        Object::Array(items) => Some(items.as_slice()),
        _ => None,
    }
}

pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Stream data with filters applied. Unfiltered streams are returned as is.
pub(crate) fn stream_content(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

/// A page attribute, following inherited values up the page tree.
pub(crate) fn inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = Some(page_id);
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(current?).ok()?;
        if let Some(value) = dict.get(key).ok().and_then(|obj| resolve(doc, obj)) {
            return Some(value);
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_resolve_follows_reference_chain() {
        let mut doc = Document::with_version("1.5");
        let target = doc.add_object(Object::Integer(7));
        let hop = doc.add_object(Object::Reference(target));
        let start = Object::Reference(hop);
        assert_eq!(resolve(&doc, &start).and_then(number), Some(7.0));
    }

    #[test]
    fn test_inherited_reads_parent_value() {
        let mut doc = Document::with_version("1.5");
        let parent = doc.add_object(dictionary! { "Rotate" => 90 });
        let page = doc.add_object(dictionary! { "Parent" => parent });
        assert_eq!(
            inherited(&doc, page, b"Rotate").and_then(number),
            Some(90.0)
        );
        assert!(inherited(&doc, page, b"MediaBox").is_none());
    }
}
