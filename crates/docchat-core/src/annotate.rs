//! Writing highlight annotations into a PDF

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Deserialize;

use crate::error::HighlightError;
use crate::geometry::Rect;
use crate::object::{inherited, number};

/// US Letter, used when no MediaBox is found on the page or its ancestors
const DEFAULT_MEDIA_BOX: Rect = Rect {
    x0: 0.0,
    y0: 0.0,
    x1: 612.0,
    y1: 792.0,
};

/// Annotation flag: print
const FLAG_PRINT: i64 = 4;

/// Appearance of generated highlights
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HighlightOptions {
    /// RGB components in 0-1
    pub color: [f32; 3],
    pub opacity: f32,
}

impl Default for HighlightOptions {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 0.0],
            opacity: 0.4,
        }
    }
}

/// Parse hex color string (e.g., "#FF0000" or "FF0000") to RGB floats (0-1 range)
pub fn parse_hex_color(color: &str) -> Option<[f32; 3]> {
    let hex = color.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .ok()
            .map(|v| v as f32 / 255.0)
    };
    Some([channel(0)?, channel(2)?, channel(4)?])
}

/// MediaBox of a page, following inherited values up the page tree.
pub fn page_media_box(doc: &Document, page_id: ObjectId) -> Rect {
    inherited(doc, page_id, b"MediaBox")
        .and_then(rect_from_array)
        .unwrap_or(DEFAULT_MEDIA_BOX)
}

fn rect_from_array(obj: &Object) -> Option<Rect> {
    let Object::Array(values) = obj else {
        return None;
    };
    if values.len() != 4 {
        return None;
    }
    let mut v = [0.0f64; 4];
    for (slot, value) in v.iter_mut().zip(values) {
        *slot = number(value)?;
    }
    Some(Rect::new(
        v[0].min(v[2]),
        v[1].min(v[3]),
        v[0].max(v[2]),
        v[1].max(v[3]),
    ))
}

/// Add one Highlight annotation covering `quads` (PDF user space) to a page.
pub fn add_highlight(
    doc: &mut Document,
    page_id: ObjectId,
    page_number: u32,
    quads: &[Rect],
    options: &HighlightOptions,
) -> Result<ObjectId, HighlightError> {
    let bounds = Rect::bounding(quads).ok_or_else(|| HighlightError::Annotation {
        page: page_number,
        message: "no regions to highlight".to_string(),
    })?;

    let mut annot = Dictionary::new();
    annot.set("Type", Object::Name(b"Annot".to_vec()));
    annot.set("Subtype", Object::Name(b"Highlight".to_vec()));
    annot.set("Rect", real_array(&[bounds.x0, bounds.y0, bounds.x1, bounds.y1]));

    // Upper-left, upper-right, lower-left, lower-right for each line
    let points: Vec<f64> = quads
        .iter()
        .flat_map(|q| [q.x0, q.y1, q.x1, q.y1, q.x0, q.y0, q.x1, q.y0])
        .collect();
    annot.set("QuadPoints", real_array(&points));

    annot.set(
        "C",
        Object::Array(options.color.iter().map(|c| Object::Real(*c)).collect()),
    );
    annot.set("CA", Object::Real(options.opacity));
    annot.set("F", Object::Integer(FLAG_PRINT));
    annot.set("P", Object::Reference(page_id));

    let annot_id = doc.add_object(Object::Dictionary(annot));
    add_annotation_to_page(doc, page_id, page_number, annot_id)?;
    Ok(annot_id)
}

fn real_array(values: &[f64]) -> Object {
    Object::Array(values.iter().map(|v| Object::Real(*v as f32)).collect())
}

fn add_annotation_to_page(
    doc: &mut Document,
    page_id: ObjectId,
    page_number: u32,
    annot_id: ObjectId,
) -> Result<(), HighlightError> {
    // An indirect Annots array is updated in place.
    let indirect = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|dict| dict.get(b"Annots").ok())
        .and_then(|obj| obj.as_reference().ok());
    if let Some(array_id) = indirect {
        if let Ok(Object::Array(arr)) = doc.get_object_mut(array_id) {
            arr.push(Object::Reference(annot_id));
            return Ok(());
        }
    }

    let page = doc
        .get_object_mut(page_id)
        .map_err(|e| HighlightError::Annotation {
            page: page_number,
            message: e.to_string(),
        })?;

    let Object::Dictionary(ref mut page_dict) = page else {
        return Err(HighlightError::Annotation {
            page: page_number,
            message: "page object is not a dictionary".to_string(),
        });
    };

    if let Ok(Object::Array(ref mut arr)) = page_dict.get_mut(b"Annots") {
        arr.push(Object::Reference(annot_id));
    } else {
        page_dict.set("Annots", Object::Array(vec![Object::Reference(annot_id)]));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{highlight_annotations, pdf_with_pages};
    use lopdf::dictionary;
    use pretty_assertions::assert_eq;

    fn load(pdf: &[u8]) -> (Document, ObjectId) {
        let doc = Document::load_mem(pdf).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();
        (doc, page_id)
    }

    #[test]
    fn test_highlight_round_trips_through_save() {
        let (mut doc, page_id) = load(&pdf_with_pages(&[&["Hello"]]));
        let quads = [
            Rect::new(72.0, 700.0, 200.0, 712.0),
            Rect::new(72.0, 686.0, 150.0, 698.0),
        ];
        add_highlight(&mut doc, page_id, 1, &quads, &HighlightOptions::default()).unwrap();

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        let reloaded = Document::load_mem(&out).unwrap();
        let annots = highlight_annotations(&reloaded, 1);
        assert_eq!(annots.len(), 1);

        let annot = &annots[0];
        let quad_points = annot.get(b"QuadPoints").unwrap().as_array().unwrap();
        assert_eq!(quad_points.len(), 16);
        let rect = annot.get(b"Rect").unwrap().as_array().unwrap();
        assert_eq!(rect.len(), 4);
        assert_eq!(annot.get(b"F").unwrap().as_i64().unwrap(), 4);
    }

    #[test]
    fn test_appends_to_existing_annots() {
        let (mut doc, page_id) = load(&pdf_with_pages(&[&["Hello"]]));
        let quad = [Rect::new(0.0, 0.0, 10.0, 10.0)];
        add_highlight(&mut doc, page_id, 1, &quad, &HighlightOptions::default()).unwrap();
        add_highlight(&mut doc, page_id, 1, &quad, &HighlightOptions::default()).unwrap();
        assert_eq!(highlight_annotations(&doc, 1).len(), 2);
    }

    #[test]
    fn test_no_quads_is_an_annotation_error() {
        let (mut doc, page_id) = load(&pdf_with_pages(&[&["Hello"]]));
        let err = add_highlight(&mut doc, page_id, 3, &[], &HighlightOptions::default())
            .unwrap_err();
        assert!(matches!(err, HighlightError::Annotation { page: 3, .. }));
    }

    #[test]
    fn test_media_box_is_inherited_from_parent() {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        assert_eq!(page_media_box(&doc, page_id), Rect::new(0.0, 0.0, 595.0, 842.0));
    }

    #[test]
    fn test_media_box_defaults_to_letter() {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! { "Type" => "Page" });
        assert_eq!(page_media_box(&doc, page_id), DEFAULT_MEDIA_BOX);
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF0000"), Some([1.0, 0.0, 0.0]));
        assert_eq!(parse_hex_color("00ff00"), Some([0.0, 1.0, 0.0]));
        assert_eq!(parse_hex_color("#FFF"), None);
        assert_eq!(parse_hex_color("zzzzzz"), None);
    }
}
