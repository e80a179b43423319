//! Small PDFs built with lopdf, shared by the unit, integration and server tests

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

/// Line spacing of every fixture, in points
pub const LEADING: i64 = 14;

/// One page per entry. Each line is set in 12pt Helvetica starting at
/// (72, 720), [`LEADING`] apart.
pub fn pdf_with_pages(pages: &[&[&str]]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources = dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    };

    let contents = pages
        .iter()
        .map(|lines| {
            let shown = lines
                .iter()
                .map(|line| Object::string_literal(*line))
                .collect();
            text_block(shown)
        })
        .collect();
    finish(doc, resources, contents)
}

/// Advance of a character in the [`pdf_with_cid_font`] fixture, in
/// thousandths of an em
pub fn cid_glyph_width(c: char) -> i64 {
    match c {
        ' ' | 'i' | 'l' | 't' | '.' | ',' => 250,
        'm' | 'w' | 'W' | 'M' => 850,
        c if c.is_uppercase() => 700,
        _ => 550,
    }
}

/// One page set in a subset Type0 font with Identity-H encoding, the way
/// office suites and browsers export text. Strings hold two-byte glyph
/// ids and only the ToUnicode CMap recovers the characters.
pub fn pdf_with_cid_font(lines: &[&str]) -> Vec<u8> {
    let mut glyphs: Vec<char> = Vec::new();
    for c in lines.iter().flat_map(|line| line.chars()) {
        if !glyphs.contains(&c) {
            glyphs.push(c);
        }
    }
    let cid = |c: char| glyphs.iter().position(|g| *g == c).map_or(0, |i| i as u16 + 1);

    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         /CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    cmap.push_str(&format!("{} beginbfchar\n", glyphs.len()));
    for c in &glyphs {
        let utf16: String = c
            .encode_utf16(&mut [0; 2])
            .iter()
            .map(|unit| format!("{:04X}", unit))
            .collect();
        cmap.push_str(&format!("<{:04X}> <{}>\n", cid(*c), utf16));
    }
    cmap.push_str("endbfchar\nendcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");

    let mut doc = Document::with_version("1.5");
    let to_unicode_id = doc.add_object(Stream::new(dictionary! {}, cmap.into_bytes()));
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => "ABCDEF+Carlito",
        "Flags" => 32,
        "Ascent" => 750,
        "Descent" => -250,
        "CapHeight" => 650,
        "ItalicAngle" => 0,
        "StemV" => 80,
        "FontBBox" => vec![0.into(), (-250).into(), 1000.into(), 750.into()],
    });
    let widths: Vec<Object> = glyphs.iter().map(|c| cid_glyph_width(*c).into()).collect();
    let descendant_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => "ABCDEF+Carlito",
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => 1000,
        "W" => vec![1.into(), Object::Array(widths)],
    });
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => "ABCDEF+Carlito",
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![descendant_id.into()],
        "ToUnicode" => to_unicode_id,
    });
    let resources = dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    };

    let shown = lines
        .iter()
        .map(|line| {
            let bytes = line.chars().flat_map(|c| cid(c).to_be_bytes()).collect();
            Object::String(bytes, StringFormat::Hexadecimal)
        })
        .collect();
    finish(doc, resources, vec![text_block(shown)])
}

fn text_block(shown: Vec<Object>) -> Content {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 12.into()]),
        Operation::new("TL", vec![LEADING.into()]),
        Operation::new("Td", vec![72.into(), 720.into()]),
    ];
    for (i, string) in shown.into_iter().enumerate() {
        if i > 0 {
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("Tj", vec![string]));
    }
    operations.push(Operation::new("ET", vec![]));
    Content { operations }
}

/// Assemble a Letter-sized document, one page per content stream, all
/// pages sharing `resources`.
fn finish(mut doc: Document, resources: Dictionary, contents: Vec<Content>) -> Vec<u8> {
    let pages_id = doc.new_object_id();
    let resources_id = doc.add_object(resources);

    let kids: Vec<Object> = contents
        .into_iter()
        .map(|content| {
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id: ObjectId = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            page_id.into()
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Highlight annotation dictionaries attached to a 1-indexed page
pub fn highlight_annotations(doc: &Document, page: u32) -> Vec<Dictionary> {
    let page_id = doc.get_pages()[&page];
    let page_dict = doc.get_dictionary(page_id).unwrap();
    let Ok(annots) = page_dict.get(b"Annots") else {
        return Vec::new();
    };
    annots
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|obj| obj.as_reference().ok())
        .filter_map(|id| doc.get_dictionary(id).ok())
        .filter(|annot| {
            annot
                .get(b"Subtype")
                .and_then(Object::as_name)
                .map(|name| name == b"Highlight")
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Number of Highlight annotations on a 1-indexed page of a saved PDF
pub fn highlight_count(pdf: &[u8], page: u32) -> usize {
    let doc = Document::load_mem(pdf).unwrap();
    highlight_annotations(&doc, page).len()
}
