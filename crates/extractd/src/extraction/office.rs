//! Office Open XML containers: word processing documents and presentations.
//!
//! Text is walked with quick-xml. Both formats mark runs of text with a `t`
//! element and paragraphs with `p`, so a single walker serves both. Core
//! properties come from `docProps/core.xml`.

use crate::core::mime::{DOCX_MIME_TYPE, POWER_POINT_MIME_TYPE};
use crate::document::{Backing, Document, Metadata, PageText, PagedDocument, TextDocument};
use crate::{ExtractdError, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesRef, Event};
use roxmltree::Node;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use zip::ZipArchive;

const DOCUMENT_PART: &str = "word/document.xml";
const CORE_PART: &str = "docProps/core.xml";
const SLIDE_PREFIX: &str = "ppt/slides/slide";

const CORE_FIELDS: [(&str, &str); 7] = [
    ("title", "title"),
    ("creator", "author"),
    ("subject", "subject"),
    ("keywords", "keywords"),
    ("description", "description"),
    ("created", "created"),
    ("modified", "modified"),
];

enum Parsed {
    Word(String, Metadata),
    Slides(Vec<PageText>, Metadata),
}

/// Parse an office container. `prefix` is quoted if the archive is neither format.
/// Blocking.
pub fn load(backing: Backing, prefix: &[u8]) -> Result<Box<dyn Document>> {
    let parsed = if let Some(bytes) = backing.bytes() {
        parse(open_archive(Cursor::new(bytes))?, prefix)?
    } else if let Some(path) = backing.path() {
        parse(open_archive(File::open(path)?)?, prefix)?
    } else {
        return Err(ExtractdError::validation("document payload already released"));
    };

    Ok(match parsed {
        Parsed::Word(text, metadata) => Box::new(TextDocument::new(DOCX_MIME_TYPE, text, metadata, backing)),
        Parsed::Slides(pages, metadata) => Box::new(PagedDocument::new(POWER_POINT_MIME_TYPE, pages, metadata, backing)),
    })
}

fn open_archive<R: Read + Seek>(reader: R) -> Result<ZipArchive<R>> {
    ZipArchive::new(reader).map_err(|e| match e {
        zip::result::ZipError::Io(io_err) => ExtractdError::Io(io_err),
        other => ExtractdError::parsing(format!("Invalid office container: {}", other)),
    })
}

fn parse<R: Read + Seek>(mut archive: ZipArchive<R>, prefix: &[u8]) -> Result<Parsed> {
    let metadata = core_properties(&mut archive)?;

    if archive.index_for_name(DOCUMENT_PART).is_some() {
        let xml = read_part(&mut archive, DOCUMENT_PART)?;
        let (text, _) = xml_text(&xml)?;
        return Ok(Parsed::Word(text, metadata));
    }

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name.strip_prefix(SLIDE_PREFIX)?.strip_suffix(".xml")?.parse().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    if slides.is_empty() {
        return Err(ExtractdError::unsupported(
            "zip archive is neither a word processing document nor a presentation",
            prefix,
        ));
    }
    slides.sort_by_key(|(number, _)| *number);

    let mut pages = Vec::with_capacity(slides.len());
    for (_, name) in slides {
        let xml = read_part(&mut archive, &name)?;
        let (text, has_pictures) = xml_text(&xml)?;
        pages.push(PageText::new(text.trim_end().to_string(), has_pictures));
    }
    Ok(Parsed::Slides(pages, metadata))
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut file = match archive.by_name(name) {
        Ok(f) => f,
        Err(zip::result::ZipError::Io(io_err)) => return Err(io_err.into()),
        Err(e) => {
            return Err(ExtractdError::parsing(format!("Failed to read {} from archive: {}", name, e)));
        }
    };
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

/// Plain text of a WordprocessingML or DrawingML part, and whether it holds pictures.
fn xml_text(xml: &[u8]) -> Result<(String, bool)> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().check_end_names = false;

    let mut text = String::new();
    let mut in_text = false;
    let mut has_pictures = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"tab" => text.push('\t'),
                b"br" | b"cr" => text.push('\n'),
                b"pic" => has_pictures = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" | b"cr" => text.push('\n'),
                b"pic" => has_pictures = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Ok(Event::CData(e)) if in_text => text.push_str(&String::from_utf8_lossy(&e)),
            Ok(Event::GeneralRef(e)) if in_text => push_reference(&mut text, &e),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractdError::parsing(format!(
                    "XML parsing error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok((text, has_pictures))
}

fn push_reference(text: &mut String, reference: &BytesRef<'_>) {
    if let Ok(Some(ch)) = reference.resolve_char_ref() {
        text.push(ch);
        return;
    }
    let resolved = match &**reference {
        b"amp" => '&',
        b"lt" => '<',
        b"gt" => '>',
        b"quot" => '"',
        b"apos" => '\'',
        _ => return,
    };
    text.push(resolved);
}

fn core_properties<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    let xml = match archive.by_name(CORE_PART) {
        Ok(mut file) => {
            let mut xml = String::new();
            file.read_to_string(&mut xml)
                .map_err(|e| ExtractdError::parsing(format!("Failed to read core.xml: {}", e)))?;
            xml
        }
        Err(_) => return Ok(metadata),
    };

    let doc = roxmltree::Document::parse(&xml)
        .map_err(|e| ExtractdError::parsing(format!("Failed to parse core.xml: {}", e)))?;
    let root = doc.root_element();
    for (tag, key) in CORE_FIELDS {
        if let Some(value) = parse_xml_text(root, tag) {
            metadata.insert(key.to_string(), value);
        }
    }
    Ok(metadata)
}

fn parse_xml_text(node: Node, name: &str) -> Option<String> {
    node.descendants()
        .find(|n| n.has_tag_name(name))
        .and_then(|n| n.text())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
}
