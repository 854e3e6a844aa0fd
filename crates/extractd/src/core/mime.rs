//! Content sniffing.
//!
//! Formats are detected from leading bytes only; file names and declared
//! content types are never trusted.

pub const PDF_MIME_TYPE: &str = "application/pdf";
pub const DOCX_MIME_TYPE: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const POWER_POINT_MIME_TYPE: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const LEGACY_WORD_MIME_TYPE: &str = "application/msword";
pub const RTF_MIME_TYPE: &str = "application/rtf";
pub const ZIP_MIME_TYPE: &str = "application/zip";

/// Bytes read from the start of a payload for detection.
pub const SNIFF_LEN: usize = 8 * 1024;

/// PDF headers may be preceded by junk; only this prefix is searched.
const PDF_HEADER_WINDOW: usize = 1024;

const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Coarse format family used to pick a collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pdf,
    /// ZIP container; the office collaborator decides DOCX vs PPTX from its entries.
    OfficeContainer,
    Rtf,
    LegacyWord,
    Image(&'static str),
}

impl Format {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Pdf => PDF_MIME_TYPE,
            Format::OfficeContainer => ZIP_MIME_TYPE,
            Format::Rtf => RTF_MIME_TYPE,
            Format::LegacyWord => LEGACY_WORD_MIME_TYPE,
            Format::Image(mime) => mime,
        }
    }
}

/// Detect the format of a payload from its first bytes.
pub fn detect_format(head: &[u8]) -> Option<Format> {
    let window = &head[..head.len().min(PDF_HEADER_WINDOW)];
    if window.windows(5).any(|w| w == b"%PDF-") {
        return Some(Format::Pdf);
    }
    if head.starts_with(b"{\\rtf") {
        return Some(Format::Rtf);
    }
    if head.starts_with(&OLE_MAGIC) {
        return Some(Format::LegacyWord);
    }
    if head.starts_with(b"PK\x03\x04") {
        return Some(Format::OfficeContainer);
    }

    let kind = infer::get(head)?;
    match kind.matcher_type() {
        infer::MatcherType::Image => image_mime(kind.mime_type()).map(Format::Image),
        _ => None,
    }
}

/// Image types the OCR backend accepts, normalised to static strings.
fn image_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/png" => Some("image/png"),
        "image/jpeg" => Some("image/jpeg"),
        "image/tiff" => Some("image/tiff"),
        "image/bmp" => Some("image/bmp"),
        "image/gif" => Some("image/gif"),
        "image/webp" => Some("image/webp"),
        _ => None,
    }
}
