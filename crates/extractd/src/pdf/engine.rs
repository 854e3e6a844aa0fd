use super::backend::PdfBackendDescriptor;
use super::error::{PdfError, Result};
use crate::core::config::PdfConfig;
use crate::document::{Metadata, PageText};
use std::path::Path;

/// Everything read from a PDF while the engine is held.
#[derive(Debug, Default)]
pub struct ParsedPdf {
    pub pages: Vec<PageText>,
    pub metadata: Metadata,
}

/// A PDF text engine. Implementations parse eagerly and keep no document state.
pub trait PdfEngine: Send + Sync {
    fn descriptor(&self) -> PdfBackendDescriptor;

    /// Whether only one parse may run per process.
    fn exclusive(&self) -> bool;

    fn load(&self, bytes: &[u8]) -> Result<ParsedPdf>;

    fn open(&self, path: &Path) -> Result<ParsedPdf>;
}

/// Instantiate the engine named in `config`.
pub fn load(config: &PdfConfig) -> Result<Box<dyn PdfEngine>> {
    match config.engine.trim().to_ascii_lowercase().as_str() {
        "lopdf" => Ok(Box::new(super::lopdf_engine::LopdfEngine::new())),
        #[cfg(feature = "pdfium")]
        "pdfium" => Ok(Box::new(super::pdfium_engine::PdfiumEngine::new(
            config.library_path.as_deref(),
        )?)),
        #[cfg(not(feature = "pdfium"))]
        "pdfium" => Err(PdfError::EngineUnavailable(
            "built without the `pdfium` feature".to_string(),
        )),
        other => Err(PdfError::UnknownEngine(other.to_string())),
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, UTF-8 with BOM, else PDFDocEncoding
/// approximated as Latin-1.
pub(crate) fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Insert a metadata value if it is non-empty after trimming.
pub(crate) fn insert_metadata(metadata: &mut Metadata, key: &str, value: &str) {
    let value = value.trim().trim_matches('\0');
    if !value.is_empty() {
        metadata.insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_engine() {
        let config = PdfConfig {
            engine: "ghostscript".to_string(),
            ..Default::default()
        };
        assert!(matches!(load(&config), Err(PdfError::UnknownEngine(name)) if name == "ghostscript"));
    }

    #[test]
    fn test_lopdf_engine_by_name() {
        let config = PdfConfig {
            engine: " LoPDF ".to_string(),
            ..Default::default()
        };
        let engine = load(&config).unwrap();
        assert_eq!(engine.descriptor().name, "lopdf");
        assert!(!engine.exclusive());
    }

    #[test]
    fn test_decode_text_string() {
        assert_eq!(decode_text_string(&[0xFE, 0xFF, 0x00, b'H', 0x00, b'i']), "Hi");
        assert_eq!(decode_text_string(b"Caf\xe9"), "Café");
        assert_eq!(decode_text_string(&[0xEF, 0xBB, 0xBF, b'o', b'k']), "ok");
    }

    #[test]
    fn test_insert_metadata_skips_blank() {
        let mut metadata = Metadata::new();
        insert_metadata(&mut metadata, "title", "  ");
        insert_metadata(&mut metadata, "author", " Ada ");
        assert!(!metadata.contains_key("title"));
        assert_eq!(metadata["author"], "Ada");
    }
}
