use crate::document::{Backing, Metadata, PageText, PagedDocument};
use crate::{ExtractdError, Result};
use image::ImageReader;
use std::io::Cursor;

/// Wrap an image as a one-page document with no native text, leaving the page
/// to OCR. Blocking.
pub fn load(backing: Backing, mime_type: &'static str) -> Result<PagedDocument> {
    let dimensions = if let Some(bytes) = backing.bytes() {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_dimensions()
    } else if let Some(path) = backing.path() {
        image::image_dimensions(path)
    } else {
        return Err(ExtractdError::validation("document payload already released"));
    };

    let mut metadata = Metadata::new();
    match dimensions {
        Ok((width, height)) => {
            metadata.insert("width".to_string(), width.to_string());
            metadata.insert("height".to_string(), height.to_string());
        }
        Err(e) => tracing::debug!("Could not read image dimensions: {}", e),
    }

    Ok(PagedDocument::new(mime_type, vec![PageText::new("", true)], metadata, backing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use image::{ImageFormat, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::new(width, height).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_image_is_single_ocr_page() {
        let bytes = png(3, 2);
        let doc = load(Backing::Owned(bytes.clone()), "image/png").unwrap();
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.text_of_page(0).unwrap(), PageText::new("", true));
        assert_eq!(doc.metadata()["width"], "3");
        assert_eq!(doc.metadata()["height"], "2");
        assert_eq!(doc.metadata()["content-type"], "image/png");
        assert_eq!(doc.raw_data(), Some(&bytes[..]));
    }

    #[test]
    fn test_truncated_image_still_loads() {
        let doc = load(Backing::Owned(b"\x89PNG\r\n\x1a\n".to_vec()), "image/png").unwrap();
        assert!(!doc.metadata().contains_key("width"));
    }
}
