//! Embedded page images, pulled out of a PDF for OCR.
//!
//! JPEG and JPEG 2000 streams pass through untouched. Flate or unfiltered 8-bit
//! RGB and grayscale rasters are re-encoded to PNG. Anything else is skipped.

use super::error::{PdfError, Result};
use image::{GrayImage, ImageFormat, RgbImage};
use lopdf::Document;
use std::io::Cursor;

#[derive(Debug, Clone)]
pub struct PageImage {
    pub mime_type: &'static str,
    pub data: Vec<u8>,
}

/// Images of every page, indexed by zero-based page number.
#[derive(Debug, Default)]
pub struct PdfImageIndex {
    pages: Vec<Vec<PageImage>>,
}

impl PdfImageIndex {
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let document = Document::load_mem(bytes)?;
        let mut pages = Vec::new();
        for (number, page_id) in document.get_pages() {
            let images = match document.get_page_images(page_id) {
                Ok(images) => images,
                Err(e) => {
                    tracing::debug!("Page {} image listing failed: {}", number, e);
                    Vec::new()
                }
            };

            let mut collected = Vec::with_capacity(images.len());
            for image in images {
                let filters = image.filters.clone().unwrap_or_default();
                let encoded = match filters.last().map(String::as_str) {
                    Some("DCTDecode") => Some(PageImage {
                        mime_type: "image/jpeg",
                        data: image.content.to_vec(),
                    }),
                    Some("JPXDecode") => Some(PageImage {
                        mime_type: "image/jp2",
                        data: image.content.to_vec(),
                    }),
                    None | Some("FlateDecode") => {
                        let raw = document
                            .get_object(image.id)
                            .and_then(|object| object.as_stream())
                            .and_then(|stream| {
                                if filters.is_empty() {
                                    Ok(stream.content.clone())
                                } else {
                                    stream.decompressed_content()
                                }
                            });
                        match raw {
                            Ok(raw) => encode_png(
                                raw,
                                image.width,
                                image.height,
                                image.color_space.as_deref(),
                                image.bits_per_component,
                            ),
                            Err(e) => {
                                tracing::debug!("Page {} image {:?} could not be decoded: {}", number, image.id, e);
                                None
                            }
                        }
                    }
                    Some(other) => {
                        tracing::debug!("Page {} image uses unsupported filter {}", number, other);
                        None
                    }
                };
                collected.extend(encoded);
            }
            pages.push(collected);
        }
        Ok(Self { pages })
    }

    pub fn images(&self, page: usize) -> &[PageImage] {
        self.pages.get(page).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

fn encode_png(
    raw: Vec<u8>,
    width: i64,
    height: i64,
    color_space: Option<&str>,
    bits_per_component: Option<i64>,
) -> Option<PageImage> {
    if bits_per_component.unwrap_or(8) != 8 || width <= 0 || height <= 0 {
        return None;
    }
    let (width, height) = (u32::try_from(width).ok()?, u32::try_from(height).ok()?);
    let mut png = Cursor::new(Vec::new());
    let written = match color_space {
        Some("DeviceRGB") => RgbImage::from_raw(width, height, raw)?.write_to(&mut png, ImageFormat::Png),
        Some("DeviceGray") => GrayImage::from_raw(width, height, raw)?.write_to(&mut png, ImageFormat::Png),
        _ => return None,
    };
    match written {
        Ok(()) => Some(PageImage {
            mime_type: "image/png",
            data: png.into_inner(),
        }),
        Err(e) => {
            tracing::debug!("PNG re-encode failed: {}", PdfError::ImageExtractionFailed(e.to_string()));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_gray_png() {
        let image = encode_png(vec![0u8, 255, 255, 0], 2, 2, Some("DeviceGray"), Some(8)).unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert!(image.data.starts_with(b"\x89PNG"));
    }

    #[test]
    fn test_encode_rejects_short_buffer() {
        assert!(encode_png(vec![0u8; 5], 2, 2, Some("DeviceRGB"), Some(8)).is_none());
    }

    #[test]
    fn test_encode_rejects_unsupported_depth() {
        assert!(encode_png(vec![0u8; 4], 2, 2, Some("DeviceGray"), Some(1)).is_none());
        assert!(encode_png(vec![0u8; 4], 2, 2, Some("Indexed"), Some(8)).is_none());
    }

    #[test]
    fn test_index_out_of_range_is_empty() {
        let index = PdfImageIndex::default();
        assert!(index.images(3).is_empty());
        assert_eq!(index.page_count(), 0);
    }

    #[test]
    fn test_garbage_is_error() {
        assert!(PdfImageIndex::load(b"not a pdf").is_err());
    }
}
