use super::error::PdfError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};

/// A bound pdfium library and where it was loaded from.
pub(crate) struct Binding {
    pub bindings: Box<dyn PdfiumLibraryBindings>,
    pub library_path: Option<PathBuf>,
    pub owns_library_file: bool,
}

/// Bind pdfium at runtime.
///
/// An explicit `library_path` wins; it may name the shared library itself or the
/// directory holding it. Without one, the bundled copy is extracted when the
/// `bundled-pdfium` feature is enabled, otherwise the system library is used.
pub(crate) fn bind_pdfium(library_path: Option<&Path>) -> Result<Binding, PdfError> {
    if let Some(path) = library_path {
        let library = if path.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(path)
        } else {
            path.to_path_buf()
        };
        let bindings = Pdfium::bind_to_library(&library).map_err(|e| {
            PdfError::EngineUnavailable(format!("Failed to bind pdfium at {}: {}", library.display(), e))
        })?;
        return Ok(Binding {
            bindings,
            library_path: Some(library),
            owns_library_file: false,
        });
    }

    #[cfg(feature = "bundled-pdfium")]
    {
        let library = super::bundled::extract_bundled_pdfium()
            .map_err(|e| PdfError::EngineUnavailable(format!("Failed to extract bundled pdfium: {}", e)))?;
        let bindings = Pdfium::bind_to_library(&library)
            .map_err(|e| PdfError::EngineUnavailable(format!("Failed to bind bundled pdfium: {}", e)))?;
        Ok(Binding {
            bindings,
            library_path: Some(library),
            owns_library_file: true,
        })
    }

    #[cfg(not(feature = "bundled-pdfium"))]
    {
        let bindings = Pdfium::bind_to_system_library()
            .map_err(|e| PdfError::EngineUnavailable(format!("Failed to bind system pdfium: {}", e)))?;
        Ok(Binding {
            bindings,
            library_path: None,
            owns_library_file: false,
        })
    }
}
