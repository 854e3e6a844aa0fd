//! Pdfium library embedded at build time.
//!
//! The library bytes are written to a per-process temp directory on first use.
//! The resulting file is owned by the backend descriptor and removed by
//! `PdfBackend::cleanup` on shutdown.

use std::fs;
use std::io;
use std::path::PathBuf;

static BUNDLED_PDFIUM: &[u8] = include_bytes!(env!("EXTRACTD_PDFIUM_BUNDLED_PATH"));

fn library_file_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "pdfium.dll"
    } else if cfg!(target_os = "macos") {
        "libpdfium.dylib"
    } else {
        "libpdfium.so"
    }
}

/// Write the embedded library to disk and return its path.
pub fn extract_bundled_pdfium() -> io::Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("extractd-pdfium-{}", std::process::id()));
    fs::create_dir_all(&dir)?;
    let path = dir.join(library_file_name());

    if let Ok(meta) = fs::metadata(&path)
        && meta.len() == BUNDLED_PDFIUM.len() as u64
    {
        return Ok(path);
    }

    let staging = dir.join(format!("{}.partial", library_file_name()));
    fs::write(&staging, BUNDLED_PDFIUM)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&staging, fs::Permissions::from_mode(0o755))?;
    }

    fs::rename(&staging, &path)?;
    tracing::debug!("Extracted bundled pdfium to {}", path.display());
    Ok(path)
}
