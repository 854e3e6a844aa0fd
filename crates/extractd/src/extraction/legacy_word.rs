//! Legacy Word (OLE compound) documents, converted by an external tool.
//!
//! The tool receives a file path and prints plain text on stdout. In-memory
//! payloads are written to a scratch file first.

use super::tool::run_tool;
use crate::core::io::{TempFile, temp_file_path};
use crate::core::mime::LEGACY_WORD_MIME_TYPE;
use crate::document::{Backing, Metadata, TextDocument};
use crate::{ExtractdError, Result};
use std::path::Path;
use std::time::Duration;

pub async fn load(backing: Backing, tool: &Path, limit: Duration, temp_dir: &Path) -> Result<TextDocument> {
    let stdout = if let Some(path) = backing.path() {
        run_tool(tool, [path.as_os_str()], limit).await?
    } else if let Some(bytes) = backing.bytes() {
        let scratch = TempFile::new(temp_file_path(temp_dir, "doc"));
        tokio::fs::write(scratch.path(), bytes).await?;
        run_tool(tool, [scratch.path().as_os_str()], limit).await?
    } else {
        return Err(ExtractdError::validation("document payload already released"));
    };

    let text = String::from_utf8_lossy(&stdout).trim_end().to_string();
    Ok(TextDocument::new(LEGACY_WORD_MIME_TYPE, text, Metadata::new(), backing))
}
