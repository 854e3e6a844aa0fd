use super::OcrBackend;
use crate::core::config::OcrConfig;
use crate::core::io::{TempFile, temp_file_path};
use crate::extraction::tool::run_tool;
use crate::{ExtractdError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// OCR through the `tesseract` command-line program.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: PathBuf,
    language: String,
    timeout: Duration,
    temp_dir: PathBuf,
}

impl TesseractCli {
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            program: config.tesseract_path.clone(),
            language: config.language.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            temp_dir: std::env::temp_dir(),
        }
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }
}

#[async_trait]
impl OcrBackend for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image: &[u8]) -> Result<String> {
        if image.is_empty() {
            return Err(ExtractdError::ocr("empty image"));
        }
        let input = TempFile::new(temp_file_path(&self.temp_dir, "img"));
        tokio::fs::write(input.path(), image).await?;

        let args = [
            input.path().as_os_str(),
            "stdout".as_ref(),
            "-l".as_ref(),
            self.language.as_ref(),
        ];
        let stdout = match run_tool(&self.program, args, self.timeout).await {
            Ok(stdout) => stdout,
            Err(ExtractdError::Parsing { message, source }) => return Err(ExtractdError::Ocr { message, source }),
            Err(e) => return Err(e),
        };
        Ok(String::from_utf8_lossy(&stdout).trim_end().to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn fake_tesseract(dir: &std::path::Path, script: &str) -> PathBuf {
        let path = dir.join("tesseract");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn backend(program: PathBuf, temp_dir: &std::path::Path) -> TesseractCli {
        TesseractCli::from_config(&OcrConfig {
            enabled: true,
            tesseract_path: program,
            ..Default::default()
        })
        .with_temp_dir(temp_dir)
    }

    #[tokio::test]
    async fn test_recognize_reads_stdout_and_removes_input() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_tesseract(dir.path(), r#"test "$2" = stdout && test "$4" = eng && cat "$1""#);
        let scratch = dir.path().join("scratch");
        std::fs::create_dir(&scratch).unwrap();

        let text = backend(program, &scratch).recognize(b"recognized words\n").await.unwrap();
        assert_eq!(text, "recognized words");
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_ocr_error() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_tesseract(dir.path(), "echo 'cannot read image' >&2; exit 1");
        let result = backend(program, dir.path()).recognize(b"png").await;
        assert!(matches!(result, Err(ExtractdError::Ocr { .. })));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let result = backend(PathBuf::from("/nonexistent/tesseract"), dir.path())
            .recognize(b"png")
            .await;
        assert!(matches!(result, Err(ExtractdError::MissingDependency(_))));
    }
}
