//! Worker wire protocol.
//!
//! The child writes one UTF-8 line holding a JSON object of string pairs (the
//! document metadata), terminated by `\n`. Every byte after it, until the child
//! closes stdout, is final extracted text.

use crate::core::io::write_output;
use crate::document::Metadata;
use crate::{ExtractdError, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite};

/// Upper bound on the header line.
pub const MAX_HEADER_LEN: u64 = 1024 * 1024;

/// Read and parse the header line, leaving `reader` positioned at the first text byte.
pub async fn read_header<R>(reader: &mut R) -> Result<Metadata>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = reader.take(MAX_HEADER_LEN).read_until(b'\n', &mut line).await?;
    if n == 0 {
        return Err(ExtractdError::subprocess("worker closed its output before the header"));
    }
    if line.last() != Some(&b'\n') {
        return Err(ExtractdError::subprocess(format!(
            "worker header is not newline-terminated within {} bytes",
            MAX_HEADER_LEN
        )));
    }
    line.pop();
    serde_json::from_slice(&line)
        .map_err(|e| ExtractdError::subprocess_with_source("worker header is not a JSON string map", e))
}

/// Write `metadata` as the header line.
pub async fn write_header<W>(out: &mut W, metadata: &Metadata) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut line = serde_json::to_vec(metadata)?;
    line.push(b'\n');
    write_output(out, &line).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_header_then_text() {
        let mut metadata = Metadata::new();
        metadata.insert("title".to_string(), "Line\nbreak".to_string());
        let mut wire = Vec::new();
        write_header(&mut wire, &metadata).await.unwrap();
        wire.extend_from_slice(b"body text");

        let mut reader = BufReader::new(&wire[..]);
        let parsed = read_header(&mut reader).await.unwrap();
        assert_eq!(parsed, metadata);

        let mut rest = String::new();
        reader.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "body text");
    }

    #[tokio::test]
    async fn test_empty_output_is_error() {
        let mut reader = BufReader::new(&b""[..]);
        assert!(matches!(read_header(&mut reader).await, Err(ExtractdError::Subprocess { .. })));
    }

    #[tokio::test]
    async fn test_unterminated_header_is_error() {
        let mut reader = BufReader::new(&b"{\"a\":\"b\"}"[..]);
        assert!(read_header(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_non_string_values_rejected() {
        let mut reader = BufReader::new(&b"{\"pages\":3}\n"[..]);
        assert!(read_header(&mut reader).await.is_err());
    }
}
