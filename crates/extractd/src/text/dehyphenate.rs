//! Line-break dehyphenation as a concurrent stream stage.
//!
//! A word split across lines as `exam-\nple` is rejoined to `example` unless the
//! character before the hyphen is uppercase, which marks the break as intentional
//! (`ABC-\nDEF` stays intact). A dash after whitespace is not part of a word and
//! is left alone. A soft hyphen (U+00AD) at the end of a line always joins.
//!
//! [`Dehyphenator::spawn`] runs the transform on its own task behind a
//! single-slot pipe. The producer writes into [`Dehyphenator::input`] and then
//! awaits [`Dehyphenator::finish`], which closes the pipe and waits for the task.
//! If a line cannot be decoded the stage stops transforming and forwards the
//! rest of the input verbatim.

use crate::core::io::{pump, write_output};
use crate::{ExtractdError, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;

/// Capacity of the pipe between producer and stage.
const PIPE_CAPACITY: usize = 64 * 1024;

const SOFT_HYPHEN: char = '\u{00AD}';

/// How the stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Transformed,
    /// Undecodable input switched the stage to verbatim passthrough.
    Passthrough,
}

/// Running dehyphenation stage writing into `W`.
pub struct Dehyphenator<W> {
    input: DuplexStream,
    task: JoinHandle<(W, Result<Outcome>)>,
}

impl<W> Dehyphenator<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    pub fn spawn(output: W) -> Self {
        let (input, reader) = tokio::io::duplex(PIPE_CAPACITY);
        let task = tokio::spawn(async move {
            let mut output = output;
            let mut reader = BufReader::new(reader);
            let result = dehyphenate(&mut reader, &mut output).await;
            let result = match result {
                Ok(outcome) => output.flush().await.map(|_| outcome).map_err(ExtractdError::Output),
                Err(e) => Err(e),
            };
            (output, result)
        });
        Self { input, task }
    }

    /// Producer side of the pipe.
    pub fn input(&mut self) -> &mut DuplexStream {
        &mut self.input
    }

    /// Signal end of input and wait for the stage to drain.
    pub async fn finish(self) -> Result<(W, Outcome)> {
        let Self { mut input, task } = self;
        let _ = input.shutdown().await;
        drop(input);
        match task.await {
            Ok((output, Ok(outcome))) => Ok((output, outcome)),
            Ok((_, Err(e))) => Err(e),
            Err(e) => Err(ExtractdError::Other(format!("dehyphenation task failed: {}", e))),
        }
    }
}

/// Dehyphenate `reader` into `out`.
pub async fn dehyphenate<R, W>(reader: &mut R, out: &mut W) -> Result<Outcome>
where
    R: AsyncBufRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut carry = String::new();
    let mut tail = String::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).await?;
        if n == 0 {
            write_output(out, carry.as_bytes()).await?;
            write_output(out, tail.as_bytes()).await?;
            return Ok(Outcome::Transformed);
        }

        let decoded = match std::str::from_utf8(&line) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(error = %e, "undecodable line; passing the rest through");
                write_output(out, carry.as_bytes()).await?;
                write_output(out, tail.as_bytes()).await?;
                write_output(out, &line).await?;
                pump(reader, out).await?;
                return Ok(Outcome::Passthrough);
            }
        };

        let joining = !tail.is_empty();
        let continuation = if joining {
            decoded.trim_start_matches([' ', '\t'])
        } else {
            decoded
        };
        if joining && continuation.trim_end_matches(['\n', '\r']).is_empty() {
            write_output(out, carry.as_bytes()).await?;
            write_output(out, tail.as_bytes()).await?;
            write_output(out, decoded.as_bytes()).await?;
            carry.clear();
            tail.clear();
            continue;
        }
        carry.push_str(continuation);
        tail.clear();

        let body = carry.trim_end_matches(['\n', '\r']);
        match joinable_hyphen(body).map(|hyphen_len| body.len() - hyphen_len) {
            Some(keep) => {
                tail = carry[keep..].to_string();
                carry.truncate(keep);
            }
            None => {
                write_output(out, carry.as_bytes()).await?;
                carry.clear();
            }
        }
    }
}

/// Byte length of the hyphen to remove when `body` ends with a joinable break.
fn joinable_hyphen(body: &str) -> Option<usize> {
    let mut chars = body.chars().rev();
    match chars.next()? {
        SOFT_HYPHEN => Some(SOFT_HYPHEN.len_utf8()),
        '-' => {
            let before = chars.next()?;
            (!before.is_uppercase() && !before.is_whitespace()).then_some(1)
        }
        _ => None,
    }
}
