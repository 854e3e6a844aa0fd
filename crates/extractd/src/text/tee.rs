use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// Writer that forwards to `inner` and keeps a copy of everything accepted.
///
/// Only bytes the inner writer reports as written are captured, so the copy
/// never runs ahead of what the client received.
#[derive(Debug)]
pub struct TeeWriter<W> {
    inner: W,
    captured: Vec<u8>,
}

impl<W> TeeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            captured: Vec::new(),
        }
    }

    pub fn captured(&self) -> &[u8] {
        &self.captured
    }

    pub fn into_parts(self) -> (W, Vec<u8>) {
        (self.inner, self.captured)
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for TeeWriter<W> {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                this.captured.extend_from_slice(&buf[..n]);
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
