//! Raw socket hand-over.
//!
//! When a consumer takes a connection over (protocol upgrade, `CONNECT` tunnel) the
//! driver stops framing HTTP and hands out the socket. Bytes the decoder had
//! already read but not consumed belong to the new protocol, so [`Upgraded`]
//! yields them before reading from the socket again.

use std::cell::RefCell;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::{cmp, fmt, io};

use bytes::{Buf, Bytes};
use futures::channel::oneshot;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::trace;

use crate::protocol::UpgradeError;

/// Any duplex byte stream a connection can run on.
pub trait Io: AsyncRead + AsyncWrite + Unpin {}

impl<T: AsyncRead + AsyncWrite + Unpin> Io for T {}

/// The handle returned when a response takes the connection over.
///
/// The hand-over completes once the connection driver has stopped reading; await
/// [`upgraded`](NetSocket::upgraded) to get the socket.
pub struct NetSocket {
    rx: RefCell<Option<oneshot::Receiver<Upgraded>>>,
}

pub(crate) struct Pending {
    tx: oneshot::Sender<Upgraded>,
}

pub(crate) fn pending() -> (Pending, NetSocket) {
    let (tx, rx) = oneshot::channel();
    (Pending { tx }, NetSocket { rx: RefCell::new(Some(rx)) })
}

impl NetSocket {
    /// Waits for the driver to hand the socket over. The socket can be taken once.
    pub async fn upgraded(&self) -> Result<Upgraded, UpgradeError> {
        let rx = self.rx.borrow_mut().take().ok_or(UpgradeError::AlreadyTaken)?;
        rx.await.map_err(|_canceled| UpgradeError::Canceled)
    }
}

impl Pending {
    pub(crate) fn fulfill(self, upgraded: Upgraded) {
        trace!("raw socket hand-over fulfilled");
        if self.tx.send(upgraded).is_err() {
            trace!("raw socket dropped before hand-over");
        }
    }
}

/// A connection taken over from the HTTP client.
pub struct Upgraded {
    io: Rewind<Box<dyn Io>>,
}

impl Upgraded {
    pub(crate) fn new<T: Io + 'static>(io: T, read_buf: Bytes) -> Self {
        Self { io: Rewind::new_buffered(Box::new(io), read_buf) }
    }

    /// Returns the socket and the bytes read ahead of it that were not consumed yet.
    pub fn into_parts(self) -> (Box<dyn Io>, Bytes) {
        self.io.into_inner()
    }
}

impl AsyncRead for Upgraded {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for Upgraded {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io.inner).poll_shutdown(cx)
    }
}

impl fmt::Debug for NetSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetSocket").field("taken", &self.rx.borrow().is_none()).finish()
    }
}

impl fmt::Debug for Upgraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upgraded").field("buffered", &self.io.pre.as_ref().map_or(0, Bytes::len)).finish()
    }
}

/// Reads from a prefix buffer first, then from the wrapped io.
struct Rewind<T> {
    pre: Option<Bytes>,
    inner: T,
}

impl<T> Rewind<T> {
    fn new_buffered(io: T, buf: Bytes) -> Self {
        Self { pre: Some(buf), inner: io }
    }

    fn into_inner(self) -> (T, Bytes) {
        (self.inner, self.pre.unwrap_or_default())
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for Rewind<T> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if let Some(mut prefix) = self.pre.take() {
            if !prefix.is_empty() {
                let copy_len = cmp::min(prefix.len(), buf.remaining());
                buf.put_slice(&prefix[..copy_len]);
                prefix.advance(copy_len);
                if !prefix.is_empty() {
                    self.pre = Some(prefix);
                }
                return Poll::Ready(Ok(()));
            }
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}
