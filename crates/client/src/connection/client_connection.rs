use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio_util::codec::{Decoder, FramedRead, FramedParts};
use tracing::{debug, error, info, trace};

use crate::connection::{ConnectionHandle, RequestProgress, Upgraded};
use crate::context::TaskQueue;
use crate::protocol::{HttpError, Message, PayloadItem, ResponseError, ResponseHeader};
use crate::response::ClientResponse;

/// Read buffer capacity used when none is configured.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Tuning knobs of a [`ClientConnection`].
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    read_buffer_size: usize,
    idle_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { read_buffer_size: DEFAULT_READ_BUFFER_SIZE, idle_timeout: None }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size;
        self
    }

    /// Fails the response with [`ResponseError::Timeout`] when the socket stays
    /// silent for `idle_timeout` while the response is being read.
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }
}

/// Drives one response over a socket.
///
/// `ClientConnection` reads decoded messages from the socket and feeds them to a
/// [`ClientResponse`], honoring its pause state at the transport level:
/// - no message is read while the response is paused
/// - scheduled replay tasks run before the next message is read
/// - a requested net socket is handed over before the next message is read,
///   together with the bytes the decoder has buffered but not consumed
///
/// # Type Parameters
///
/// * `R`: The duplex socket
/// * `D`: The decoder turning socket bytes into response messages
pub struct ClientConnection<R, D> {
    framed_read: FramedRead<R, D>,
    handle: ConnectionHandle,
    context: TaskQueue,
    config: ConnectionConfig,
}

impl<R, D> ClientConnection<R, D>
where
    R: AsyncRead + AsyncWrite + Unpin + 'static,
    D: Decoder<Item = Message<ResponseHeader>, Error = ResponseError>,
{
    pub fn new(io: R, decoder: D) -> Self {
        Self::with_config(io, decoder, ConnectionConfig::default())
    }

    pub fn with_config(io: R, decoder: D, config: ConnectionConfig) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(io, decoder, config.read_buffer_size),
            handle: ConnectionHandle::new(),
            context: TaskQueue::new(),
            config,
        }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// The context the response schedules its replay tasks on.
    pub fn context(&self) -> &TaskQueue {
        &self.context
    }

    /// Reads one response and delivers it through the response's handlers.
    ///
    /// `response_handler` receives the response as soon as its header is decoded,
    /// before any body chunk. Returns once the end has been delivered, the
    /// response failed, or the socket was handed over.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket fails or closes before a response header
    /// was decoded. Failures after that are reported to the response's exception
    /// handler instead.
    pub async fn process<F>(self, request: Rc<dyn RequestProgress>, response_handler: F) -> Result<(), HttpError>
    where
        F: FnOnce(ClientResponse<ConnectionHandle>),
    {
        let Self { mut framed_read, handle, context, config } = self;
        let mut response_handler = Some(response_handler);
        let mut response: Option<ClientResponse<ConnectionHandle>> = None;
        let mut eof_received = false;

        loop {
            context.run_pending();

            if let Some(pending) = handle.take_upgrade() {
                let FramedParts { io, read_buf, .. } = framed_read.into_parts();
                info!(buffered = read_buf.len(), "connection handed over as raw socket");
                pending.fulfill(Upgraded::new(io, read_buf.freeze()));
                return Ok(());
            }

            if response.as_ref().is_some_and(ClientResponse::is_ended) {
                info!("response completed");
                return Ok(());
            }

            // once the eof is read the rest is delivered from buffered state
            if handle.is_paused() || eof_received {
                select! {
                    biased;
                    () = context.ready() => {}
                    () = handle.wakeup() => {}
                }
                continue;
            }

            let message = select! {
                biased;
                () = context.ready() => continue,
                () = handle.wakeup() => continue,
                message = read_message(&mut framed_read, config.idle_timeout) => message,
            };

            match message {
                Some(Ok(Message::Header(header))) => {
                    if response.is_some() {
                        error!("received a second response header");
                        return Err(ResponseError::decode("unexpected response header").into());
                    }

                    let new_response =
                        ClientResponse::new(header, handle.clone(), context.clone(), Rc::clone(&request));
                    debug!(status = new_response.status_code(), "received response header");
                    if let Some(response_handler) = response_handler.take() {
                        response_handler(new_response.clone());
                    }
                    response = Some(new_response);
                }

                Some(Ok(Message::Payload(payload_item))) => {
                    let Some(current) = &response else {
                        error!("received payload before the response header");
                        return Err(ResponseError::invalid_body("need header while receive body").into());
                    };

                    match payload_item {
                        PayloadItem::Chunk(bytes) => {
                            trace!(len = bytes.len(), "read body chunk");
                            current.handle_chunk(bytes);
                        }
                        PayloadItem::Eof(trailer) => {
                            eof_received = true;
                            current.handle_end(trailer);
                        }
                    }
                }

                Some(Err(e)) => {
                    error!("can't read response, cause {}", e);
                    return match &response {
                        Some(current) => {
                            current.handle_exception(e);
                            Ok(())
                        }
                        None => Err(e.into()),
                    };
                }

                None => {
                    info!("connection closed before the response completed");
                    return match &response {
                        Some(current) => {
                            current.handle_exception(ResponseError::ConnectionClosed);
                            Ok(())
                        }
                        None => Err(ResponseError::ConnectionClosed.into()),
                    };
                }
            }
        }
    }
}

impl<R, D> fmt::Debug for ClientConnection<R, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("handle", &self.handle)
            .field("context", &self.context)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn read_message<R, D>(
    framed_read: &mut FramedRead<R, D>,
    idle_timeout: Option<Duration>,
) -> Option<Result<Message<ResponseHeader>, ResponseError>>
where
    R: AsyncRead + Unpin,
    D: Decoder<Item = Message<ResponseHeader>, Error = ResponseError>,
{
    let Some(idle_timeout) = idle_timeout else {
        return framed_read.next().await;
    };

    match tokio::time::timeout(idle_timeout, framed_read.next()).await {
        Ok(message) => message,
        Err(_elapsed) => Some(Err(ResponseError::timeout(idle_timeout))),
    }
}
