//! The response half of an asynchronous micro HTTP client
//!
//! This crate streams an HTTP response from a connection to the code consuming it.
//! Body chunks and the end of the response are delivered through handlers, in the
//! order they arrived, and the consumer can pause and resume delivery at any time.
//!
//! # Features
//!
//! - Ordered chunk delivery with pause/resume and buffered replay
//! - Backpressure propagated to the transport, no reads while paused
//! - Lazily computed header, trailer and cookie views
//! - Raw socket hand-over for protocol upgrades
//! - `http_body::Body` adapter for pull based consumption
//! - Single threaded, every callback runs on the connection's task
//!
//! # Example
//!
//! ```no_run
//! use std::rc::Rc;
//!
//! use bytes::BytesMut;
//! use micro_http_client::connection::{ClientConnection, RequestActivity};
//! use micro_http_client::protocol::{Message, ResponseError, ResponseHeader};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Decoder;
//! use tracing::{error, info};
//!
//! // the HTTP/1.1 response decoder of your choice
//! struct ResponseDecoder;
//!
//! impl Decoder for ResponseDecoder {
//!     type Item = Message<ResponseHeader>;
//!     type Error = ResponseError;
//!
//!     fn decode(&mut self, _src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
//!         Ok(None)
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let stream = match TcpStream::connect("127.0.0.1:8080").await {
//!         Ok(stream) => stream,
//!         Err(e) => {
//!             error!(cause = %e, "connect failed");
//!             return;
//!         }
//!     };
//!
//!     let connection = ClientConnection::new(stream, ResponseDecoder);
//!     let result = connection
//!         .process(Rc::new(RequestActivity::new()), |response| {
//!             info!(status = response.status_code(), reason = response.status_message(), "received response");
//!             response
//!                 .data_handler(|chunk| info!(len = chunk.len(), "received chunk"))
//!                 .end_handler(|| info!("response completed"));
//!         })
//!         .await;
//!
//!     if let Err(e) = result {
//!         error!("response failed, cause {}", e);
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: message types produced by the response decoder, and errors
//! - [`context`]: the ordered task queue replay work is scheduled on
//! - [`response`]: [`response::ClientResponse`], its derived views and body adapter
//! - [`connection`]: the transport abstraction and its tokio driver
//!
//! # Flow control
//!
//! [`response::ClientResponse::pause`] stops delivery immediately and tells the
//! transport to stop reading. Chunks that arrive anyway are buffered. On
//! [`response::ClientResponse::resume`] the buffered chunks, and a buffered end,
//! are replayed as scheduled tasks, in arrival order and before anything read
//! later. A replay that runs after the response has been dropped does nothing.
//!
//! # Limitations
//!
//! - Parsing the wire format is left to the decoder given to the connection
//! - No request side, redirects, decompression or connection pooling

pub mod connection;
pub mod context;
pub mod protocol;
pub mod response;
