//! Transport side of a streaming response
//!
//! This module connects a [`ClientResponse`](crate::response::ClientResponse) to
//! the socket it is read from.
//!
//! # Components
//!
//! - [`Transport`]: what a response needs from its connection, pause at the
//!   transport level and raw socket hand-over
//! - [`RequestProgress`]: the request notified about every delivered chunk,
//!   [`RequestActivity`] records those notifications
//! - [`ClientConnection`]: tokio driver reading decoded messages from a socket,
//!   with [`ConnectionHandle`] as its [`Transport`] implementation
//! - [`NetSocket`] / [`Upgraded`]: the socket handed over after an upgrade

mod client_connection;
mod handle;
mod request;
mod transport;
mod upgrade;

pub use client_connection::ClientConnection;
pub use client_connection::ConnectionConfig;
pub use client_connection::DEFAULT_READ_BUFFER_SIZE;
pub use handle::ConnectionHandle;
pub use request::RequestActivity;
#[cfg(test)]
pub use transport::MockTransport;
pub use transport::RequestProgress;
pub use transport::Transport;
pub use upgrade::Io;
pub use upgrade::NetSocket;
pub use upgrade::Upgraded;
