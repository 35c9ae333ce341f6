use bytes::{Buf, Bytes};

use crate::protocol::Trailer;

/// Represents a HTTP message that can either be a header or payload.
///
/// This is the item type the response decoder hands to the connection driver.
/// The generic parameter `T` is the header type (usually [`ResponseHeader`](crate::protocol::ResponseHeader)),
/// while `Data` represents the type of the payload data (defaults to `Bytes`).
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    /// Contains the header information of type `T`
    Header(T),
    /// Contains a chunk of payload data or the end marker
    Payload(PayloadItem<Data>),
}

/// Represents an item in the HTTP response payload stream.
///
/// The decoder produces zero or more chunks followed by exactly one `Eof`,
/// which carries the trailing headers (empty when the response had none).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Marks the end of the payload stream
    Eof(Trailer),
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<T> From<Trailer> for Message<T> {
    fn from(trailer: Trailer) -> Self {
        Self::Payload(PayloadItem::Eof(trailer))
    }
}
