//! Protocol value types exchanged between the response decoder and the client.
//!
//! Parsing the wire format is the job of an external decoder. This module only
//! defines what that decoder produces and what can go wrong:
//!
//! - **Message Handling** ([`message`]): [`Message`] is either a header or a
//!   [`PayloadItem`], which is a body chunk or the terminating [`Trailer`]
//! - **Response Header** ([`response`]): [`ResponseHeader`] wraps the parsed status
//!   line and header fields, [`ReasonPhrase`] carries a non-canonical reason
//! - **Error Handling** ([`error`]): [`HttpError`], [`ResponseError`], [`UpgradeError`]

mod message;
pub use message::Message;
pub use message::PayloadItem;

mod response;
pub(crate) use response::reason_of;
pub use response::ReasonPhrase;
pub use response::ResponseHeader;

mod trailer;
pub use trailer::Trailer;

mod error;
pub use error::HttpError;
pub use error::ResponseError;
pub use error::UpgradeError;
