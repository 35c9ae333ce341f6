//! Consumer side of a streaming HTTP response.
//!
//! - [`ClientResponse`]: ordered, flow-controlled delivery of body chunks and the end
//!   event to consumer handlers, plus status accessors and the raw socket hand-over
//! - [`ViewCache`] / [`MultiMap`]: lazily derived header, trailer and cookie views
//! - [`ResponseBody`]: the same events exposed as an `http_body::Body`

mod body;
mod client_response;
mod views;

pub use body::DEFAULT_HIGH_WATER;
pub use body::ResponseBody;
pub use client_response::ClientResponse;
pub use client_response::WeakClientResponse;
pub use views::MultiMap;
pub use views::ViewCache;
