//! HTTP response header handling implementation.
//!
//! This module wraps the standard `http::Response` type to represent the parsed
//! status line and header section of a response before any body has arrived.

use bytes::Bytes;
use http::response::Parts;
use http::{HeaderMap, Response, StatusCode, Version};

/// Represents an HTTP response header.
///
/// This struct wraps a `http::Response<()>` to provide:
/// - Access to the status line (code, reason phrase, version)
/// - Access to the header fields
/// - Conversion from different response formats
#[derive(Debug)]
pub struct ResponseHeader {
    inner: Response<()>,
}

impl AsRef<Response<()>> for ResponseHeader {
    fn as_ref(&self) -> &Response<()> {
        &self.inner
    }
}

impl AsMut<Response<()>> for ResponseHeader {
    fn as_mut(&mut self) -> &mut Response<()> {
        &mut self.inner
    }
}

impl ResponseHeader {
    /// Consumes the header and returns the inner `Response<()>`.
    pub fn into_inner(self) -> Response<()> {
        self.inner
    }

    /// Consumes the header and returns its parts.
    pub fn into_parts(self) -> Parts {
        self.inner.into_parts().0
    }

    /// Returns the response status.
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Returns the response's HTTP version.
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Returns a reference to the response's headers.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Returns the reason phrase of the status line.
    ///
    /// A non-canonical phrase attached by the decoder as a [`ReasonPhrase`] extension wins,
    /// otherwise the canonical reason of the status code is used.
    pub fn reason(&self) -> String {
        reason_of(self.inner.status(), self.inner.extensions().get::<ReasonPhrase>())
    }
}

pub(crate) fn reason_of(status: StatusCode, phrase: Option<&ReasonPhrase>) -> String {
    match phrase {
        Some(phrase) => String::from_utf8_lossy(phrase.as_bytes()).into_owned(),
        None => status.canonical_reason().unwrap_or_default().to_owned(),
    }
}

/// Converts response parts into a ResponseHeader.
impl From<Parts> for ResponseHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Response::from_parts(parts, ()) }
    }
}

/// Converts a bodyless response into a ResponseHeader.
impl From<Response<()>> for ResponseHeader {
    #[inline]
    fn from(inner: Response<()>) -> Self {
        Self { inner }
    }
}

/// The reason phrase of an HTTP/1 status line.
///
/// Decoders attach this to the response extensions only when the server sent a
/// phrase that differs from the canonical one, e.g. `HTTP/1.1 200 Awesome`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReasonPhrase(Bytes);

impl ReasonPhrase {
    pub const fn from_static(reason: &'static [u8]) -> Self {
        Self(Bytes::from_static(reason))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for ReasonPhrase {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<&str> for ReasonPhrase {
    fn from(str: &str) -> Self {
        Self(Bytes::copy_from_slice(str.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderValue, StatusCode, Version};

    use super::*;

    #[test]
    fn canonical_reason() {
        let header: ResponseHeader = Response::builder()
            .status(StatusCode::NOT_FOUND)
            .version(Version::HTTP_11)
            .header(http::header::CONTENT_LENGTH, "0")
            .body(())
            .unwrap()
            .into();

        assert_eq!(header.status(), StatusCode::NOT_FOUND);
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.reason(), "Not Found");
        assert_eq!(header.headers().get(http::header::CONTENT_LENGTH), Some(&HeaderValue::from_static("0")));
    }

    #[test]
    fn non_canonical_reason() {
        let header: ResponseHeader = Response::builder()
            .status(StatusCode::OK)
            .extension(ReasonPhrase::from_static(b"Awesome"))
            .body(())
            .unwrap()
            .into();

        assert_eq!(header.reason(), "Awesome");
    }

    #[test]
    fn unknown_status_has_empty_reason() {
        let header: ResponseHeader = Response::builder().status(599).body(()).unwrap().into();

        assert_eq!(header.status().as_u16(), 599);
        assert_eq!(header.reason(), "");
    }
}
