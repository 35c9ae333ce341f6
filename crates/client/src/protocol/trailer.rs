//! The terminal marker of a response body.

use http::HeaderMap;

/// End-of-body marker, optionally carrying trailing header fields.
///
/// A body without trailer fields still ends with a `Trailer`, it is just empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trailer {
    headers: HeaderMap,
}

impl Trailer {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// A trailer without any trailing fields.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }
}

impl From<HeaderMap> for Trailer {
    #[inline]
    fn from(headers: HeaderMap) -> Self {
        Self { headers }
    }
}
