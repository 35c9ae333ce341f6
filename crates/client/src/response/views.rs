//! Lazily derived views over response metadata.
//!
//! Header, trailer and cookie views are computed on first access and then
//! memoized. Nothing is recomputed later, except that the
//! trailers view handed out before the end of the body is an empty placeholder
//! which gets replaced by the real trailer once it arrives.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use http::header::{AsHeaderName, SET_COOKIE};
use http::{HeaderMap, HeaderName};
use once_cell::unsync::OnceCell;

use crate::protocol::Trailer;

/// A shared, read-only multi-valued header view.
///
/// Keys are case-insensitive and the values of one key keep their arrival order.
/// Cloning is cheap and clones are the same instance, see [`MultiMap::ptr_eq`].
///
/// The view is read-only. Every handle of a memoized view shares one map, so
/// callers that need to edit the fields take an owned copy through
/// [`as_header_map`](MultiMap::as_header_map).
#[derive(Clone, Default)]
pub struct MultiMap {
    inner: Rc<HeaderMap>,
}

impl MultiMap {
    pub fn new(headers: HeaderMap) -> Self {
        Self { inner: Rc::new(headers) }
    }

    /// Returns the first value of `name` as a string, if it is valid visible ASCII.
    pub fn get<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.inner.get(name).and_then(|value| value.to_str().ok())
    }

    /// Returns every value of `name` in arrival order.
    pub fn get_all<K: AsHeaderName>(&self, name: K) -> Vec<String> {
        self.inner.get_all(name).iter().map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned()).collect()
    }

    pub fn contains<K: AsHeaderName>(&self, name: K) -> bool {
        self.inner.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &HeaderName> {
        self.inner.keys()
    }

    /// Number of values, counting every value of a multi-valued key.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn as_header_map(&self) -> &HeaderMap {
        &self.inner
    }

    /// Returns true if both views are the same instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl From<HeaderMap> for MultiMap {
    fn from(headers: HeaderMap) -> Self {
        Self::new(headers)
    }
}

impl fmt::Debug for MultiMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

enum TrailersView {
    Uncached,
    Placeholder(MultiMap),
    Arrived(MultiMap),
}

/// Memoized header, trailer and cookie views of one response.
pub struct ViewCache {
    raw_headers: Cell<Option<HeaderMap>>,
    headers: OnceCell<MultiMap>,
    trailers: RefCell<TrailersView>,
    cookies: OnceCell<Rc<[String]>>,
}

impl ViewCache {
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            raw_headers: Cell::new(Some(headers)),
            headers: OnceCell::new(),
            trailers: RefCell::new(TrailersView::Uncached),
            cookies: OnceCell::new(),
        }
    }

    pub fn headers(&self) -> MultiMap {
        self.headers.get_or_init(|| MultiMap::new(self.raw_headers.take().unwrap_or_default())).clone()
    }

    /// Returns the trailer view, an empty placeholder until the trailer has arrived.
    pub fn trailers(&self) -> MultiMap {
        let mut trailers = self.trailers.borrow_mut();
        match &*trailers {
            TrailersView::Placeholder(view) | TrailersView::Arrived(view) => view.clone(),
            TrailersView::Uncached => {
                let view = MultiMap::default();
                *trailers = TrailersView::Placeholder(view.clone());
                view
            }
        }
    }

    /// Replaces the trailer view with the real trailer of the response.
    pub fn set_trailer(&self, trailer: Trailer) {
        *self.trailers.borrow_mut() = TrailersView::Arrived(MultiMap::new(trailer.into_headers()));
    }

    pub fn has_trailer(&self) -> bool {
        matches!(&*self.trailers.borrow(), TrailersView::Arrived(_))
    }

    /// All `Set-Cookie` values of the headers, followed by those of the trailer if it
    /// had already arrived on first access. Computed once.
    pub fn cookies(&self) -> Rc<[String]> {
        let cookies = self.cookies.get_or_init(|| {
            let mut cookies = self.headers().get_all(SET_COOKIE);
            if let TrailersView::Arrived(trailer) = &*self.trailers.borrow() {
                cookies.extend(trailer.get_all(SET_COOKIE));
            }
            cookies.into()
        });
        Rc::clone(cookies)
    }
}

impl fmt::Debug for ViewCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewCache")
            .field("headers_cached", &self.headers.get().is_some())
            .field("has_trailer", &self.has_trailer())
            .field("cookies_cached", &self.cookies.get().is_some())
            .finish()
    }
}
