use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use bytes::{Bytes, BytesMut};
use http::{StatusCode, Version};
use once_cell::unsync::OnceCell;
use tracing::{debug, info, trace};

use crate::connection::{RequestProgress, Transport};
use crate::context::Scheduler;
use crate::protocol::{ReasonPhrase, ResponseError, ResponseHeader, Trailer, reason_of};
use crate::response::{MultiMap, ViewCache};

/// The consumer side of a streaming HTTP response.
///
/// `ClientResponse` receives body chunks and the end of the body from the transport
/// (see [`handle_chunk`](Self::handle_chunk), [`handle_end`](Self::handle_end) and
/// [`handle_exception`](Self::handle_exception)) and hands them to the handlers the
/// consumer installed, strictly in arrival order.
///
/// # Flow Control
///
/// [`pause`](Self::pause) buffers every chunk (and the end) that arrives afterwards and
/// asks the transport to stop reading. [`resume`](Self::resume) schedules the buffered
/// events on the execution context and then lets the transport read again. Chunks
/// that the transport delivers before those scheduled replays have run are queued
/// behind the buffered ones, so the consumer never observes them out of order.
///
/// # Handles
///
/// `ClientResponse` is a cheap cloneable handle over shared state. Handlers that need
/// to call back into the response (for example to pause it) should capture a
/// [`WeakClientResponse`] obtained from [`downgrade`](Self::downgrade), otherwise the
/// handler keeps the response alive forever.
pub struct ClientResponse<T: Transport> {
    inner: Rc<Inner<T>>,
}

/// A weak handle to a [`ClientResponse`].
pub struct WeakClientResponse<T: Transport> {
    inner: Weak<Inner<T>>,
}

struct Inner<T: Transport> {
    status: StatusCode,
    status_message: String,
    version: Version,
    conn: T,
    context: Box<dyn Scheduler>,
    request: Rc<dyn RequestProgress>,
    flow: RefCell<FlowState>,
    data_handler: HandlerSlot<Bytes>,
    end_handler: HandlerSlot<()>,
    exception_handler: HandlerSlot<ResponseError>,
    views: ViewCache,
    net_socket: OnceCell<Rc<T::Socket>>,
}

#[derive(Default)]
struct FlowState {
    paused: bool,
    pending_chunks: VecDeque<Bytes>,
    pending_end: Option<Trailer>,
    ended: bool,
}

/// Holds the single active handler of one event type, last write wins.
struct HandlerSlot<A> {
    handler: RefCell<Option<Box<dyn FnMut(A)>>>,
}

impl<A> HandlerSlot<A> {
    fn new() -> Self {
        Self { handler: RefCell::new(None) }
    }

    fn set(&self, handler: Box<dyn FnMut(A)>) {
        *self.handler.borrow_mut() = Some(handler);
    }

    /// Invokes the handler, giving `arg` back if there is none.
    ///
    /// The handler is out of its slot while it runs, so it may replace itself.
    fn call(&self, arg: A) -> Option<A> {
        let taken = self.handler.borrow_mut().take();
        let Some(mut handler) = taken else {
            return Some(arg);
        };

        handler(arg);

        let mut slot = self.handler.borrow_mut();
        if slot.is_none() {
            *slot = Some(handler);
        }
        None
    }
}

impl<T> ClientResponse<T>
where
    T: Transport + 'static,
{
    /// Creates the response for a freshly parsed status line and header section.
    ///
    /// * `conn` - the transport, receives pause requests and hands out the raw socket
    /// * `context` - runs the deferred replays scheduled by [`resume`](Self::resume)
    /// * `request` - the paired request, notified of every delivered chunk
    pub fn new<S>(header: ResponseHeader, conn: T, context: S, request: Rc<dyn RequestProgress>) -> Self
    where
        S: Scheduler + 'static,
    {
        let parts = header.into_parts();
        let status_message = reason_of(parts.status, parts.extensions.get::<ReasonPhrase>());

        Self {
            inner: Rc::new(Inner {
                status: parts.status,
                status_message,
                version: parts.version,
                conn,
                context: Box::new(context),
                request,
                flow: RefCell::new(FlowState::default()),
                data_handler: HandlerSlot::new(),
                end_handler: HandlerSlot::new(),
                exception_handler: HandlerSlot::new(),
                views: ViewCache::new(parts.headers),
                net_socket: OnceCell::new(),
            }),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status
    }

    pub fn status_code(&self) -> u16 {
        self.inner.status.as_u16()
    }

    pub fn status_message(&self) -> &str {
        &self.inner.status_message
    }

    pub fn version(&self) -> Version {
        self.inner.version
    }

    /// The response headers, wrapped once and then shared.
    pub fn headers(&self) -> MultiMap {
        self.inner.views.headers()
    }

    /// The response trailers.
    ///
    /// Before the end of the body this is an empty placeholder. It is replaced by the
    /// real trailer when the end is delivered.
    pub fn trailers(&self) -> MultiMap {
        self.inner.views.trailers()
    }

    /// All `Set-Cookie` values, computed on first call and never refreshed.
    pub fn cookies(&self) -> Rc<[String]> {
        self.inner.views.cookies()
    }

    pub fn data_handler<F>(&self, handler: F) -> &Self
    where
        F: FnMut(Bytes) + 'static,
    {
        self.inner.data_handler.set(Box::new(handler));
        self
    }

    pub fn end_handler<F>(&self, mut handler: F) -> &Self
    where
        F: FnMut() + 'static,
    {
        self.inner.end_handler.set(Box::new(move |()| handler()));
        self
    }

    pub fn exception_handler<F>(&self, handler: F) -> &Self
    where
        F: FnMut(ResponseError) + 'static,
    {
        self.inner.exception_handler.set(Box::new(handler));
        self
    }

    /// Collects the whole body and invokes `handler` once with it at the end.
    ///
    /// Replaces the data and end handlers.
    pub fn body_handler<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(Bytes) + 'static,
    {
        let body = Rc::new(RefCell::new(BytesMut::new()));

        let collecting = Rc::clone(&body);
        self.data_handler(move |chunk| collecting.borrow_mut().extend_from_slice(&chunk));

        let mut handler = Some(handler);
        self.end_handler(move || {
            if let Some(handler) = handler.take() {
                let collected = body.borrow_mut().split().freeze();
                handler(collected);
            }
        })
    }

    /// Stops delivering events and asks the transport to stop reading.
    pub fn pause(&self) -> &Self {
        let was_paused = std::mem::replace(&mut self.inner.flow.borrow_mut().paused, true);
        if !was_paused {
            debug!("pause response");
        }
        self.inner.conn.set_paused(true);
        self
    }

    /// Schedules the replay of buffered events, then lets the transport read again.
    ///
    /// A no-op apart from the transport notification when nothing was buffered.
    pub fn resume(&self) -> &Self {
        // replays must be queued before new chunks can be delivered directly
        self.schedule_replay();
        self.inner.flow.borrow_mut().paused = false;
        self.inner.conn.set_paused(false);
        self
    }

    pub fn is_paused(&self) -> bool {
        self.inner.flow.borrow().paused
    }

    /// Returns true once the end has been delivered to the consumer.
    pub fn is_ended(&self) -> bool {
        self.inner.flow.borrow().ended
    }

    /// Takes the connection over as a raw socket, e.g. after a protocol upgrade.
    ///
    /// The socket is requested from the transport on the first call only, every
    /// call returns the same instance.
    pub fn net_socket(&self) -> Rc<T::Socket> {
        let socket = self.inner.net_socket.get_or_init(|| {
            info!(status = self.status_code(), "hand the connection over as raw socket");
            Rc::new(self.inner.conn.create_net_socket())
        });
        Rc::clone(socket)
    }

    pub fn downgrade(&self) -> WeakClientResponse<T> {
        WeakClientResponse { inner: Rc::downgrade(&self.inner) }
    }

    /// Called by the transport with the next body chunk, in wire order.
    pub fn handle_chunk(&self, data: Bytes) {
        let len = data.len();
        let paused = {
            let mut flow = self.inner.flow.borrow_mut();
            flow.pending_chunks.push_back(data);
            flow.paused
        };

        if paused {
            trace!(len, "buffer chunk while paused");
            return;
        }

        // chunks still waiting for their scheduled replay go first
        self.drain_pending();
    }

    /// Called by the transport once, after the last chunk.
    pub fn handle_end(&self, trailer: Trailer) {
        if !self.is_paused() {
            self.drain_pending();
        }

        {
            let mut flow = self.inner.flow.borrow_mut();
            if flow.paused {
                trace!("buffer end while paused");
                flow.pending_end = Some(trailer);
                return;
            }
        }

        self.deliver_end(trailer);
    }

    /// Called by the transport when the exchange failed. Never buffered.
    pub fn handle_exception(&self, error: ResponseError) {
        if let Some(error) = self.inner.exception_handler.call(error) {
            debug!(cause = %error, "no exception handler installed, error dropped");
        }
    }

    fn schedule_replay(&self) {
        let (chunks, end) = {
            let mut flow = self.inner.flow.borrow_mut();
            (flow.pending_chunks.len(), flow.pending_end.take())
        };

        if chunks == 0 && end.is_none() {
            return;
        }

        debug!(chunks, end = end.is_some(), "schedule replay of buffered events");

        for _ in 0..chunks {
            let response = self.downgrade();
            self.inner.context.schedule(Box::new(move || match response.upgrade() {
                Some(response) => response.replay_chunk(),
                None => trace!("response dropped before chunk replay"),
            }));
        }

        if let Some(trailer) = end {
            let response = self.downgrade();
            self.inner.context.schedule(Box::new(move || match response.upgrade() {
                Some(response) => response.handle_end(trailer),
                None => trace!("response dropped before end replay"),
            }));
        }
    }

    /// Delivers the oldest buffered chunk, unless the response was paused again.
    fn replay_chunk(&self) {
        let chunk = {
            let mut flow = self.inner.flow.borrow_mut();
            if flow.paused {
                return;
            }
            flow.pending_chunks.pop_front()
        };

        if let Some(chunk) = chunk {
            trace!(len = chunk.len(), "replay buffered chunk");
            self.deliver_chunk(chunk);
        }
    }

    /// Delivers buffered chunks in order until none are left or a handler pauses.
    fn drain_pending(&self) {
        loop {
            let chunk = {
                let mut flow = self.inner.flow.borrow_mut();
                if flow.paused {
                    return;
                }
                flow.pending_chunks.pop_front()
            };

            match chunk {
                Some(chunk) => self.deliver_chunk(chunk),
                None => return,
            }
        }
    }

    fn deliver_chunk(&self, chunk: Bytes) {
        self.inner.request.data_received();
        if let Some(chunk) = self.inner.data_handler.call(chunk) {
            trace!(len = chunk.len(), "no data handler installed, chunk dropped");
        }
    }

    fn deliver_end(&self, trailer: Trailer) {
        self.inner.views.set_trailer(trailer);
        self.inner.flow.borrow_mut().ended = true;
        debug!(status = self.status_code(), "response ended");
        self.inner.end_handler.call(());
    }
}

impl<T: Transport> WeakClientResponse<T> {
    pub fn upgrade(&self) -> Option<ClientResponse<T>> {
        self.inner.upgrade().map(|inner| ClientResponse { inner })
    }
}

impl<T: Transport> Clone for ClientResponse<T> {
    fn clone(&self) -> Self {
        Self { inner: Rc::clone(&self.inner) }
    }
}

impl<T: Transport> Clone for WeakClientResponse<T> {
    fn clone(&self) -> Self {
        Self { inner: Weak::clone(&self.inner) }
    }
}

impl<T: Transport> fmt::Debug for ClientResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flow = self.inner.flow.borrow();
        f.debug_struct("ClientResponse")
            .field("status", &self.inner.status)
            .field("paused", &flow.paused)
            .field("pending_chunks", &flow.pending_chunks.len())
            .field("pending_end", &flow.pending_end.is_some())
            .field("ended", &flow.ended)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> fmt::Debug for WeakClientResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakClientResponse").finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use http::{HeaderMap, HeaderValue, Response};

    use super::*;
    use crate::connection::{MockTransport, RequestActivity};
    use crate::context::TaskQueue;

    #[derive(Default)]
    struct FakeTransport {
        pause_calls: RefCell<Vec<bool>>,
        sockets: Cell<u32>,
    }

    impl Transport for FakeTransport {
        type Socket = u32;

        fn set_paused(&self, paused: bool) {
            self.pause_calls.borrow_mut().push(paused);
        }

        fn create_net_socket(&self) -> u32 {
            self.sockets.set(self.sockets.get() + 1);
            self.sockets.get()
        }
    }

    type Events = Rc<RefCell<Vec<String>>>;

    struct Fixture {
        response: ClientResponse<Rc<FakeTransport>>,
        transport: Rc<FakeTransport>,
        queue: TaskQueue,
        request: Rc<RequestActivity>,
        events: Events,
    }

    fn header(headers: &[(&'static str, &'static str)]) -> ResponseHeader {
        let mut builder = Response::builder().status(StatusCode::OK);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into()
    }

    fn fixture_with(header: ResponseHeader) -> Fixture {
        let transport = Rc::new(FakeTransport::default());
        let queue = TaskQueue::new();
        let request = Rc::new(RequestActivity::new());
        let progress = Rc::clone(&request) as Rc<dyn RequestProgress>;
        let response = ClientResponse::new(header, Rc::clone(&transport), queue.clone(), progress);

        let events: Events = Rc::default();
        let data_events = Rc::clone(&events);
        let end_events = Rc::clone(&events);
        response
            .data_handler(move |chunk| data_events.borrow_mut().push(String::from_utf8_lossy(&chunk).into_owned()))
            .end_handler(move || end_events.borrow_mut().push("<end>".to_owned()));

        Fixture { response, transport, queue, request, events }
    }

    fn fixture() -> Fixture {
        fixture_with(header(&[]))
    }

    fn trailer(name: &'static str, value: &'static str) -> Trailer {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        Trailer::new(headers)
    }

    fn seen(events: &Events) -> Vec<String> {
        events.borrow().clone()
    }

    #[test]
    fn status_accessors() {
        let header: ResponseHeader = Response::builder()
            .status(StatusCode::CREATED)
            .extension(ReasonPhrase::from_static(b"Made It"))
            .body(())
            .unwrap()
            .into();
        let f = fixture_with(header);

        assert_eq!(f.response.status(), StatusCode::CREATED);
        assert_eq!(f.response.status_code(), 201);
        assert_eq!(f.response.status_message(), "Made It");
        assert_eq!(f.response.version(), Version::HTTP_11);
    }

    #[test]
    fn chunks_delivered_in_order_without_pause() {
        let f = fixture();

        for chunk in ["c1", "c2", "c3"] {
            f.response.handle_chunk(Bytes::from_static(chunk.as_bytes()));
        }

        assert_eq!(seen(&f.events), vec!["c1", "c2", "c3"]);
        assert_eq!(f.request.received_chunks(), 3);
        assert!(f.queue.is_empty());
    }

    #[test]
    fn end_without_pause_exposes_trailer() {
        let f = fixture();

        assert!(f.response.trailers().is_empty());

        f.response.handle_chunk(Bytes::from_static(b"x"));
        f.response.handle_end(trailer("x-trace", "1"));

        assert_eq!(seen(&f.events), vec!["x", "<end>"]);
        assert!(f.response.is_ended());
        assert_eq!(f.response.trailers().get("X-Trace"), Some("1"));
    }

    #[test]
    fn paused_chunks_and_end_replayed_in_order() {
        let f = fixture();

        f.response.pause();
        f.response.handle_chunk(Bytes::from_static(b"a"));
        f.response.handle_chunk(Bytes::from_static(b"b"));
        f.response.handle_end(Trailer::empty());

        assert!(seen(&f.events).is_empty());
        assert!(!f.response.is_ended());

        f.response.resume();
        // replays are deferred to the execution context
        assert!(seen(&f.events).is_empty());
        assert_eq!(f.queue.len(), 3);

        assert_eq!(f.queue.run_pending(), 3);
        assert_eq!(seen(&f.events), vec!["a", "b", "<end>"]);
        assert!(f.response.is_ended());
    }

    #[test]
    fn chunk_arriving_before_replay_runs_stays_behind_buffered_chunks() {
        let f = fixture();

        f.response.pause();
        f.response.handle_chunk(Bytes::from_static(b"a"));
        f.response.handle_chunk(Bytes::from_static(b"b"));
        f.response.resume();

        // the transport delivers directly before the scheduled replays ran
        f.response.handle_chunk(Bytes::from_static(b"c"));
        assert_eq!(seen(&f.events), vec!["a", "b", "c"]);

        // the stale replays find nothing left to deliver
        assert_eq!(f.queue.run_pending(), 2);
        f.response.handle_chunk(Bytes::from_static(b"d"));
        f.response.handle_end(Trailer::empty());

        assert_eq!(seen(&f.events), vec!["a", "b", "c", "d", "<end>"]);
        assert_eq!(f.request.received_chunks(), 4);
    }

    #[test]
    fn end_arriving_before_replay_runs_waits_for_buffered_chunks() {
        let f = fixture();

        f.response.pause();
        f.response.handle_chunk(Bytes::from_static(b"a"));
        f.response.resume();
        f.response.handle_end(Trailer::empty());

        assert_eq!(seen(&f.events), vec!["a", "<end>"]);
        f.queue.run_pending();
        assert_eq!(seen(&f.events), vec!["a", "<end>"]);
    }

    #[test]
    fn pausing_again_before_replay_keeps_chunks_buffered() {
        let f = fixture();

        f.response.pause();
        f.response.handle_chunk(Bytes::from_static(b"a"));
        f.response.handle_end(Trailer::empty());
        f.response.resume();
        f.response.pause();

        f.queue.run_pending();
        assert!(seen(&f.events).is_empty());

        f.response.resume();
        f.queue.run_pending();
        assert_eq!(seen(&f.events), vec!["a", "<end>"]);
    }

    #[test]
    fn handler_can_pause_from_inside_data_callback() {
        let f = fixture();
        let weak = f.response.downgrade();
        let events = Rc::clone(&f.events);
        f.response.data_handler(move |chunk| {
            events.borrow_mut().push(String::from_utf8_lossy(&chunk).into_owned());
            if let Some(response) = weak.upgrade() {
                response.pause();
            }
        });

        f.response.handle_chunk(Bytes::from_static(b"1"));
        f.response.handle_chunk(Bytes::from_static(b"2"));
        f.response.handle_chunk(Bytes::from_static(b"3"));
        assert_eq!(seen(&f.events), vec!["1"]);

        f.response.resume();
        f.queue.run_pending();
        // the handler pauses again after every chunk
        assert_eq!(seen(&f.events), vec!["1", "2"]);

        f.response.resume();
        f.queue.run_pending();
        assert_eq!(seen(&f.events), vec!["1", "2", "3"]);
    }

    #[test]
    fn resume_without_pause_schedules_nothing() {
        let f = fixture();

        f.response.resume();
        f.response.resume();

        assert!(f.queue.is_empty());
        assert!(!f.response.is_paused());
        assert_eq!(*f.transport.pause_calls.borrow(), vec![false, false]);
    }

    #[test]
    fn pause_is_forwarded_to_transport() {
        let f = fixture();

        f.response.pause();
        f.response.pause();
        f.response.resume();

        assert_eq!(*f.transport.pause_calls.borrow(), vec![true, true, false]);
    }

    #[test]
    fn replay_after_drop_is_a_no_op() {
        let Fixture { response, queue, events, .. } = fixture();

        response.pause();
        response.handle_chunk(Bytes::from_static(b"a"));
        response.resume();
        drop(response);

        assert_eq!(queue.run_pending(), 1);
        assert!(seen(&events).is_empty());
    }

    #[test]
    fn exception_delivered_to_handler() {
        let f = fixture();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let captured = Rc::clone(&errors);
        f.response.exception_handler(move |e| captured.borrow_mut().push(e.to_string()));

        f.response.pause();
        f.response.handle_exception(ResponseError::ConnectionClosed);

        assert_eq!(errors.borrow().len(), 1);
        assert!(f.queue.is_empty());
    }

    #[test]
    fn exception_without_handler_is_dropped() {
        let f = fixture();

        f.response.handle_exception(ResponseError::decode("bad chunk size"));

        assert!(seen(&f.events).is_empty());
    }

    #[test]
    fn last_handler_wins() {
        let f = fixture();
        let replaced = Rc::new(Cell::new(0));
        let counter = Rc::clone(&replaced);
        f.response.data_handler(move |_| counter.set(counter.get() + 1));

        f.response.handle_chunk(Bytes::from_static(b"a"));

        assert_eq!(replaced.get(), 1);
        assert!(seen(&f.events).is_empty());
    }

    #[test]
    fn body_handler_collects_whole_body() {
        let f = fixture();
        let body = Rc::new(RefCell::new(None));
        let captured = Rc::clone(&body);
        f.response.body_handler(move |bytes| *captured.borrow_mut() = Some(bytes));

        f.response.pause();
        f.response.handle_chunk(Bytes::from_static(b"hello"));
        f.response.handle_chunk(Bytes::from_static(b", "));
        f.response.resume();
        f.response.handle_chunk(Bytes::from_static(b"world"));
        f.response.handle_end(Trailer::empty());

        assert_eq!(body.borrow().as_deref(), Some(&b"hello, world"[..]));
    }

    #[test]
    fn cookies_before_trailer_are_not_recomputed() {
        let f = fixture_with(header(&[("set-cookie", "a=1"), ("set-cookie", "b=2")]));

        let before = f.response.cookies();
        f.response.handle_end(trailer("set-cookie", "c=3"));
        let after = f.response.cookies();

        assert_eq!(&*after, &["a=1".to_owned(), "b=2".to_owned()]);
        assert!(Rc::ptr_eq(&before, &after));
    }

    #[test]
    fn cookies_after_trailer_include_it() {
        let f = fixture_with(header(&[("set-cookie", "a=1")]));

        f.response.handle_end(trailer("set-cookie", "c=3"));

        assert_eq!(&*f.response.cookies(), &["a=1".to_owned(), "c=3".to_owned()]);
        assert!(f.response.headers().ptr_eq(&f.response.headers()));
    }

    #[test]
    fn net_socket_is_requested_once() {
        let f = fixture();

        let first = f.response.net_socket();
        let second = f.response.net_socket();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(f.transport.sockets.get(), 1);
    }

    #[test]
    fn transport_sees_pause_then_resume() {
        let mut transport = MockTransport::new();
        let mut sequence = mockall::Sequence::new();
        transport.expect_set_paused().withf(|paused| *paused).times(1).in_sequence(&mut sequence).return_const(());
        transport.expect_set_paused().withf(|paused| !*paused).times(1).in_sequence(&mut sequence).return_const(());
        transport.expect_create_net_socket().times(1).return_const(7_u32);

        let queue = TaskQueue::new();
        let response = ClientResponse::new(header(&[]), transport, queue.clone(), Rc::new(RequestActivity::new()));

        response.pause();
        response.handle_chunk(Bytes::from_static(b"a"));
        response.resume();
        queue.run_pending();

        assert_eq!(*response.net_socket(), 7);
        assert_eq!(*response.net_socket(), 7);
    }
}
