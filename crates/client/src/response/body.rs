//! Pull-based access to a streaming response body.
//!
//! [`ResponseBody`] installs itself as the data, end and exception handler of a
//! [`ClientResponse`] and exposes the events through the standard
//! `http_body::Body` interface, so the usual body utilities can consume them.
//! Backpressure is mapped onto the response's pause/resume protocol.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use bytes::Bytes;
use http_body::{Body, Frame};
use tracing::trace;

use crate::connection::Transport;
use crate::protocol::ResponseError;
use crate::response::ClientResponse;

/// Number of frames queued before the response is paused.
pub const DEFAULT_HIGH_WATER: usize = 16;

/// A response body implementing `http_body::Body`.
///
/// Frames are produced in the order the response delivers them: data frames for
/// chunks, one trailers frame if the trailer is not empty, then the end of the
/// stream. A transport error is yielded as an `Err` frame and ends the stream.
pub struct ResponseBody<T: Transport> {
    response: ClientResponse<T>,
    queue: Rc<RefCell<FrameQueue>>,
    high_water: usize,
}

#[derive(Default)]
struct FrameQueue {
    frames: VecDeque<Result<Frame<Bytes>, ResponseError>>,
    finished: bool,
    paused: bool,
    waker: Option<Waker>,
}

impl FrameQueue {
    fn push(&mut self, frame: Result<Frame<Bytes>, ResponseError>) {
        self.frames.push_back(frame);
        self.wake();
    }

    fn finish(&mut self) {
        self.finished = true;
        self.wake();
    }

    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

impl<T> ClientResponse<T>
where
    T: Transport + 'static,
{
    /// Converts the response into a pull based body.
    ///
    /// Replaces the data, end and exception handlers.
    pub fn into_body(self) -> ResponseBody<T> {
        ResponseBody::with_high_water(self, DEFAULT_HIGH_WATER)
    }
}

impl<T> ResponseBody<T>
where
    T: Transport + 'static,
{
    /// Creates a body that pauses the response once `high_water` frames are queued
    /// and resumes it when the consumer has drained half of them.
    pub fn with_high_water(response: ClientResponse<T>, high_water: usize) -> Self {
        let high_water = high_water.max(1);
        let queue = Rc::new(RefCell::new(FrameQueue::default()));

        let data_queue = Rc::clone(&queue);
        let weak = response.downgrade();
        response.data_handler(move |chunk| {
            let queued = {
                let mut queue = data_queue.borrow_mut();
                if queue.finished {
                    trace!(len = chunk.len(), "body already finished, chunk dropped");
                    return;
                }
                queue.push(Ok(Frame::data(chunk)));
                if queue.frames.len() < high_water || queue.paused {
                    return;
                }
                queue.paused = true;
                queue.frames.len()
            };

            if let Some(response) = weak.upgrade() {
                trace!(queued, "body frames not consumed, pause response");
                response.pause();
            }
        });

        let end_queue = Rc::clone(&queue);
        let weak = response.downgrade();
        response.end_handler(move || {
            let trailers = weak.upgrade().map(|response| response.trailers()).filter(|trailers| !trailers.is_empty());

            let mut queue = end_queue.borrow_mut();
            if queue.finished {
                trace!("body already finished, end dropped");
                return;
            }
            if let Some(trailers) = trailers {
                queue.push(Ok(Frame::trailers(trailers.as_header_map().clone())));
            }
            queue.finish();
        });

        let error_queue = Rc::clone(&queue);
        response.exception_handler(move |error| {
            let mut queue = error_queue.borrow_mut();
            if queue.finished {
                trace!(cause = %error, "body already finished, error dropped");
                return;
            }
            queue.push(Err(error));
            queue.finish();
        });

        Self { response, queue, high_water }
    }

    pub fn response(&self) -> &ClientResponse<T> {
        &self.response
    }
}

impl<T> Body for ResponseBody<T>
where
    T: Transport + 'static,
{
    type Data = Bytes;
    type Error = ResponseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        let (next, finished, resume) = {
            let mut queue = this.queue.borrow_mut();
            let next = queue.frames.pop_front();

            let resume = queue.paused && queue.frames.len() <= this.high_water / 2;
            if resume {
                queue.paused = false;
            }

            if next.is_none() && !queue.finished {
                queue.waker = Some(cx.waker().clone());
            }
            (next, queue.finished, resume)
        };

        if resume {
            trace!("body frames drained, resume response");
            this.response.resume();
        }

        match next {
            Some(frame) => Poll::Ready(Some(frame)),
            None if finished => Poll::Ready(None),
            None => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        let queue = self.queue.borrow();
        queue.finished && queue.frames.is_empty()
    }
}

impl<T: Transport> fmt::Debug for ResponseBody<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.queue.borrow();
        f.debug_struct("ResponseBody")
            .field("queued", &queue.frames.len())
            .field("finished", &queue.finished)
            .field("high_water", &self.high_water)
            .finish()
    }
}
