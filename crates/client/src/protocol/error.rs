use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: ResponseError,
    },
}

/// Errors surfaced by the transport while a response is streaming.
///
/// These reach the consumer through the exception handler of the response and
/// are never buffered or retried.
#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("decode error: {reason}")]
    Decode { reason: String },

    #[error("connection closed before the response completed")]
    ConnectionClosed,

    #[error("no data received within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ResponseError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn decode<S: ToString>(str: S) -> Self {
        Self::Decode { reason: str.to_string() }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }
}

#[derive(Error, Debug)]
pub enum UpgradeError {
    #[error("the raw socket has already been taken")]
    AlreadyTaken,

    #[error("connection dropped before handing over the raw socket")]
    Canceled,
}
