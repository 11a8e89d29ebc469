//! Response body of the edge gateway.
//!
//! - **Streaming**: an object fetched from the store, forwarded chunk by chunk
//!   without being collected.
//! - **Buffered**: small generated bodies (errors, health output).
//! - **Empty**: no content.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use http_body::Frame;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};

/// Edge response body.
///
/// Implements [`http_body::Body`] so it can be used directly with hyper responses.
#[derive(Default)]
pub enum EdgeResponseBody {
    /// Upstream object bytes, forwarded as they arrive.
    Streaming(UnsyncBoxBody<Bytes, io::Error>),
    /// Buffered body for generated responses.
    Buffered(Full<Bytes>),
    /// No body.
    #[default]
    Empty,
}

impl fmt::Debug for EdgeResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Streaming(_) => f.write_str("EdgeResponseBody::Streaming"),
            Self::Buffered(full) => f.debug_tuple("EdgeResponseBody::Buffered").field(full).finish(),
            Self::Empty => f.write_str("EdgeResponseBody::Empty"),
        }
    }
}

impl EdgeResponseBody {
    /// Wrap a byte stream without buffering it.
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let frames = stream.map_ok(Frame::data).map_err(io::Error::other);
        Self::Streaming(StreamBody::new(frames).boxed_unsync())
    }

    /// Create a buffered body from a UTF-8 string.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self::Buffered(Full::new(Bytes::from(s.into())))
    }

    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Whether this body streams from upstream.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }
}

impl http_body::Body for EdgeResponseBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Streaming(body) => Pin::new(body).poll_frame(cx),
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Empty => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Streaming(body) => body.is_end_stream(),
            Self::Buffered(full) => full.is_end_stream(),
            Self::Empty => true,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Streaming(body) => body.size_hint(),
            Self::Buffered(full) => full.size_hint(),
            Self::Empty => http_body::SizeHint::with_exact(0),
        }
    }
}
