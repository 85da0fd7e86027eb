//! HTTP/1.1 response builder.
//!
//! A [`Response`] carries either an in-memory body, framed with
//! `Content-Length`, or a [`StreamBody`] that is copied to the connection
//! after the head. A stream of known length is still framed with
//! `Content-Length`; one of unknown length uses chunked transfer coding.

use std::fmt;
use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{Headers, StatusCode};

/// Byte source for a streamed body.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

const CHUNK_SIZE: usize = 8 * 1024;

/// A body read from a stream while it is being written.
pub struct StreamBody {
    reader: ByteStream,
    length: Option<u64>,
}

impl StreamBody {
    /// `length` is the exact number of bytes `reader` yields, when known.
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static, length: Option<u64>) -> Self {
        Self {
            reader: Box::new(reader),
            length,
        }
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Copy the stream to `sink` in the framing announced by the head.
    ///
    /// The head has already been sent, so a short or failing stream can no
    /// longer be answered with a different status; the error is returned and
    /// the connection must be dropped.
    pub(crate) async fn write_to<W>(mut self, sink: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self.length {
            Some(length) => {
                let mut limited = (&mut self.reader).take(length);
                let copied = tokio::io::copy(&mut limited, sink).await?;
                if copied < length {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("stream ended after {copied} of {length} bytes"),
                    ));
                }
            }
            None => {
                let mut chunk = vec![0u8; CHUNK_SIZE];
                loop {
                    let n = self.reader.read(&mut chunk).await?;
                    if n == 0 {
                        break;
                    }
                    sink.write_all(format!("{n:x}\r\n").as_bytes()).await?;
                    sink.write_all(&chunk[..n]).await?;
                    sink.write_all(b"\r\n").await?;
                }
                sink.write_all(b"0\r\n\r\n").await?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBody")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum Body {
    Full(Bytes),
    Stream(StreamBody),
}

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use maple::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .content_type("application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// let (head, streamed) = response.into_parts();
/// let text = std::str::from_utf8(&head).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// assert!(streamed.is_none());
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Body::Full(Bytes::new()),
            keep_alive: true,
        }
    }

    /// Sets a response header, replacing an earlier value of the same name.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn content_type(self, value: impl Into<String>) -> Self {
        self.header("Content-Type", value)
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(self, body: impl Into<String>) -> Self {
        self.body_bytes(Bytes::from(body.into()))
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::Full(body.into());
        self
    }

    /// Streams the body from `stream` when the response is sent.
    #[must_use]
    pub fn body_stream(mut self, stream: StreamBody) -> Self {
        self.body = Body::Stream(stream);
        self
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Headers set so far, without the framing headers added on serialization.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The in-memory body. Empty for a streamed body.
    pub fn body_ref(&self) -> &[u8] {
        match &self.body {
            Body::Full(bytes) => bytes.as_ref(),
            Body::Stream(_) => &[],
        }
    }

    pub fn is_streamed(&self) -> bool {
        matches!(self.body, Body::Stream(_))
    }

    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Serialize the head, followed by the body when it is held in memory.
    ///
    /// A streamed body is handed back untouched for the caller to copy after
    /// the head; the head already announces its framing.
    pub fn into_parts(mut self) -> (BytesMut, Option<StreamBody>) {
        let (framing, body, stream) = match self.body {
            Body::Full(bytes) => (Framing::Length(bytes.len() as u64), Some(bytes), None),
            Body::Stream(stream) => match stream.length {
                Some(length) => (Framing::Length(length), None, Some(stream)),
                None => (Framing::Chunked, None, Some(stream)),
            },
        };

        let has_body = match framing {
            Framing::Length(n) => n > 0,
            Framing::Chunked => true,
        };
        if has_body && !self.headers.contains("content-type") {
            self.headers.insert("Content-Type", "text/plain; charset=utf-8");
        }
        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        self.headers.insert("Connection", connection);

        let body_len = body.as_ref().map_or(0, Bytes::len);
        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64 + body_len);
        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }
        match framing {
            Framing::Length(n) => buf.put(format!("Content-Length: {n}\r\n").as_bytes()),
            Framing::Chunked => buf.put(&b"Transfer-Encoding: chunked\r\n"[..]),
        }
        buf.put(&b"\r\n"[..]);
        if let Some(body) = body {
            buf.put(body);
        }

        (buf, stream)
    }

    /// The complete wire form of a response whose body is held in memory.
    ///
    /// For a streamed body only the head is returned; use
    /// [`into_parts`](Self::into_parts) to get at the stream.
    pub fn into_bytes(self) -> BytesMut {
        self.into_parts().0
    }
}

enum Framing {
    Length(u64),
    Chunked,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}
