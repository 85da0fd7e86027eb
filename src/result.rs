//! Action results and their translation to wire responses.
//!
//! Operations describe the response they want as an [`ActionResult`], a closed
//! set of shapes. [`execute`] turns any of them into exactly one [`Response`]
//! with one status line, at most one `Content-Type`, and one body; a
//! [`ResponseSink`] then writes that response out in a single send.

use std::fmt;
use std::future::Future;
use std::io;

use bytes::Bytes;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::http::response::{ByteStream, StreamBody};
use crate::http::{Response, StatusCode};

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// The response an operation asks for.
pub enum ActionResult {
    /// Text body with an explicit content type.
    Content {
        status: StatusCode,
        content_type: String,
        body: String,
    },
    /// A JSON document, sent as `application/json`.
    Json {
        status: StatusCode,
        value: serde_json::Value,
    },
    /// In-memory file. `None` declares a zero-length body.
    FileContent {
        content_type: String,
        bytes: Option<Bytes>,
    },
    /// File copied from a byte stream while the response is written.
    /// `length` is the exact size when known; without it the body is sent
    /// chunked. `None` declares a zero-length body.
    FileStream {
        content_type: String,
        length: Option<u64>,
        stream: Option<ByteStream>,
    },
    /// A bare status code with an empty body.
    Status(StatusCode),
    /// An arbitrary value encoded with the default (JSON) formatter.
    Object {
        status: StatusCode,
        value: serde_json::Value,
    },
    /// A handler fault, sent as `500` with the error description.
    ServerError { error: anyhow::Error },
}

impl ActionResult {
    /// `200 OK`, empty body.
    pub fn ok() -> Self {
        Self::Status(StatusCode::Ok)
    }

    /// `404 Not Found`, empty body.
    pub fn not_found() -> Self {
        Self::Status(StatusCode::NotFound)
    }

    pub fn status(status: StatusCode) -> Self {
        Self::Status(status)
    }

    pub fn content(status: StatusCode, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Content {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// `200 OK` with a UTF-8 plain-text body.
    pub fn text(body: impl Into<String>) -> Self {
        Self::content(StatusCode::Ok, TEXT, body)
    }

    /// `200 OK` with `value` encoded as JSON. Unit enum variants encode as
    /// their names. A value that fails to encode becomes a server error.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        Self::json_with_status(StatusCode::Ok, value)
    }

    pub fn json_with_status<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Self::Json { status, value },
            Err(e) => Self::server_error(anyhow::Error::new(e).context("encoding JSON result")),
        }
    }

    /// `200 OK` with `value` passed through the default formatter.
    pub fn object<T: Serialize + ?Sized>(value: &T) -> Self {
        Self::object_with_status(StatusCode::Ok, value)
    }

    pub fn object_with_status<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Self::Object { status, value },
            Err(e) => Self::server_error(anyhow::Error::new(e).context("encoding object result")),
        }
    }

    pub fn file(content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self::FileContent {
            content_type: content_type.into(),
            bytes: Some(bytes.into()),
        }
    }

    /// Stream of unknown size, sent with chunked transfer coding.
    pub fn stream(content_type: impl Into<String>, stream: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::FileStream {
            content_type: content_type.into(),
            length: None,
            stream: Some(Box::new(stream)),
        }
    }

    /// Stream of exactly `length` bytes, sent behind `Content-Length`.
    pub fn stream_sized(
        content_type: impl Into<String>,
        length: u64,
        stream: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self::FileStream {
            content_type: content_type.into(),
            length: Some(length),
            stream: Some(Box::new(stream)),
        }
    }

    pub fn server_error(error: impl Into<anyhow::Error>) -> Self {
        Self::ServerError {
            error: error.into(),
        }
    }

    /// Status the response will carry.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Content { status, .. }
            | Self::Json { status, .. }
            | Self::Object { status, .. } => *status,
            Self::FileContent { .. } | Self::FileStream { .. } => StatusCode::Ok,
            Self::Status(status) => *status,
            Self::ServerError { .. } => StatusCode::InternalServerError,
        }
    }
}

impl fmt::Debug for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content {
                status,
                content_type,
                body,
            } => f
                .debug_struct("Content")
                .field("status", status)
                .field("content_type", content_type)
                .field("len", &body.len())
                .finish(),
            Self::Json { status, value } => f
                .debug_struct("Json")
                .field("status", status)
                .field("value", value)
                .finish(),
            Self::FileContent {
                content_type,
                bytes,
            } => f
                .debug_struct("FileContent")
                .field("content_type", content_type)
                .field("len", &bytes.as_ref().map_or(0, Bytes::len))
                .finish(),
            Self::FileStream {
                content_type,
                length,
                stream,
            } => f
                .debug_struct("FileStream")
                .field("content_type", content_type)
                .field("length", length)
                .field("present", &stream.is_some())
                .finish(),
            Self::Status(status) => f.debug_tuple("Status").field(status).finish(),
            Self::Object { status, value } => f
                .debug_struct("Object")
                .field("status", status)
                .field("value", value)
                .finish(),
            Self::ServerError { error } => f
                .debug_struct("ServerError")
                .field("error", &format_args!("{error:#}"))
                .finish(),
        }
    }
}

/// Conversion from an operation's return value into an [`ActionResult`].
pub trait IntoActionResult: Send + 'static {
    fn into_action_result(self) -> ActionResult;
}

impl IntoActionResult for ActionResult {
    fn into_action_result(self) -> ActionResult {
        self
    }
}

/// An operation with nothing to return answers `200 OK`.
impl IntoActionResult for () {
    fn into_action_result(self) -> ActionResult {
        ActionResult::ok()
    }
}

impl IntoActionResult for StatusCode {
    fn into_action_result(self) -> ActionResult {
        ActionResult::Status(self)
    }
}

impl IntoActionResult for serde_json::Value {
    fn into_action_result(self) -> ActionResult {
        ActionResult::Object {
            status: StatusCode::Ok,
            value: self,
        }
    }
}

/// Translate `result` into a response.
///
/// An [`ActionResult::FileStream`] is not read here: its stream rides on the
/// response and is copied by [`ResponseSink::send`] after the head.
pub fn execute(result: ActionResult) -> Response {
    match result {
        ActionResult::Content {
            status,
            content_type,
            body,
        } => Response::new(status).content_type(content_type).body(body),

        ActionResult::Json { status, value } | ActionResult::Object { status, value } => {
            encoded(status, &value)
        }

        ActionResult::FileContent {
            content_type,
            bytes,
        } => Response::new(StatusCode::Ok)
            .content_type(content_type)
            .body_bytes(bytes.unwrap_or_default()),

        ActionResult::FileStream {
            content_type,
            length,
            stream,
        } => {
            let response = Response::new(StatusCode::Ok).content_type(content_type);
            match stream {
                Some(stream) => response.body_stream(StreamBody::new(stream, length)),
                None => response,
            }
        }

        ActionResult::Status(status) => Response::new(status),

        ActionResult::ServerError { error } => server_error(&error),
    }
}

fn encoded(status: StatusCode, value: &serde_json::Value) -> Response {
    Response::new(status)
        .content_type(JSON)
        .body(value.to_string())
}

fn server_error(error: &anyhow::Error) -> Response {
    let value = serde_json::json!({ "error": format!("{error:#}") });
    encoded(StatusCode::InternalServerError, &value)
}

/// Destination for a finished response.
pub trait ResponseSink: Send {
    /// Write `response` in full and flush. Called once per request.
    ///
    /// A streamed body is copied chunk by chunk after the head, so it is never
    /// held in memory as a whole. If the stream fails partway the error is
    /// returned and the frame is left incomplete; the caller must drop the
    /// connection.
    fn send(&mut self, response: Response) -> impl Future<Output = io::Result<()>> + Send;
}

impl<W> ResponseSink for W
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, response: Response) -> io::Result<()> {
        let (head, stream) = response.into_parts();
        self.write_all(&head).await?;
        if let Some(stream) = stream {
            stream.write_to(self).await?;
        }
        self.flush().await
    }
}
