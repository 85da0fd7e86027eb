//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and feeds each HTTP/1.1 request on them to a shared
//! [`Dispatcher`]. Supports HTTP/1.1 persistent connections (keep-alive) out of
//! the box. Every connection runs on its own task; a failing connection never
//! affects the others.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::{DispatchConfig, ServerConfig};
use crate::dispatch::Dispatcher;
use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::result::ResponseSink;
use crate::route::RouteCatalog;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

// Per-connection limits copied out of `ServerConfig`.
#[derive(Debug, Clone, Copy)]
struct Limits {
    max_request_size: usize,
    read_buffer_size: usize,
}

/// The Maple HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use maple::{RouteCatalog, Server, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let catalog = RouteCatalog::builder().build();
///     let server = Server::with_config(&ServerConfig::default()).await?;
///     let dispatcher = server.dispatcher(catalog);
///     server.serve(dispatcher).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    limits: Limits,
    dispatch: DispatchConfig,
}

impl Server {
    /// Binds the server to the given TCP address with default limits.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let config = ServerConfig {
            bind_addr: addr.as_ref().to_owned(),
            ..ServerConfig::default()
        };
        Self::with_config(&config).await
    }

    /// Binds the server to `config.bind_addr` using the limits in `config`.
    ///
    /// `config.dispatch` is kept for [`dispatcher`](Self::dispatcher); a
    /// dispatcher built any other way brings its own settings to
    /// [`serve`](Self::serve).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn with_config(config: &ServerConfig) -> Result<Self, ServerError> {
        let addr = config.bind_addr.as_str();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            limits: Limits {
                max_request_size: config.max_request_size,
                read_buffer_size: config.read_buffer_size,
            },
            dispatch: config.dispatch.clone(),
        })
    }

    /// A dispatcher over `catalog` using the dispatch settings this server
    /// was configured with.
    pub fn dispatcher(&self, catalog: RouteCatalog) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::with_config(catalog, self.dispatch.clone()))
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts accepting connections and dispatching their requests.
    ///
    /// This method runs until the process is terminated or an unrecoverable
    /// listener error occurs.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn serve(self, dispatcher: Arc<Dispatcher>) -> Result<(), ServerError> {
        info!(
            address = %self.local_addr,
            routes = dispatcher.catalog().len(),
            "maple listening"
        );

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let dispatcher = Arc::clone(&dispatcher);
            let limits = self.limits;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, dispatcher, limits).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, reading one
/// request per iteration, until the peer closes the connection or signals
/// `Connection: close`.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    limits: Limits,
) -> Result<(), std::io::Error> {
    use tokio::io::AsyncReadExt;

    let mut buf = BytesMut::with_capacity(limits.read_buffer_size);

    loop {
        // Pipelined requests may already sit in the buffer; only read when
        // what we hold is not yet a complete request.
        if buf.is_empty() || needs_more(&buf, limits.max_request_size) {
            let bytes_read = stream.read_buf(&mut buf).await?;
            if bytes_read == 0 {
                debug!(peer = %peer_addr, "connection closed by peer");
                break;
            }
        }

        if buf.len() > limits.max_request_size {
            warn!(peer = %peer_addr, "request too large, sending 413");
            stream.send(payload_too_large()).await?;
            break;
        }

        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => continue,
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.send(response).await?;
                break;
            }
        };

        let total_needed = body_offset.saturating_add(request.content_length().unwrap_or(0));
        if total_needed > limits.max_request_size {
            warn!(
                peer = %peer_addr,
                declared = total_needed - body_offset,
                "declared body exceeds the request limit, sending 413"
            );
            stream.send(payload_too_large()).await?;
            break;
        }

        // Wait for the full body to arrive if Content-Length is set.
        if buf.len() < total_needed {
            continue;
        }

        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "request received"
        );

        dispatcher.handle(request, &mut stream).await?;

        // Drop the consumed request bytes from the buffer.
        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            break;
        }
    }

    Ok(())
}

fn payload_too_large() -> Response {
    Response::new(StatusCode::PayloadTooLarge)
        .body("Request entity too large")
        .keep_alive(false)
}

/// Whether `buf` holds less than one complete request that could still be
/// accepted under `max_request_size`.
fn needs_more(buf: &[u8], max_request_size: usize) -> bool {
    match Request::parse(buf) {
        Ok((request, offset)) => {
            let needed = offset.saturating_add(request.content_length().unwrap_or(0));
            needed <= max_request_size && buf.len() < needed
        }
        Err(RequestError::Incomplete) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::binder::ParamKind;
    use crate::handler::Handler;
    use crate::result::ActionResult;
    use crate::route::Routes;

    struct Echo;

    impl Handler for Echo {
        fn create() -> Self {
            Echo
        }

        fn routes(routes: &mut Routes<Self>) {
            routes.get("{word}").to(|_echo, args| async move {
                Ok(ActionResult::text(args.get::<String>("word")?))
            });
            routes
                .get("{word}/{times}")
                .param("times", ParamKind::Integer)
                .to(|_echo, args| async move {
                    let word: String = args.get("word")?;
                    let times: i64 = args.get("times")?;
                    Ok(ActionResult::text(word.repeat(times.max(0) as usize)))
                });
        }
    }

    async fn start(config: ServerConfig) -> SocketAddr {
        let mut builder = RouteCatalog::builder();
        builder.register::<Echo>().unwrap();
        let server = Server::with_config(&config).await.unwrap();
        let dispatcher = server.dispatcher(builder.build());
        let addr = server.local_addr();
        tokio::spawn(server.serve(dispatcher));
        addr
    }

    async fn exchange(addr: SocketAddr, raw: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    fn local() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".to_owned(),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn serves_routed_request() {
        let addr = start(local()).await;
        let reply = exchange(
            addr,
            b"GET /echo/hello HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(reply.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test]
    async fn keep_alive_serves_pipelined_requests() {
        let addr = start(local()).await;
        let reply = exchange(
            addr,
            b"GET /echo/one HTTP/1.1\r\nHost: x\r\n\r\nGET /echo/two HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert_eq!(reply.matches("HTTP/1.1 200 OK").count(), 2);
        assert!(reply.contains("\r\n\r\none"));
        assert!(reply.ends_with("\r\n\r\ntwo"));
    }

    #[tokio::test]
    async fn oversized_request_gets_413() {
        let addr = start(ServerConfig {
            max_request_size: 32,
            ..local()
        })
        .await;
        let reply = exchange(
            addr,
            b"GET /echo/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa HTTP/1.1\r\nHost: x\r\n\r\n",
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let addr = start(local()).await;
        let reply = exchange(addr, b"NOT A REQUEST\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn unaddressable_content_length_gets_400() {
        let addr = start(local()).await;
        let reply = exchange(
            addr,
            b"POST /echo/x HTTP/1.1\r\nHost: x\r\nContent-Length: 18446744073709551615\r\n\r\nab",
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(reply.contains("invalid Content-Length"));
    }

    #[tokio::test]
    async fn declared_body_over_the_limit_gets_413_without_waiting() {
        let addr = start(ServerConfig {
            max_request_size: 1024,
            ..local()
        })
        .await;
        // Only the head is sent; the answer must not wait for the body.
        let reply = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            exchange(
                addr,
                b"POST /echo/x HTTP/1.1\r\nHost: x\r\nContent-Length: 1048576\r\n\r\n",
            ),
        )
        .await
        .unwrap();
        assert!(reply.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
    }

    #[tokio::test]
    async fn dispatch_settings_come_from_the_server_config() {
        let mut config = local();
        config.dispatch.expose_binding_errors = true;
        let addr = start(config).await;
        let reply = exchange(
            addr,
            b"GET /echo/ab/many HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(reply.ends_with("\r\n\r\nTypeMismatch"));

        let hidden = start(local()).await;
        let reply = exchange(
            hidden,
            b"GET /echo/ab/many HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(reply.contains("Content-Length: 0\r\n"));
    }
}
