//! Request dispatch: from an inbound request to a written response.
//!
//! For every request the [`Dispatcher`]:
//!
//! 1. resolves the route in its [`RouteCatalog`] (`404` when nothing matches);
//! 2. binds path captures and the body (`400` on a [`BindingError`]);
//! 3. runs the operation on its own tokio task, which acquires the handler
//!    instance and releases it again on every exit path;
//! 4. turns the operation's [`ActionResult`], an error it returned, or a panic
//!    into a response via [`result::execute`].
//!
//! Faults stay confined to the request that raised them.

use std::any::Any;
use std::io;

use tracing::{debug, error, warn};

use crate::binder::{self, BindingError};
use crate::config::DispatchConfig;
use crate::context::RequestContext;
use crate::http::{Request, Response, StatusCode};
use crate::result::{self, ActionResult, ResponseSink};
use crate::route::RouteCatalog;

/// Routes requests through a frozen catalog.
///
/// A `Dispatcher` is shared by every connection task, typically behind an
/// [`Arc`](std::sync::Arc). It holds no per-request state.
#[derive(Debug)]
pub struct Dispatcher {
    catalog: RouteCatalog,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(catalog: RouteCatalog) -> Self {
        Self::with_config(catalog, DispatchConfig::default())
    }

    pub fn with_config(catalog: RouteCatalog, config: DispatchConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &RouteCatalog {
        &self.catalog
    }

    /// Dispatch `request` and write the response to `sink`.
    ///
    /// The `Connection` header of the response follows the request's
    /// keep-alive preference.
    ///
    /// # Errors
    ///
    /// Only a failed write to `sink`, e.g. a client that went away. Routing,
    /// binding, and handler failures are answered, not returned.
    pub async fn handle<S: ResponseSink>(&self, request: Request, sink: &mut S) -> io::Result<()> {
        let keep_alive = request.is_keep_alive();
        let response = self.dispatch(request).await.keep_alive(keep_alive);
        let status = response.status();
        sink.send(response).await.inspect_err(|e| {
            debug!(status = %status, error = %e, "response could not be written");
        })
    }

    /// Dispatch `request` and return the response without writing it.
    pub async fn dispatch(&self, request: Request) -> Response {
        result::execute(self.invoke(request).await)
    }

    /// Resolve, bind, and invoke; returns the operation's result or the
    /// result standing in for a failure along the way.
    pub async fn invoke(&self, request: Request) -> ActionResult {
        let context = RequestContext::new(request);

        let Some(matched) = self.catalog.resolve(context.method(), context.path()) else {
            debug!(method = %context.method(), path = context.path(), "no route matched");
            return ActionResult::not_found();
        };
        let route = matched.route();

        let arguments = match binder::bind(
            route.parameters(),
            route.body(),
            matched.captured(),
            context.clone(),
        ) {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!(route = %route, kind = %e.kind(), error = %e, "request could not be bound");
                return self.bad_request(&e);
            }
        };

        debug!(route = %route, operation = route.name(), "dispatching");
        let operation = route.operation();
        match tokio::spawn(operation(arguments)).await {
            Ok(Ok(result)) => result,
            Ok(Err(fault)) => {
                let detail = format!("{fault:#}");
                error!(route = %route, error = %detail, "operation failed");
                ActionResult::server_error(fault)
            }
            Err(join) if join.is_panic() => {
                let message = panic_message(join.into_panic());
                error!(route = %route, panic = %message, "operation panicked");
                ActionResult::server_error(anyhow::anyhow!("operation panicked: {message}"))
            }
            Err(join) => {
                error!(route = %route, error = %join, "operation was cancelled");
                ActionResult::server_error(anyhow::anyhow!("operation was cancelled"))
            }
        }
    }

    fn bad_request(&self, error: &BindingError) -> ActionResult {
        if self.config.expose_binding_errors {
            ActionResult::content(
                StatusCode::BadRequest,
                "text/plain; charset=utf-8",
                error.kind().as_str(),
            )
        } else {
            ActionResult::status(StatusCode::BadRequest)
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map_or_else(|| "non-string panic payload".to_owned(), |s| (*s).to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};

    use serde::{Deserialize, Serialize};
    use tokio::io::AsyncWrite;
    use uuid::Uuid;

    use super::*;
    use crate::binder::{EmptyBodyBehavior, ParamKind};
    use crate::handler::{Handler, Lifecycle};
    use crate::http::Method;
    use crate::route::Routes;

    static RELEASED: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
    struct Setpoint {
        celsius: i32,
    }

    struct Thermostat {
        path: String,
    }

    impl Handler for Thermostat {
        fn create() -> Self {
            Thermostat {
                path: String::new(),
            }
        }

        fn set_context(&mut self, context: &RequestContext) {
            self.path = context.path().to_owned();
        }

        fn release(&self) {
            RELEASED.fetch_add(1, Ordering::SeqCst);
        }

        fn routes(routes: &mut Routes<Self>) {
            routes
                .get(None)
                .to(|t: Arc<Thermostat>, _args| async move { Ok(ActionResult::text(t.path.clone())) });
            routes
                .get("int/{p}")
                .param("p", ParamKind::Integer)
                .to(|_t, args| async move { Ok(ActionResult::json(&args.get::<i64>("p")?)) });
            routes
                .get("gid/{p}")
                .param("p", ParamKind::Guid)
                .to(|_t, args| async move { Ok(ActionResult::text(args.get::<Uuid>("p")?.to_string())) });
            routes
                .post("strict")
                .body::<Setpoint>(EmptyBodyBehavior::Disallow)
                .to(|_t, mut args| async move { Ok(ActionResult::json(&args.body::<Setpoint>()?)) });
            routes
                .post("lenient")
                .body::<Setpoint>(EmptyBodyBehavior::Allow)
                .to(|_t, mut args| async move { Ok(ActionResult::json(&args.body::<Setpoint>()?)) });
            routes.put("noop").to(|_t, _args| async { Ok(()) });
            routes
                .get("fail")
                .to(|_t, _args| async { Err::<(), _>(anyhow::anyhow!("bus timeout")) });
            routes
                .get("panic")
                .to(|_t, _args| async { corrupted_register_map() });
        }
    }

    fn corrupted_register_map() -> anyhow::Result<()> {
        panic!("register map corrupted")
    }

    static SHARED_CREATED: AtomicUsize = AtomicUsize::new(0);

    struct Clock {
        ticks: AtomicUsize,
    }

    impl Handler for Clock {
        const LIFECYCLE: Lifecycle = Lifecycle::Shared;

        fn create() -> Self {
            SHARED_CREATED.fetch_add(1, Ordering::SeqCst);
            Clock {
                ticks: AtomicUsize::new(0),
            }
        }

        fn routes(routes: &mut Routes<Self>) {
            routes.get("tick").to(|clock: Arc<Clock>, _args| async move {
                let n = clock.ticks.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(ActionResult::text(n.to_string()))
            });
        }
    }

    fn dispatcher(config: DispatchConfig) -> Dispatcher {
        let mut builder = RouteCatalog::builder();
        builder.register::<Thermostat>().unwrap();
        builder.register::<Clock>().unwrap();
        Dispatcher::with_config(builder.build(), config)
    }

    fn body_text(response: &Response) -> String {
        String::from_utf8(response.body_ref().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let d = dispatcher(DispatchConfig::default());
        let response = d.dispatch(Request::new(Method::Get, "/nowhere")).await;
        assert_eq!(response.status(), StatusCode::NotFound);
        assert!(response.body_ref().is_empty());
    }

    #[tokio::test]
    async fn context_slot_is_set_on_per_request_instance() {
        let d = dispatcher(DispatchConfig::default());
        let response = d.dispatch(Request::new(Method::Get, "/thermostat/")).await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(body_text(&response), "/thermostat/");
    }

    #[tokio::test]
    async fn integer_capture_is_bound() {
        let d = dispatcher(DispatchConfig::default());
        let response = d.dispatch(Request::new(Method::Get, "/thermostat/int/1234")).await;
        assert_eq!(body_text(&response), "1234");

        let bad = d.dispatch(Request::new(Method::Get, "/thermostat/int/abc")).await;
        assert_eq!(bad.status(), StatusCode::BadRequest);
        assert!(bad.body_ref().is_empty());
    }

    #[tokio::test]
    async fn guid_capture_is_bound() {
        let d = dispatcher(DispatchConfig::default());
        let id = Uuid::new_v4();
        let response = d
            .dispatch(Request::new(Method::Get, &format!("/thermostat/gid/{id}")))
            .await;
        assert_eq!(body_text(&response), id.to_string());

        let bad = d.dispatch(Request::new(Method::Get, "/thermostat/gid/1234-zz")).await;
        assert_eq!(bad.status(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn binding_error_kind_is_exposed_when_configured() {
        let d = dispatcher(DispatchConfig {
            expose_binding_errors: true,
        });
        let response = d.dispatch(Request::new(Method::Post, "/thermostat/strict")).await;
        assert_eq!(response.status(), StatusCode::BadRequest);
        assert_eq!(body_text(&response), "MissingBody");

        let malformed = d
            .dispatch(Request::new(Method::Post, "/thermostat/strict").with_body("{nope"))
            .await;
        assert_eq!(body_text(&malformed), "MalformedBody");
    }

    #[tokio::test]
    async fn allowed_empty_body_binds_default() {
        let d = dispatcher(DispatchConfig::default());
        let response = d.dispatch(Request::new(Method::Post, "/thermostat/lenient")).await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(body_text(&response), r#"{"celsius":0}"#);

        let posted = d
            .dispatch(Request::new(Method::Post, "/thermostat/strict").with_body(r#"{"celsius":21}"#))
            .await;
        assert_eq!(body_text(&posted), r#"{"celsius":21}"#);
    }

    #[tokio::test]
    async fn unit_operation_answers_ok() {
        let d = dispatcher(DispatchConfig::default());
        let response = d.dispatch(Request::new(Method::Put, "/thermostat/noop")).await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert!(response.body_ref().is_empty());
    }

    #[tokio::test]
    async fn handler_error_becomes_500_and_releases() {
        let d = dispatcher(DispatchConfig::default());
        let before = RELEASED.load(Ordering::SeqCst);
        let response = d.dispatch(Request::new(Method::Get, "/thermostat/fail")).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert!(body_text(&response).contains("bus timeout"));
        assert!(RELEASED.load(Ordering::SeqCst) > before);
    }

    #[tokio::test]
    async fn handler_panic_becomes_500_and_releases() {
        let d = dispatcher(DispatchConfig::default());
        let before = RELEASED.load(Ordering::SeqCst);
        let response = d.dispatch(Request::new(Method::Get, "/thermostat/panic")).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert!(body_text(&response).contains("register map corrupted"));
        assert!(RELEASED.load(Ordering::SeqCst) > before);

        // The dispatcher keeps serving.
        let next = d.dispatch(Request::new(Method::Put, "/thermostat/noop")).await;
        assert_eq!(next.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn shared_handler_is_reused() {
        let d = dispatcher(DispatchConfig::default());
        let first = d.dispatch(Request::new(Method::Get, "/clock/tick")).await;
        let second = d.dispatch(Request::new(Method::Get, "/clock/tick")).await;
        assert_eq!(body_text(&first), "1");
        assert_eq!(body_text(&second), "2");
        assert_eq!(SHARED_CREATED.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handle_follows_keep_alive_and_writes_once() {
        let d = dispatcher(DispatchConfig::default());
        let mut sink: Vec<u8> = Vec::new();
        let request = Request::new(Method::Put, "/thermostat/noop").with_header("Connection", "close");
        d.handle(request, &mut sink).await.unwrap();
        let wire = String::from_utf8(sink).unwrap();
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("Connection: close\r\n"));
        assert_eq!(wire.matches("HTTP/1.1").count(), 1);
    }

    // A client that hung up: every write fails.
    struct Disconnected;

    impl AsyncWrite for Disconnected {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    static RELAY_RELEASED: AtomicUsize = AtomicUsize::new(0);

    // Per-request handler used only by the disconnect test below.
    struct Relay;

    impl Handler for Relay {
        fn create() -> Self {
            Relay
        }

        fn release(&self) {
            RELAY_RELEASED.fetch_add(1, Ordering::SeqCst);
        }

        fn routes(routes: &mut Routes<Self>) {
            routes.get("state").to(|_relay, _args| async { Ok(ActionResult::text("closed")) });
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn disconnected_client_fails_only_its_own_request() {
        let mut builder = RouteCatalog::builder();
        builder.register::<Thermostat>().unwrap();
        builder.register::<Relay>().unwrap();
        let d = Arc::new(Dispatcher::new(builder.build()));

        let in_flight: Vec<_> = (0..8)
            .map(|i| {
                let d = Arc::clone(&d);
                tokio::spawn(async move {
                    d.dispatch(Request::new(Method::Get, &format!("/thermostat/int/{i}")))
                        .await
                })
            })
            .collect();

        let err = d
            .handle(Request::new(Method::Get, "/relay/state"), &mut Disconnected)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        // The instance was released before the write was attempted.
        assert_eq!(RELAY_RELEASED.load(Ordering::SeqCst), 1);

        for (i, task) in in_flight.into_iter().enumerate() {
            let response = task.await.unwrap();
            assert_eq!(response.status(), StatusCode::Ok);
            assert_eq!(body_text(&response), i.to_string());
        }

        let after = d.dispatch(Request::new(Method::Get, "/relay/state")).await;
        assert_eq!(after.status(), StatusCode::Ok);
        assert_eq!(body_text(&after), "closed");
        assert_eq!(RELAY_RELEASED.load(Ordering::SeqCst), 2);
    }

    struct Meter {
        reads: AtomicUsize,
    }

    impl Handler for Meter {
        const LIFECYCLE: Lifecycle = Lifecycle::Shared;

        fn create() -> Self {
            Meter {
                reads: AtomicUsize::new(0),
            }
        }

        fn routes(routes: &mut Routes<Self>) {
            routes.get("read").to(|meter: Arc<Meter>, _args| async move {
                tokio::task::yield_now().await;
                let n = meter.reads.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(ActionResult::text(n.to_string()))
            });
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shared_handler_serves_concurrent_requests() {
        let mut builder = RouteCatalog::builder();
        builder.register::<Meter>().unwrap();
        let d = Arc::new(Dispatcher::new(builder.build()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let d = Arc::clone(&d);
                tokio::spawn(async move { d.dispatch(Request::new(Method::Get, "/meter/read")).await })
            })
            .collect();

        let mut seen = Vec::new();
        for task in tasks {
            let response = task.await.unwrap();
            assert_eq!(response.status(), StatusCode::Ok);
            seen.push(body_text(&response).parse::<usize>().unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=16).collect::<Vec<_>>());
    }

    #[test]
    fn panic_message_handles_both_payloads() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7_u8)), "non-string panic payload");
    }
}
