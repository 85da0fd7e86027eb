//! # maple
//!
//! An async HTTP/1.1 dispatch engine: handler types declare their routes as
//! path templates, the engine compiles them into a catalog, and every request
//! is matched, bound to typed arguments, run on a handler instance and turned
//! into exactly one response.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use maple::{ActionResult, Handler, ParamKind, RouteCatalog, Routes, Server};
//!
//! struct Sensor;
//!
//! impl Handler for Sensor {
//!     fn create() -> Self {
//!         Sensor
//!     }
//!
//!     fn routes(routes: &mut Routes<Self>) {
//!         // GET /sensor/{id}
//!         routes
//!             .get("{id}")
//!             .param("id", ParamKind::Integer)
//!             .to(|_sensor, args| async move {
//!                 let id: i64 = args.get("id")?;
//!                 Ok(ActionResult::text(format!("sensor {id}")))
//!             });
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut catalog = RouteCatalog::builder();
//!     catalog.register::<Sensor>()?;
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     let dispatcher = server.dispatcher(catalog.build());
//!     server.serve(dispatcher).await?;
//!     Ok(())
//! }
//! ```

pub mod binder;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod handler;
pub mod http;
pub mod result;
pub mod route;
pub mod server;

pub use binder::{
    ArgumentError, Arguments, BindingError, BindingErrorKind, EmptyBodyBehavior, FromValue,
    ParamKind, Value,
};
pub use config::{DispatchConfig, ServerConfig};
pub use context::RequestContext;
pub use dispatch::Dispatcher;
pub use handler::{Handler, Lifecycle};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use result::{ActionResult, IntoActionResult, ResponseSink};
pub use route::{CatalogError, Route, RouteCatalog, Routes};
pub use server::{Server, ServerError};
