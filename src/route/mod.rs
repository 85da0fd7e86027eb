//! Route declaration, compilation, and matching.
//!
//! Handlers declare routes through [`Routes`] inside [`Handler::routes`]:
//!
//! ```rust
//! use maple::{ActionResult, EmptyBodyBehavior, Handler, ParamKind, Routes};
//!
//! #[derive(Default, serde::Deserialize)]
//! struct Level {
//!     percent: u8,
//! }
//!
//! struct Fan;
//!
//! impl Handler for Fan {
//!     fn create() -> Self {
//!         Fan
//!     }
//!
//!     fn routes(routes: &mut Routes<Self>) {
//!         // GET /fan
//!         routes.get(None).to(|_fan, _args| async { Ok(ActionResult::text("idle")) });
//!
//!         // GET /fan/speed/{rpm}
//!         routes
//!             .get("speed/{rpm}")
//!             .param("rpm", ParamKind::Integer)
//!             .to(|_fan, args| async move {
//!                 let rpm: i64 = args.get("rpm")?;
//!                 Ok(ActionResult::text(rpm.to_string()))
//!             });
//!
//!         // POST /fan/level with a JSON body
//!         routes
//!             .post("level")
//!             .body::<Level>(EmptyBodyBehavior::Disallow)
//!             .to(|_fan, mut args| async move {
//!                 let level: Level = args.body()?;
//!                 let _ = level.percent;
//!                 Ok(())
//!             });
//!     }
//! }
//! ```
//!
//! [`CatalogBuilder::register`] compiles the declarations into [`Route`]s and
//! [`CatalogBuilder::build`] freezes them into a [`RouteCatalog`].
//!
//! [`Handler::routes`]: crate::handler::Handler::routes

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::binder::{Arguments, BodyParameter, EmptyBodyBehavior, ParamKind, ParameterDescriptor};
use crate::handler::{Handler, HandlerSlot};
use crate::http::Method;
use crate::result::{ActionResult, IntoActionResult};

pub mod catalog;
pub mod matcher;
pub mod template;

pub use catalog::{CatalogBuilder, CatalogError, Route, RouteCatalog};
pub use matcher::RouteMatch;
pub use template::{PathTemplate, Segment, TemplateError};

/// Heap-allocated, `Send` future returned by type-erased operations.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A type-erased operation: acquires a handler instance, runs the declared
/// closure with the bound arguments, and converts its output.
///
/// Everything, including handler construction, happens inside the returned
/// future, so a panic anywhere in it surfaces when the future is polled.
pub type Operation = Arc<dyn Fn(Arguments) -> BoxFuture<anyhow::Result<ActionResult>> + Send + Sync>;

// An uncompiled route as written by the handler author.
pub(crate) struct Declaration {
    pub(crate) method: Method,
    pub(crate) template: Option<String>,
    pub(crate) params: Vec<ParameterDescriptor>,
    pub(crate) body: Option<BodyParameter>,
    pub(crate) name: Option<String>,
    pub(crate) operation: Operation,
}

/// Collects the route declarations of handler type `H`.
pub struct Routes<H: Handler> {
    slot: Arc<HandlerSlot<H>>,
    declared: Vec<Declaration>,
}

impl<H: Handler> Routes<H> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Arc::new(HandlerSlot::new()),
            declared: Vec::new(),
        }
    }

    pub(crate) fn into_declarations(self) -> Vec<Declaration> {
        self.declared
    }

    /// Declare a route for `method`. `None` (or `""`/`"/"`) answers at the handler root.
    pub fn route<'t>(&mut self, method: Method, template: impl Into<Option<&'t str>>) -> Action<'_, H> {
        Action {
            routes: self,
            method,
            template: template.into().map(str::to_owned),
            params: Vec::new(),
            body: None,
            name: None,
        }
    }

    pub fn get<'t>(&mut self, template: impl Into<Option<&'t str>>) -> Action<'_, H> {
        self.route(Method::Get, template)
    }

    pub fn post<'t>(&mut self, template: impl Into<Option<&'t str>>) -> Action<'_, H> {
        self.route(Method::Post, template)
    }

    pub fn put<'t>(&mut self, template: impl Into<Option<&'t str>>) -> Action<'_, H> {
        self.route(Method::Put, template)
    }

    pub fn delete<'t>(&mut self, template: impl Into<Option<&'t str>>) -> Action<'_, H> {
        self.route(Method::Delete, template)
    }

    pub fn patch<'t>(&mut self, template: impl Into<Option<&'t str>>) -> Action<'_, H> {
        self.route(Method::Patch, template)
    }

    pub fn head<'t>(&mut self, template: impl Into<Option<&'t str>>) -> Action<'_, H> {
        self.route(Method::Head, template)
    }

    pub fn options<'t>(&mut self, template: impl Into<Option<&'t str>>) -> Action<'_, H> {
        self.route(Method::Options, template)
    }
}

/// Builder for a single route. Nothing is registered until [`to`](Self::to) is called.
#[must_use = "a route is only registered once `to` supplies its operation"]
pub struct Action<'r, H: Handler> {
    routes: &'r mut Routes<H>,
    method: Method,
    template: Option<String>,
    params: Vec<ParameterDescriptor>,
    body: Option<BodyParameter>,
    name: Option<String>,
}

impl<H: Handler> Action<'_, H> {
    /// Declare the type of capture `name`. Undeclared captures bind as strings;
    /// a later declaration of the same name replaces an earlier one.
    pub fn param(mut self, name: &str, kind: ParamKind) -> Self {
        self.params.retain(|p| p.name() != name);
        self.params.push(ParameterDescriptor::new(name, kind));
        self
    }

    /// Bind the request body, decoded from JSON, as a `T`.
    pub fn body<T>(mut self, behavior: EmptyBodyBehavior) -> Self
    where
        T: DeserializeOwned + Default + Send + 'static,
    {
        self.body = Some(BodyParameter::of::<T>(behavior));
        self
    }

    /// Name the operation for diagnostics. Defaults to `METHOD /template`.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Register the route with the operation that serves it.
    ///
    /// The operation receives the handler instance chosen by `H::LIFECYCLE`
    /// and the bound [`Arguments`]. Returning `Ok(())` answers `200 OK` with
    /// an empty body.
    pub fn to<F, Fut, R>(self, operation: F)
    where
        F: Fn(Arc<H>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: IntoActionResult,
    {
        let slot = Arc::clone(&self.routes.slot);
        let operation = Arc::new(operation);

        let erased: Operation = Arc::new(move |arguments: Arguments| {
            let slot = Arc::clone(&slot);
            let operation = Arc::clone(&operation);
            let invocation: BoxFuture<anyhow::Result<ActionResult>> = Box::pin(async move {
                let lease = slot.acquire(arguments.context());
                let output = operation(lease.handler(), arguments).await;
                drop(lease);
                output.map(IntoActionResult::into_action_result)
            });
            invocation
        });

        self.routes.declared.push(Declaration {
            method: self.method,
            template: self.template,
            params: self.params,
            body: self.body,
            name: self.name,
            operation: erased,
        });
    }
}

impl<H: Handler> fmt::Debug for Routes<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routes")
            .field("handler", &std::any::type_name::<H>())
            .field("declared", &self.declared.len())
            .finish()
    }
}
