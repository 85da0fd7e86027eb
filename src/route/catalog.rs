//! The route catalog: every compiled route, grouped by HTTP method.
//!
//! The catalog is assembled by a [`CatalogBuilder`] before serving starts and
//! is immutable afterwards. Concurrent requests read it through a shared
//! reference with no locking.

use std::any::{TypeId, type_name};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::matcher::{self, RouteMatch};
use super::template::{PathTemplate, TemplateError};
use super::{Declaration, Operation, Routes};
use crate::binder::{BodyParameter, ParamKind, ParameterDescriptor};
use crate::handler::{Handler, Lifecycle};
use crate::http::Method;

/// Route declarations that cannot be compiled. Fatal at startup.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("handler `{handler}`: {source}")]
    Template {
        handler: &'static str,
        #[source]
        source: TemplateError,
    },

    #[error("handler `{handler}` declares {method} {template} more than once")]
    DuplicateRoute {
        handler: &'static str,
        method: Method,
        template: String,
    },

    #[error("handler `{handler}` types parameter `{name}`, which {method} {template} does not capture")]
    UnknownParameter {
        handler: &'static str,
        method: Method,
        template: String,
        name: String,
    },

    #[error("handler `{handler}` is already registered")]
    AlreadyRegistered { handler: &'static str },
}

/// A compiled route bound to one handler operation.
pub struct Route {
    method: Method,
    template: PathTemplate,
    handler: &'static str,
    name: String,
    lifecycle: Lifecycle,
    parameters: Vec<ParameterDescriptor>,
    body: Option<BodyParameter>,
    operation: Operation,
}

impl Route {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    /// Full type name of the handler that owns this route.
    pub fn handler(&self) -> &'static str {
        self.handler
    }

    /// Operation name, unique within the handler.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Path-sourced parameters in segment order.
    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    pub fn body(&self) -> Option<&BodyParameter> {
        self.body.as_ref()
    }

    pub(crate) fn operation(&self) -> Operation {
        Arc::clone(&self.operation)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.template)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("template", &self.template.to_string())
            .field("handler", &self.handler)
            .field("name", &self.name)
            .field("lifecycle", &self.lifecycle)
            .field("parameters", &self.parameters)
            .field("body", &self.body)
            .finish()
    }
}

/// Collects handler types and compiles their routes.
///
/// # Examples
///
/// ```rust
/// use maple::{ActionResult, Handler, Method, RouteCatalog, Routes};
///
/// struct Board;
///
/// impl Handler for Board {
///     fn create() -> Self {
///         Board
///     }
///
///     fn routes(routes: &mut Routes<Self>) {
///         routes.get("temp").to(|_board, _args| async { Ok(ActionResult::text("21.5")) });
///     }
/// }
///
/// let mut builder = RouteCatalog::builder();
/// builder.register::<Board>().unwrap();
/// let catalog = builder.build();
///
/// assert!(catalog.resolve(&Method::Get, "/board/temp").is_some());
/// assert!(catalog.resolve(&Method::Get, "/board").is_none());
/// ```
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    routes: HashMap<Method, Vec<Route>>,
    handlers: HashSet<TypeId>,
    count: usize,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and add every route declared by `H`.
    ///
    /// Nothing is added when an error is returned.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::AlreadyRegistered`]: `H` was registered before.
    /// - [`CatalogError::Template`]: a template does not compile.
    /// - [`CatalogError::UnknownParameter`]: a typed parameter is not captured.
    /// - [`CatalogError::DuplicateRoute`]: two operations of `H` answer the same
    ///   method and path shape.
    pub fn register<H: Handler>(&mut self) -> Result<&mut Self, CatalogError> {
        let handler = type_name::<H>();
        if self.handlers.contains(&TypeId::of::<H>()) {
            return Err(CatalogError::AlreadyRegistered { handler });
        }

        let mut routes = Routes::<H>::new();
        H::routes(&mut routes);

        let root = H::root();
        let mut compiled: Vec<Route> = Vec::new();
        for declaration in routes.into_declarations() {
            let route = compile::<H>(&root, declaration)?;
            if compiled
                .iter()
                .any(|r| r.method == route.method && r.template.same_shape(&route.template))
            {
                return Err(CatalogError::DuplicateRoute {
                    handler,
                    method: route.method,
                    template: route.template.to_string(),
                });
            }
            compiled.push(route);
        }

        debug!(handler, root = %root, routes = compiled.len(), "handler registered");
        for route in compiled {
            let table = self.routes.entry(route.method.clone()).or_default();
            if let Some(earlier) = table
                .iter()
                .find(|r| r.template.same_shape(&route.template))
            {
                warn!(
                    route = %route,
                    handler,
                    shadowed_by = earlier.handler,
                    "route is unreachable; an earlier handler answers the same path"
                );
            }
            table.push(route);
            self.count += 1;
        }
        self.handlers.insert(TypeId::of::<H>());

        Ok(self)
    }

    /// Freeze the catalog.
    pub fn build(self) -> RouteCatalog {
        info!(
            routes = self.count,
            handlers = self.handlers.len(),
            "route catalog built"
        );
        RouteCatalog {
            routes: self.routes,
            count: self.count,
        }
    }
}

fn compile<H: Handler>(root: &str, declaration: Declaration) -> Result<Route, CatalogError> {
    let handler = type_name::<H>();
    let Declaration {
        method,
        template,
        params,
        body,
        name,
        operation,
    } = declaration;

    let template = PathTemplate::compile(template.as_deref(), root)
        .map_err(|source| CatalogError::Template { handler, source })?;

    if let Some(stray) = params
        .iter()
        .find(|p| !template.parameter_names().any(|n| n == p.name()))
    {
        return Err(CatalogError::UnknownParameter {
            handler,
            method,
            template: template.to_string(),
            name: stray.name().to_owned(),
        });
    }

    let parameters = template
        .parameter_names()
        .map(|capture| {
            let kind = params
                .iter()
                .find(|p| p.name() == capture)
                .map_or(ParamKind::String, ParameterDescriptor::kind);
            ParameterDescriptor::new(capture, kind)
        })
        .collect();

    let name = name.unwrap_or_else(|| format!("{method} {template}"));

    Ok(Route {
        method,
        template,
        handler,
        name,
        lifecycle: H::LIFECYCLE,
        parameters,
        body,
        operation,
    })
}

/// The frozen table of routes, grouped by method in registration order.
pub struct RouteCatalog {
    routes: HashMap<Method, Vec<Route>>,
    count: usize,
}

impl RouteCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    /// Resolve an inbound method and path. See [`matcher::resolve`].
    pub fn resolve<'c, 'p>(&'c self, method: &Method, path: &'p str) -> Option<RouteMatch<'c, 'p>> {
        matcher::resolve(self.routes_for(method), path)
    }

    /// Routes registered under `method`, in registration order.
    pub fn routes_for(&self, method: &Method) -> &[Route] {
        self.routes
            .get(method)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every route, grouped by method.
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl fmt::Debug for RouteCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
