//! Handler types and their instance lifecycle.
//!
//! A handler is a type that groups routable operations. It declares its routes
//! in [`Handler::routes`] and chooses a [`Lifecycle`]:
//!
//! - [`Lifecycle::PerRequest`]: a fresh instance is created for every matching
//!   request, receives the request in its context slot, and is released when the
//!   operation finishes, on every exit path.
//! - [`Lifecycle::Shared`]: one instance, created lazily on first use, serves
//!   every request for the rest of the process. The engine never locks it;
//!   interior state must bring its own synchronization.

use std::any::type_name;
use std::sync::{Arc, OnceLock};

use crate::context::RequestContext;
use crate::route::Routes;

/// Whether a handler instance is reused across requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    PerRequest,
    Shared,
}

/// A type grouping one or more routable operations.
///
/// # Examples
///
/// ```rust
/// use maple::{ActionResult, Handler, Routes};
///
/// struct Leds;
///
/// impl Handler for Leds {
///     fn create() -> Self {
///         Leds
///     }
///
///     fn routes(routes: &mut Routes<Self>) {
///         routes.get(None).to(|_leds, _args| async { Ok(ActionResult::text("off")) });
///     }
/// }
///
/// assert_eq!(Leds::root(), "leds");
/// ```
pub trait Handler: Send + Sync + Sized + 'static {
    /// Instance reuse policy.
    const LIFECYCLE: Lifecycle = Lifecycle::PerRequest;

    /// Construct an instance.
    fn create() -> Self;

    /// Declare this handler's routes.
    fn routes(routes: &mut Routes<Self>);

    /// Root path segment(s) that relative templates are appended to.
    ///
    /// Defaults to the type's name without its module path or generic
    /// arguments, lower-cased.
    fn root() -> String {
        short_type_name(type_name::<Self>()).to_ascii_lowercase()
    }

    /// Context slot. Called on per-request instances before the operation runs.
    fn set_context(&mut self, _context: &RequestContext) {}

    /// Release owned resources. Called once per per-request instance after its
    /// operation completes, fails, or panics. Never called on shared instances.
    fn release(&self) {}
}

fn short_type_name(full: &str) -> &str {
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

/// Source of instances for one handler type.
pub(crate) struct HandlerSlot<H> {
    shared: OnceLock<Arc<H>>,
}

impl<H: Handler> HandlerSlot<H> {
    pub(crate) fn new() -> Self {
        Self {
            shared: OnceLock::new(),
        }
    }

    /// Obtain the instance that will serve `context`.
    pub(crate) fn acquire(&self, context: &RequestContext) -> Lease<H> {
        match H::LIFECYCLE {
            Lifecycle::Shared => Lease {
                handler: Arc::clone(self.shared.get_or_init(|| Arc::new(H::create()))),
                owned: false,
            },
            Lifecycle::PerRequest => {
                let mut handler = H::create();
                handler.set_context(context);
                Lease {
                    handler: Arc::new(handler),
                    owned: true,
                }
            }
        }
    }
}

/// A handler instance checked out for one invocation.
///
/// Dropping the lease of a per-request instance calls [`Handler::release`],
/// which also happens while unwinding from a panicking operation.
pub(crate) struct Lease<H: Handler> {
    handler: Arc<H>,
    owned: bool,
}

impl<H: Handler> Lease<H> {
    pub(crate) fn handler(&self) -> Arc<H> {
        Arc::clone(&self.handler)
    }
}

impl<H: Handler> Drop for Lease<H> {
    fn drop(&mut self) {
        if self.owned {
            tracing::trace!(handler = type_name::<H>(), "releasing per-request handler");
            self.handler.release();
        }
    }
}
