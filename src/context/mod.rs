//! Per-request context: the value placed in a handler's context slot.
//!
//! A [`RequestContext`] is created once per inbound request after routing and
//! is cheap to clone: the underlying [`Request`] sits behind an [`Arc`], so the
//! dispatcher, the handler instance, and the bound [`Arguments`] can each hold
//! a copy without duplicating the body.
//!
//! [`Arguments`]: crate::binder::Arguments

use std::sync::Arc;

use bytes::Bytes;

use crate::http::{Headers, Method, Request};

/// Read-only view of the request currently being dispatched.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request: Arc<Request>,
}

impl RequestContext {
    /// Wrap a request for dispatch.
    pub fn new(request: Request) -> Self {
        Self {
            request: Arc::new(request),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn path(&self) -> &str {
        self.request.path()
    }

    pub fn headers(&self) -> &Headers {
        self.request.headers()
    }

    /// Query-string parameters are never used for routing but stay reachable here.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.request.query_param(key)
    }

    pub fn body(&self) -> &Bytes {
        self.request.body()
    }
}

impl From<Request> for RequestContext {
    fn from(request: Request) -> Self {
        Self::new(request)
    }
}
