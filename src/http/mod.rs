//! HTTP/1.1 wire types shared by the server loop and the dispatch engine.
//!
//! The engine keys its route tables by [`Method`] and answers with a
//! [`StatusCode`]; [`Request`], [`Response`] and [`Headers`] carry everything
//! else across the boundary.

use std::fmt;
use std::str::FromStr;

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::Request;
pub use response::Response;

/// The response statuses the engine and its operations produce.
///
/// # Examples
///
/// ```
/// use maple::http::StatusCode;
///
/// assert_eq!(StatusCode::NotFound.as_u16(), 404);
/// assert_eq!(StatusCode::NotFound.to_string(), "404 Not Found");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,
    BadRequest = 400,
    NotFound = 404,
    MethodNotAllowed = 405,
    PayloadTooLarge = 413,
    InternalServerError = 500,
    ServiceUnavailable = 503,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn canonical_reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Created => "Created",
            Self::Accepted => "Accepted",
            Self::NoContent => "No Content",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::InternalServerError => "Internal Server Error",
            Self::ServiceUnavailable => "Service Unavailable",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

/// A request method, the first key of every route lookup.
///
/// The methods handlers can declare routes for get their own variant; any
/// other token is kept upper-cased in [`Method::Custom`] so that it still
/// names one route table regardless of how the client spelled it.
///
/// ```
/// use maple::http::Method;
///
/// assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
/// assert_eq!("purge".parse::<Method>().unwrap().as_str(), "PURGE");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Custom(String),
}

const DECLARABLE: [(&str, Method); 7] = [
    ("GET", Method::Get),
    ("POST", Method::Post),
    ("PUT", Method::Put),
    ("DELETE", Method::Delete),
    ("HEAD", Method::Head),
    ("OPTIONS", Method::Options),
    ("PATCH", Method::Patch),
];

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Custom(token) => token,
            known => DECLARABLE
                .iter()
                .find(|(_, m)| m == known)
                .map_or("", |(name, _)| name),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DECLARABLE
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, method)| method)
            .unwrap_or_else(|| Self::Custom(s.to_ascii_uppercase())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_ignores_case() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("Post".parse::<Method>().unwrap(), Method::Post);
        assert_eq!("DELETE".parse::<Method>().unwrap(), Method::Delete);
    }

    #[test]
    fn undeclarable_methods_are_custom_and_upper_cased() {
        let method: Method = "trace".parse().unwrap();
        assert_eq!(method, Method::Custom("TRACE".to_owned()));
        assert_eq!(method.to_string(), "TRACE");
    }

    #[test]
    fn method_names_round_trip() {
        for (name, method) in DECLARABLE {
            assert_eq!(method.as_str(), name);
            assert_eq!(name.parse::<Method>().unwrap(), method);
        }
    }

    #[test]
    fn status_display_includes_reason() {
        assert_eq!(StatusCode::PayloadTooLarge.to_string(), "413 Payload Too Large");
        assert_eq!(StatusCode::InternalServerError.as_u16(), 500);
    }
}
