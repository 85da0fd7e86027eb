//! Parameter binding: turning captured path text and request bodies into
//! typed operation arguments.
//!
//! Every route carries an ordered list of [`ParameterDescriptor`]s, one per
//! capture in its template, plus an optional [`BodyParameter`]. [`bind`] walks
//! them against the values captured by the matcher and produces an
//! [`Arguments`] bundle, or the first [`BindingError`] encountered.
//!
//! Path conversions:
//!
//! | [`ParamKind`] | Conversion                         | Rust type |
//! |---------------|------------------------------------|-----------|
//! | `String`      | pass-through                       | `String`  |
//! | `Integer`     | base-10 parse                      | `i64`     |
//! | `Guid`        | UUID text parse                    | `Uuid`    |
//! | `Float`       | decimal parse                      | `f64`     |
//! | `Boolean`     | `true` / `false`, any case         | `bool`    |

use std::any::{Any, type_name};
use std::fmt;

use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use crate::context::RequestContext;

type AnyBox = Box<dyn Any + Send>;

/// Declared type of a path-captured parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParamKind {
    #[default]
    String,
    Integer,
    Guid,
    Float,
    Boolean,
}

impl ParamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Guid => "guid",
            Self::Float => "float",
            Self::Boolean => "boolean",
        }
    }

    fn convert(self, raw: &str) -> Option<Value> {
        Some(match self {
            Self::String => Value::String(raw.to_owned()),
            Self::Integer => Value::Integer(raw.parse().ok()?),
            Self::Guid => Value::Guid(Uuid::parse_str(raw).ok()?),
            Self::Float => Value::Float(raw.parse().ok()?),
            Self::Boolean => {
                if raw.eq_ignore_ascii_case("true") {
                    Value::Boolean(true)
                } else if raw.eq_ignore_ascii_case("false") {
                    Value::Boolean(false)
                } else {
                    return None;
                }
            }
        })
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A converted path parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Guid(Uuid),
    Float(f64),
    Boolean(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Guid(id) => write!(f, "{id}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// Extraction of a concrete Rust type from a bound [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|n| i32::try_from(n).ok())
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|n| u32::try_from(n).ok())
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Guid(id) => Some(*id),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(x) => Some(*x),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

/// A path-sourced parameter: the capture name and its declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    name: String,
    kind: ParamKind,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }
}

/// Whether a body-sourced parameter tolerates a missing body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyBodyBehavior {
    /// A missing body binds the type's `Default` value.
    Allow,
    /// A missing body is a [`BindingError::MissingBody`].
    #[default]
    Disallow,
}

/// A body-sourced parameter, decoded from JSON into its declared type.
///
/// The declared type is erased behind two function pointers so that routes
/// of different body types share one table.
#[derive(Clone)]
pub struct BodyParameter {
    type_name: &'static str,
    behavior: EmptyBodyBehavior,
    decode: fn(&[u8]) -> Result<AnyBox, serde_json::Error>,
    default: fn() -> AnyBox,
}

impl BodyParameter {
    /// Describe a body of type `T`.
    pub fn of<T>(behavior: EmptyBodyBehavior) -> Self
    where
        T: DeserializeOwned + Default + Send + 'static,
    {
        Self {
            type_name: type_name::<T>(),
            behavior,
            decode: |bytes| serde_json::from_slice::<T>(bytes).map(|v| Box::new(v) as AnyBox),
            default: || Box::new(T::default()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn behavior(&self) -> EmptyBodyBehavior {
        self.behavior
    }
}

impl fmt::Debug for BodyParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyParameter")
            .field("type_name", &self.type_name)
            .field("behavior", &self.behavior)
            .finish()
    }
}

/// Coarse classification of a [`BindingError`], safe to show to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingErrorKind {
    TypeMismatch,
    MissingBody,
    MalformedBody,
}

impl BindingErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TypeMismatch => "TypeMismatch",
            Self::MissingBody => "MissingBody",
            Self::MalformedBody => "MalformedBody",
        }
    }
}

impl fmt::Display for BindingErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to convert request data into operation arguments.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("parameter `{name}` expects {expected}, got `{value}`")]
    TypeMismatch {
        name: String,
        expected: ParamKind,
        value: String,
    },

    #[error("request body of type `{type_name}` is required")]
    MissingBody { type_name: &'static str },

    #[error("request body is not a valid `{type_name}`: {source}")]
    MalformedBody {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl BindingError {
    pub fn kind(&self) -> BindingErrorKind {
        match self {
            Self::TypeMismatch { .. } => BindingErrorKind::TypeMismatch,
            Self::MissingBody { .. } => BindingErrorKind::MissingBody,
            Self::MalformedBody { .. } => BindingErrorKind::MalformedBody,
        }
    }
}

/// Failure to read a bound argument from inside an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("no parameter named `{0}` is bound")]
    Missing(String),

    #[error("parameter `{name}` cannot be read as `{requested}`")]
    WrongType {
        name: String,
        requested: &'static str,
    },

    #[error("no request body is bound, or it was already taken")]
    NoBody,

    #[error("request body cannot be read as `{0}`")]
    WrongBodyType(&'static str),
}

/// The arguments bound for one operation invocation.
pub struct Arguments {
    context: RequestContext,
    values: Vec<(String, Value)>,
    body: Option<AnyBox>,
}

impl Arguments {
    /// The request this invocation serves.
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Bound path values in segment order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// Read a path parameter as `T`.
    ///
    /// # Errors
    ///
    /// [`ArgumentError::Missing`] if no capture has this name,
    /// [`ArgumentError::WrongType`] if the declared kind does not convert to `T`.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, ArgumentError> {
        let value = self
            .value(name)
            .ok_or_else(|| ArgumentError::Missing(name.to_owned()))?;
        T::from_value(value).ok_or_else(|| ArgumentError::WrongType {
            name: name.to_owned(),
            requested: type_name::<T>(),
        })
    }

    /// Take the decoded body. Succeeds once per invocation.
    ///
    /// # Errors
    ///
    /// [`ArgumentError::NoBody`] if the route declares no body or it was
    /// already taken, [`ArgumentError::WrongBodyType`] if `T` is not the
    /// declared body type.
    pub fn body<T: 'static>(&mut self) -> Result<T, ArgumentError> {
        let body = self.body.take().ok_or(ArgumentError::NoBody)?;
        match body.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(original) => {
                self.body = Some(original);
                Err(ArgumentError::WrongBodyType(type_name::<T>()))
            }
        }
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("path", &self.context.path())
            .field("values", &self.values)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Bind captured path values and the request body to typed arguments.
///
/// `captured` must be in segment order, one entry per descriptor, as produced
/// by the matcher for the route the descriptors belong to.
///
/// # Errors
///
/// The first conversion that fails, in declaration order; the body is only
/// examined once every path parameter converted.
pub fn bind(
    parameters: &[ParameterDescriptor],
    body: Option<&BodyParameter>,
    captured: &[&str],
    context: RequestContext,
) -> Result<Arguments, BindingError> {
    let values = parameters
        .iter()
        .zip(captured)
        .map(|(descriptor, raw)| {
            descriptor
                .kind
                .convert(raw)
                .map(|value| (descriptor.name.clone(), value))
                .ok_or_else(|| BindingError::TypeMismatch {
                    name: descriptor.name.clone(),
                    expected: descriptor.kind,
                    value: (*raw).to_owned(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let body = body
        .map(|descriptor| bind_body(descriptor, context.body()))
        .transpose()?;

    Ok(Arguments {
        context,
        values,
        body,
    })
}

fn bind_body(descriptor: &BodyParameter, raw: &[u8]) -> Result<AnyBox, BindingError> {
    if raw.trim_ascii().is_empty() {
        return match descriptor.behavior {
            EmptyBodyBehavior::Allow => Ok((descriptor.default)()),
            EmptyBodyBehavior::Disallow => Err(BindingError::MissingBody {
                type_name: descriptor.type_name,
            }),
        };
    }

    (descriptor.decode)(raw).map_err(|source| BindingError::MalformedBody {
        type_name: descriptor.type_name,
        source,
    })
}
