//! Path templates: the compiled form of a route's path declaration.
//!
//! A raw template is split on `/` into segments. A segment written as `{name}`
//! becomes a [`Segment::Parameter`] capture; anything else is a
//! [`Segment::Literal`] compared ASCII case-insensitively.
//!
//! | Declared template | Handler root | Compiled segments             |
//! |-------------------|--------------|-------------------------------|
//! | *(none)*          | `sensors`    | `sensors`                     |
//! | `""` or `"/"`     | `sensors`    | `sensors`                     |
//! | `int/{p}`         | `sensors`    | `sensors`, `int`, `{p}`       |
//! | `/status/{id}`    | `sensors`    | `status`, `{id}` (absolute)   |
//!
//! Empty segments produced by leading, trailing, or doubled slashes are
//! discarded, so the same normalization ([`split_path`]) applies to declared
//! templates and inbound request paths.

use std::fmt;

use thiserror::Error;

/// Errors raised while compiling a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template `{template}` captures `{name}` more than once")]
    DuplicateParameter { template: String, name: String },

    #[error("template `{template}` contains an unnamed capture `{{}}`")]
    EmptyParameterName { template: String },

    #[error("template `{template}` has unbalanced braces in segment `{segment}`")]
    UnbalancedBraces { template: String, segment: String },
}

/// A single path segment, either a literal string or a named capture (`{name}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matched case-insensitively. Stored lower-cased.
    Literal(String),
    /// Accepts any single segment and captures it under this name.
    Parameter(String),
}

impl Segment {
    fn parse(raw: &str, template: &str) -> Result<Self, TemplateError> {
        if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            if inner.is_empty() {
                return Err(TemplateError::EmptyParameterName {
                    template: template.to_owned(),
                });
            }
            if inner.contains(['{', '}']) {
                return Err(unbalanced(raw, template));
            }
            return Ok(Self::Parameter(inner.to_owned()));
        }

        if raw.contains(['{', '}']) {
            return Err(unbalanced(raw, template));
        }

        Ok(Self::Literal(raw.to_ascii_lowercase()))
    }

    /// Returns `true` if this segment accepts the inbound segment text.
    pub fn accepts(&self, inbound: &str) -> bool {
        match self {
            Self::Literal(text) => text.eq_ignore_ascii_case(inbound),
            Self::Parameter(_) => true,
        }
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self, Self::Parameter(_))
    }
}

fn unbalanced(segment: &str, template: &str) -> TemplateError {
    TemplateError::UnbalancedBraces {
        template: template.to_owned(),
        segment: segment.to_owned(),
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => f.write_str(text),
            Self::Parameter(name) => write!(f, "{{{name}}}"),
        }
    }
}

/// Split a path into its non-empty `/`-separated segments.
///
/// `""`, `"/"` and `"//"` all produce an empty sequence.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// A compiled, immutable route path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    segments: Vec<Segment>,
    absolute: bool,
}

impl PathTemplate {
    /// Compile a declared template against the handler's root path.
    ///
    /// A template is absolute when it starts with `/` and names at least one
    /// segment; its segments then replace the root entirely. Every other
    /// template, including `"/"`, is appended to the root.
    ///
    /// # Errors
    ///
    /// Fails when a capture is unnamed, when braces are unbalanced, or when the
    /// same capture name appears twice.
    ///
    /// # Examples
    ///
    /// ```
    /// use maple::route::PathTemplate;
    ///
    /// let template = PathTemplate::compile(Some("int/{p}"), "sensors").unwrap();
    /// assert_eq!(template.to_string(), "/sensors/int/{p}");
    ///
    /// let absolute = PathTemplate::compile(Some("/status"), "sensors").unwrap();
    /// assert_eq!(absolute.to_string(), "/status");
    /// ```
    pub fn compile(raw: Option<&str>, root: &str) -> Result<Self, TemplateError> {
        let raw = raw.unwrap_or("");
        let declared = split_path(raw);
        let absolute = raw.starts_with('/') && !declared.is_empty();

        let base = if absolute { Vec::new() } else { split_path(root) };
        let full = if absolute {
            raw.to_owned()
        } else {
            format!("{root}/{raw}")
        };

        let mut segments = Vec::with_capacity(base.len() + declared.len());
        for raw_segment in base.into_iter().chain(declared) {
            let segment = Segment::parse(raw_segment, &full)?;
            if let Segment::Parameter(name) = &segment {
                if segments
                    .iter()
                    .any(|s| matches!(s, Segment::Parameter(n) if n == name))
                {
                    return Err(TemplateError::DuplicateParameter {
                        template: full,
                        name: name.clone(),
                    });
                }
            }
            segments.push(segment);
        }

        Ok(Self { segments, absolute })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of segments an inbound path must have to match.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn parameter_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_parameter()).count()
    }

    /// Capture names in segment order.
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Parameter(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Compare against pre-split inbound segments, returning the captured
    /// values in segment order on success.
    pub fn captures<'p>(&self, inbound: &[&'p str]) -> Option<Vec<&'p str>> {
        if inbound.len() != self.segments.len() {
            return None;
        }

        let mut captured = Vec::with_capacity(self.parameter_count());
        for (segment, text) in self.segments.iter().zip(inbound) {
            if !segment.accepts(text) {
                return None;
            }
            if segment.is_parameter() {
                captured.push(*text);
            }
        }
        Some(captured)
    }

    /// `true` when both templates match exactly the same set of paths, i.e.
    /// they differ at most in capture names.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|pair| match pair {
                    (Segment::Literal(a), Segment::Literal(b)) => a == b,
                    (Segment::Parameter(_), Segment::Parameter(_)) => true,
                    _ => false,
                })
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(raw: Option<&str>) -> PathTemplate {
        PathTemplate::compile(raw, "foo").unwrap()
    }

    // ── compile ───────────────────────────────────────────────────────────────

    #[test]
    fn no_template_is_root_only() {
        let t = compile(None);
        assert_eq!(t.segments(), &[Segment::Literal("foo".into())]);
        assert!(!t.is_absolute());
    }

    #[test]
    fn empty_and_slash_equal_no_template() {
        assert_eq!(compile(Some("")), compile(None));
        assert_eq!(compile(Some("/")), compile(None));
    }

    #[test]
    fn relative_template_appends_to_root() {
        let t = compile(Some("baz/{p}/bar"));
        assert_eq!(
            t.segments(),
            &[
                Segment::Literal("foo".into()),
                Segment::Literal("baz".into()),
                Segment::Parameter("p".into()),
                Segment::Literal("bar".into()),
            ]
        );
        assert_eq!(t.parameter_count(), 1);
    }

    #[test]
    fn trailing_slash_is_ignored() {
        assert_eq!(compile(Some("bar/")), compile(Some("bar")));
    }

    #[test]
    fn absolute_template_replaces_root() {
        let t = compile(Some("/other/{id}"));
        assert!(t.is_absolute());
        assert_eq!(t.to_string(), "/other/{id}");
    }

    #[test]
    fn literals_are_lower_cased() {
        let t = PathTemplate::compile(Some("Readings"), "Foo").unwrap();
        assert_eq!(t.to_string(), "/foo/readings");
    }

    #[test]
    fn duplicate_capture_is_rejected() {
        let err = PathTemplate::compile(Some("{p}/x/{p}"), "foo").unwrap_err();
        assert!(matches!(err, TemplateError::DuplicateParameter { name, .. } if name == "p"));
    }

    #[test]
    fn unnamed_capture_is_rejected() {
        let err = PathTemplate::compile(Some("a/{}"), "foo").unwrap_err();
        assert!(matches!(err, TemplateError::EmptyParameterName { .. }));
    }

    #[test]
    fn unbalanced_brace_is_rejected() {
        let err = PathTemplate::compile(Some("a/{p"), "foo").unwrap_err();
        assert!(matches!(err, TemplateError::UnbalancedBraces { segment, .. } if segment == "{p"));
    }

    // ── captures ──────────────────────────────────────────────────────────────

    #[test]
    fn captures_mid_path_parameter() {
        let t = compile(Some("baz/{p}/bar"));
        assert_eq!(
            t.captures(&split_path("/foo/baz/hello/bar")),
            Some(vec!["hello"])
        );
        assert_eq!(t.captures(&split_path("/foo/baz/hello/nope")), None);
    }

    #[test]
    fn captures_require_exact_segment_count() {
        let t = compile(Some("bar/{p}"));
        assert!(t.captures(&split_path("/foo/bar")).is_none());
        assert!(t.captures(&split_path("/foo/bar/baz/bad")).is_none());
    }

    #[test]
    fn literal_comparison_ignores_case() {
        let t = compile(Some("bar"));
        assert!(t.captures(&split_path("/FOO/Bar")).is_some());
    }

    #[test]
    fn same_shape_ignores_capture_names() {
        assert!(compile(Some("{a}")).same_shape(&compile(Some("{b}"))));
        assert!(!compile(Some("{a}")).same_shape(&compile(Some("a"))));
        assert!(!compile(Some("a")).same_shape(&compile(Some("a/b"))));
    }

    #[test]
    fn split_path_normalizes_slashes() {
        assert!(split_path("").is_empty());
        assert!(split_path("/").is_empty());
        assert_eq!(split_path("/foo/"), vec!["foo"]);
        assert_eq!(split_path("foo//bar"), vec!["foo", "bar"]);
    }
}
