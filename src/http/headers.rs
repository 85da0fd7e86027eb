//! Header fields as the engine sees them: one value per name.
//!
//! Names compare ASCII case-insensitively and keep the spelling they were
//! first written with. A field that arrives more than once on the wire is
//! folded into a single comma-separated value, the combination RFC 9110 §5.3
//! allows, so lookups never have to pick between duplicates.

/// An ordered, case-insensitive map from header name to a single value.
///
/// # Examples
///
/// ```
/// use maple::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Content-Type", "text/plain");
/// headers.insert("content-type", "application/json");
/// headers.append("Accept", "text/html");
/// headers.append("accept", "application/json");
///
/// assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
/// assert_eq!(headers.get("accept"), Some("text/html, application/json"));
/// assert_eq!(headers.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Set `name` to `value`, replacing whatever it held.
    ///
    /// The field keeps its original position and spelling when it already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => self.fields[i].1 = value.into(),
            None => self.fields.push((name, value.into())),
        }
    }

    /// Add `value` to `name`, joining it to an existing value with `", "`.
    pub fn append(&mut self, name: impl Into<String>, value: impl AsRef<str>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => {
                let existing = &mut self.fields[i].1;
                existing.push_str(", ");
                existing.push_str(value.as_ref());
            }
            None => self.fields.push((name, value.as_ref().to_owned())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.fields[i].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Remove `name`, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.fields.remove(i).1)
    }

    /// Number of distinct field names.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in the order their names were first added.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.insert("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
        assert!(h.contains("Content-type"));
        assert!(!h.contains("x-missing"));
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut h = Headers::new();
        h.insert("Content-Type", "text/plain");
        h.insert("Connection", "keep-alive");
        h.insert("content-type", "application/json");
        assert_eq!(h.len(), 2);
        assert_eq!(
            h.iter().collect::<Vec<_>>(),
            vec![("Content-Type", "application/json"), ("Connection", "keep-alive")]
        );
    }

    #[test]
    fn append_folds_repeated_fields() {
        let mut h = Headers::new();
        h.append("Cache-Control", "no-cache");
        h.append("cache-control", "no-store");
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("cache-control"), Some("no-cache, no-store"));
    }

    #[test]
    fn remove_returns_value() {
        let mut h = Headers::new();
        h.insert("X-Sensor", "7");
        assert_eq!(h.remove("x-sensor").as_deref(), Some("7"));
        assert!(h.is_empty());
        assert_eq!(h.remove("x-sensor"), None);
    }
}
