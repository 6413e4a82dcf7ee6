//! Parameter and post-part types.
//!
//! - [`WebParameter`] - A single name/value pair
//! - [`WebParameterCollection`] - Ordered, duplicate-tolerant parameter list
//! - [`PostParameter`] - A multipart field or file part
//! - [`FilePart`] - A file attached to a multipart body

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Prefix shared by every OAuth protocol parameter.
pub const OAUTH_PREFIX: &str = "oauth_";

// ============================================================================
// Web Parameter
// ============================================================================

/// A single name/value request parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebParameter {
    /// Parameter name, unencoded.
    pub name: String,
    /// Parameter value, unencoded.
    pub value: String,
}

impl WebParameter {
    /// Creates a parameter.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns true if this is an OAuth protocol parameter.
    pub fn is_oauth(&self) -> bool {
        self.name.starts_with(OAUTH_PREFIX)
    }
}

// ============================================================================
// Parameter Collection
// ============================================================================

/// An ordered list of parameters.
///
/// Duplicate names are allowed; [`merge`](Self::merge) replaces every entry
/// sharing a name with the incoming entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebParameterCollection {
    items: Vec<WebParameter>,
}

impl WebParameterCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.items.push(WebParameter::new(name, value));
    }

    /// Replaces all entries named `name` with a single entry.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.items.push(WebParameter::new(name, value));
    }

    /// Returns the first value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Returns every value for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.items
            .iter()
            .filter(move |p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Returns true if any entry has this name.
    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|p| p.name == name)
    }

    /// Removes every entry named `name`.
    pub fn remove(&mut self, name: &str) {
        self.items.retain(|p| p.name != name);
    }

    /// Merges `other` into this collection; its entries win on name clashes.
    pub fn merge(&mut self, other: &WebParameterCollection) {
        for param in &other.items {
            self.remove(&param.name);
        }
        self.items.extend(other.items.iter().cloned());
    }

    /// Iterates the parameters in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, WebParameter> {
        self.items.iter()
    }

    /// Iterates the OAuth protocol parameters.
    pub fn oauth(&self) -> impl Iterator<Item = &WebParameter> {
        self.items.iter().filter(|p| p.is_oauth())
    }

    /// Iterates everything except OAuth protocol parameters.
    pub fn non_oauth(&self) -> impl Iterator<Item = &WebParameter> {
        self.items.iter().filter(|p| !p.is_oauth())
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for WebParameterCollection {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            items: iter
                .into_iter()
                .map(|(k, v)| WebParameter::new(k, v))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for WebParameterCollection {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.items
            .extend(iter.into_iter().map(|(k, v)| WebParameter::new(k, v)));
    }
}

impl<'a> IntoIterator for &'a WebParameterCollection {
    type Item = &'a WebParameter;
    type IntoIter = std::slice::Iter<'a, WebParameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// ============================================================================
// Post Parameters
// ============================================================================

/// A file attached to a multipart body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePart {
    /// Form field name.
    pub name: String,
    /// Path to read the bytes from.
    pub path: PathBuf,
    /// Logical filename sent to the server.
    pub file_name: String,
    /// Content type, `application/octet-stream` when absent.
    pub content_type: Option<String>,
}

impl FilePart {
    /// Creates a file part whose logical name is the path's file name.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name: name.into(),
            path,
            file_name,
            content_type: None,
        }
    }

    /// Overrides the logical filename.
    #[must_use]
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PostParameter {
    /// A plain form field.
    Field {
        /// Field name.
        name: String,
        /// Field value.
        value: String,
    },
    /// A file upload.
    File(FilePart),
}

impl PostParameter {
    /// Creates a field part.
    pub fn field(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Field {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Creates a file part.
    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::File(FilePart::new(name, path))
    }

    /// Returns the form field name.
    pub fn name(&self) -> &str {
        match self {
            Self::Field { name, .. } => name,
            Self::File(part) => &part.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_incoming_wins_on_duplicates() {
        let mut client: WebParameterCollection =
            [("a", "1"), ("b", "2"), ("b", "3")].into_iter().collect();
        let request: WebParameterCollection = [("b", "9"), ("c", "4")].into_iter().collect();

        client.merge(&request);

        let pairs: Vec<_> = client
            .iter()
            .map(|p| (p.name.as_str(), p.value.as_str()))
            .collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "9"), ("c", "4")]);
    }

    #[test]
    fn test_oauth_partition() {
        let params: WebParameterCollection = [
            ("oauth_token", "t"),
            ("status", "hello"),
            ("oauth_nonce", "n"),
        ]
        .into_iter()
        .collect();

        assert_eq!(params.oauth().count(), 2);
        assert_eq!(params.non_oauth().count(), 1);
        assert_eq!(params.get("status"), Some("hello"));
    }

    #[test]
    fn test_set_replaces_all() {
        let mut params: WebParameterCollection = [("x", "1"), ("x", "2")].into_iter().collect();
        params.set("x", "3");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("x"), Some("3"));
    }

    #[test]
    fn test_file_part_defaults_file_name() {
        let part = FilePart::new("upload", "/tmp/report.csv");
        assert_eq!(part.file_name, "report.csv");
        assert!(part.content_type.is_none());
    }
}
