//! Mock expectations attached to a request.

use serde::{Deserialize, Serialize};

use super::method::WebMethod;
use super::params::WebParameterCollection;

/// Scheme the mock transport answers.
pub const MOCK_SCHEME: &str = "mock";

/// Content type used when an expectation omits one.
pub const DEFAULT_MOCK_CONTENT_TYPE: &str = "text/html";

/// Query parameter names understood by the mock transport.
pub mod keys {
    /// Original URL scheme.
    pub const SCHEME: &str = "mockScheme";
    /// Status code to answer with.
    pub const STATUS_CODE: &str = "mockStatusCode";
    /// Reason phrase to answer with.
    pub const STATUS_DESCRIPTION: &str = "mockStatusDescription";
    /// Method the caller used.
    pub const HTTP_METHOD: &str = "mockHttpMethod";
    /// Body to answer with.
    pub const CONTENT: &str = "mockContent";
    /// Content type to answer with.
    pub const CONTENT_TYPE: &str = "mockContentType";
    /// Header name; repeated once per header.
    pub const HEADER_NAMES: &str = "mockHeaderNames";
    /// Header value; repeated once per header, paired with the names by position.
    pub const HEADER_VALUES: &str = "mockHeaderValues";

    /// Returns true for any mock control parameter.
    pub fn is_mock_key(name: &str) -> bool {
        name.starts_with("mock")
            && [
                SCHEME,
                STATUS_CODE,
                STATUS_DESCRIPTION,
                HTTP_METHOD,
                CONTENT,
                CONTENT_TYPE,
                HEADER_NAMES,
                HEADER_VALUES,
            ]
            .contains(&name)
    }
}

/// What the mock transport should answer with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockExpectations {
    /// Status code.
    pub status_code: Option<u16>,
    /// Reason phrase.
    pub status_description: Option<String>,
    /// Raw body.
    pub content: Option<String>,
    /// Content type.
    pub content_type: Option<String>,
    /// Entity serialized into the body when no raw content is set.
    pub entity: Option<serde_json::Value>,
    /// Response headers.
    pub headers: Vec<(String, String)>,
}

impl MockExpectations {
    /// Returns true if nothing is expected.
    pub fn is_empty(&self) -> bool {
        self.status_code.is_none()
            && self.status_description.is_none()
            && self.content.is_none()
            && self.content_type.is_none()
            && self.entity.is_none()
            && self.headers.is_empty()
    }

    /// Encodes the expectations as mock control parameters.
    ///
    /// `content` is the resolved body, which may come from the serialized
    /// entity rather than [`Self::content`].
    pub fn to_parameters(
        &self,
        scheme: &str,
        method: WebMethod,
        content: Option<&str>,
    ) -> WebParameterCollection {
        let mut params = WebParameterCollection::new();
        params.add(keys::SCHEME, scheme);
        params.add(keys::HTTP_METHOD, method.as_str());
        if let Some(code) = self.status_code {
            params.add(keys::STATUS_CODE, code.to_string());
        }
        if let Some(description) = &self.status_description {
            params.add(keys::STATUS_DESCRIPTION, description.as_str());
        }
        if let Some(content) = content {
            params.add(keys::CONTENT, content);
            params.add(
                keys::CONTENT_TYPE,
                self.content_type
                    .as_deref()
                    .unwrap_or(DEFAULT_MOCK_CONTENT_TYPE),
            );
        } else if let Some(content_type) = &self.content_type {
            params.add(keys::CONTENT_TYPE, content_type.as_str());
        }
        for (name, value) in &self.headers {
            params.add(keys::HEADER_NAMES, name.as_str());
            params.add(keys::HEADER_VALUES, value.as_str());
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_default_content_type() {
        let expectations = MockExpectations {
            status_code: Some(201),
            headers: vec![("X-A".into(), "1".into()), ("X-B".into(), "2".into())],
            ..MockExpectations::default()
        };

        let params = expectations.to_parameters("https", WebMethod::Post, Some("done"));

        assert_eq!(params.get(keys::SCHEME), Some("https"));
        assert_eq!(params.get(keys::HTTP_METHOD), Some("POST"));
        assert_eq!(params.get(keys::STATUS_CODE), Some("201"));
        assert_eq!(params.get(keys::CONTENT), Some("done"));
        assert_eq!(params.get(keys::CONTENT_TYPE), Some(DEFAULT_MOCK_CONTENT_TYPE));
        assert_eq!(params.get_all(keys::HEADER_NAMES).collect::<Vec<_>>(), ["X-A", "X-B"]);
        assert_eq!(params.get_all(keys::HEADER_VALUES).collect::<Vec<_>>(), ["1", "2"]);
    }

    #[test]
    fn test_header_values_keep_commas() {
        let expectations = MockExpectations {
            headers: vec![("Cache-Control".into(), "no-cache, no-store".into())],
            ..MockExpectations::default()
        };
        let params = expectations.to_parameters("http", WebMethod::Get, None);
        assert_eq!(
            params.get_all(keys::HEADER_VALUES).collect::<Vec<_>>(),
            ["no-cache, no-store"]
        );
    }

    #[test]
    fn test_is_mock_key() {
        assert!(keys::is_mock_key("mockContent"));
        assert!(!keys::is_mock_key("mockery"));
        assert!(!keys::is_mock_key("content"));
    }
}
