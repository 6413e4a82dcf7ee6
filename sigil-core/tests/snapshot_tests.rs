//! Integration tests for core option and response types.

use std::time::Duration;

use chrono::Utc;
use sigil_core::{
    CacheMode, CacheOptions, Expiration, MockExpectations, QueryResult, Response, TypedResponse,
    WebMethod, WebParameterCollection,
};

#[test]
fn test_cache_options_from_settings_strings() {
    let mode: CacheMode = "sliding".parse().unwrap();
    let opts = CacheOptions {
        mode,
        duration: Duration::from_secs(30),
    };
    assert_eq!(
        opts.expiration(Utc::now()).unwrap(),
        Expiration::Sliding(Duration::from_secs(30))
    );

    assert!("lru".parse::<CacheMode>().is_err());
}

#[test]
fn test_mock_expectations_merge_into_request_parameters() {
    let mut params: WebParameterCollection = [("q", "rust")].into_iter().collect();
    let expectations = MockExpectations {
        status_code: Some(404),
        content: Some("missing".into()),
        ..MockExpectations::default()
    };

    params.merge(&expectations.to_parameters("http", WebMethod::Get, expectations.content.as_deref()));

    assert_eq!(params.get("q"), Some("rust"));
    assert_eq!(params.get("mockStatusCode"), Some("404"));
    assert_eq!(params.get("mockContent"), Some("missing"));
}

#[test]
fn test_typed_response_without_entity() {
    let response = Response::from_result(QueryResult {
        status_code: 204,
        ..QueryResult::default()
    });
    let typed = TypedResponse::<serde_json::Value>::new(response);
    assert!(typed.entity.is_none());
    assert!(typed.is_success());
}
