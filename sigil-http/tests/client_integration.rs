//! Integration tests for the client against a local HTTP server.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sigil_core::{Cache, CacheOptions, Expiration, FilePart, StreamOptions, TaskOptions};
use sigil_http::{
    BasicAuthCredentials, Client, ClientError, OAuthCredentials, Request, RetryPolicy, StreamEnd,
    StreamEvent,
};
use tokio::sync::mpsc;
use wiremock::matchers::{body_string, body_string_contains, header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> Client {
    Client::builder()
        .authority(server.uri())
        .build()
        .expect("client")
}

#[derive(Default)]
struct MapCache(Mutex<HashMap<String, String>>);

impl Cache for MapCache {
    fn get(&self, key: &str) -> Option<String> {
        self.0.lock().unwrap().get(key).cloned()
    }

    fn insert(&self, key: &str, value: String, _expiration: Expiration) {
        self.0.lock().unwrap().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.0.lock().unwrap().remove(key);
    }
}

#[tokio::test]
async fn test_protected_resource_sends_signed_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1/home"))
        .and(query_param("count", "5"))
        .and(header_regex(
            "Authorization",
            r#"^OAuth oauth_consumer_key="ck", oauth_nonce="[^"]+", oauth_signature="[^"]+", oauth_signature_method="HMAC-SHA1", oauth_timestamp="\d+", oauth_token="tk", oauth_version="1.0"$"#,
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::builder()
        .authority(server.uri())
        .version_path("1")
        .credentials(OAuthCredentials::protected_resource("ck", "cs", "tk", "ts"))
        .build()
        .expect("client");

    let response = client
        .request(&Request::get("home").with_parameter("count", "5"))
        .await
        .expect("response");

    assert_eq!(response.status_code, 200);
    assert_eq!(response.content, "[]");
    assert!(!response.is_mock);
}

#[tokio::test]
async fn test_client_auth_posts_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .and(body_string_contains("x_auth_mode=client_auth"))
        .and(body_string_contains("x_auth_username=ada"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("oauth_token=t&oauth_token_secret=s"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::get("/oauth/access_token")
        .with_credentials(OAuthCredentials::client_auth("ck", "cs", "ada", "hunter2"));
    let response = client(&server).request(&request).await.expect("response");

    assert_eq!(response.status_code, 200);
    assert_eq!(response.request_method, Some(sigil_core::WebMethod::Post));
}

#[tokio::test]
async fn test_basic_auth_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("Authorization", "Basic dTpw"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::get("/me").with_credentials(BasicAuthCredentials::new("u", "p"));
    let response = client(&server).request(&request).await.expect("response");
    assert_eq!(response.status_code, 204);
}

#[tokio::test]
async fn test_post_parameters_form_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(body_string("name=a%20b&qty=2"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::post("/items")
        .with_parameter("name", "a b")
        .with_parameter("qty", "2");
    let response = client(&server).request(&request).await.expect("response");
    assert_eq!(response.status_code, 201);
}

#[tokio::test]
async fn test_retries_until_budget_spent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = client(&server);
    let request = Request::get("/flaky").with_retry_policy(RetryPolicy::new(2).on_server_error());
    let response = client.request(&request).await.expect("response");

    assert_eq!(response.status_code, 503);
    assert_eq!(response.times_tried, 3);
    assert_eq!(client.iteration_count(&request), 3);
}

#[tokio::test]
async fn test_cache_answers_second_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(ResponseTemplate::new(200).set_body_string("cached body"))
        .expect(1)
        .mount(&server)
        .await;

    let cache: Arc<dyn Cache> = Arc::new(MapCache::default());
    let client = Client::builder()
        .authority(server.uri())
        .cache(Arc::clone(&cache), CacheOptions::absolute(Duration::from_secs(60)))
        .build()
        .expect("client");

    let first = client.request(&Request::get("/config")).await.expect("first");
    let second = client.request(&Request::get("/config")).await.expect("second");

    assert_eq!(first.content, "cached body");
    assert_eq!(second.content, "cached body");
    assert_eq!(second.status_code, 200);
}

#[tokio::test]
async fn test_watchdog_times_out_slow_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let request = Request::get("/slow").with_timeout(Duration::from_millis(100));
    let response = client(&server).request(&request).await.expect("response");

    assert!(response.timed_out);
    assert_eq!(response.status_code, 0);
    assert!(response.exception.is_some_and(|e| e.is_timeout()));
}

#[tokio::test]
async fn test_multipart_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(header_regex("Content-Type", "^multipart/form-data"))
        .and(body_string_contains("hello file"))
        .and(body_string_contains("caption"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, "hello file").expect("write");

    let request = Request::new("/upload")
        .with_field("caption", "holiday")
        .with_file(FilePart::new("media", file.path()).with_file_name("a.txt"));
    let response = client(&server).request(&request).await.expect("response");
    assert_eq!(response.status_code, 200);
}

#[tokio::test]
async fn test_stream_batches_lines() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string("one\ntwo\n\nthree\n"))
        .mount(&server)
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let request = Request::get("/feed")
        .with_stream_options(StreamOptions::new().with_results_per_callback(2));
    let handle = client(&server)
        .stream(request, move |event| {
            let _ = tx.send(event);
        })
        .expect("stream");
    handle.wait().await.expect("join");

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            StreamEvent::Batch {
                lines: vec!["one".into(), "two".into()]
            },
            StreamEvent::Batch {
                lines: vec!["three".into()]
            },
            StreamEvent::End {
                reason: StreamEnd::Closed
            },
        ]
    );
}

#[tokio::test]
async fn test_periodic_ticks_then_exhausts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/poll"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&server)
        .await;

    let client = client(&server);
    let request = Request::get("/poll").with_task_options(
        TaskOptions::every(Duration::from_millis(20)).with_repeat_times(3),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = client
        .begin_request(request.clone(), move |_, response| {
            let _ = tx.send(response.status_code);
        })
        .expect("begin");

    assert!(matches!(
        client.begin_request(request.clone(), |_, _| {}),
        Err(ClientError::TaskAlreadyRegistered)
    ));

    handle.wait().await.expect("join");
    let mut statuses = Vec::new();
    while let Some(status) = rx.recv().await {
        statuses.push(status);
    }
    assert_eq!(statuses, vec![200, 200, 200]);
    assert_eq!(request.task_state().ticks(), 3);
    assert!(client.tasks().is_empty());
}

#[tokio::test]
async fn test_mock_expectations_skip_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let request = Request::get("/users/7")
        .expect_status(201)
        .expect_content(r#"{"id":7}"#)
        .expect_content_type("application/json")
        .expect_header("X-Trace", "abc")
        .expect_header("Cache-Control", "no-cache, no-store");
    let response = client(&server).request(&request).await.expect("response");

    assert!(response.is_mock);
    assert_eq!(response.status_code, 201);
    assert_eq!(response.content, r#"{"id":7}"#);
    assert_eq!(response.header("X-Trace"), Some("abc"));
    assert_eq!(response.header("Cache-Control"), Some("no-cache, no-store"));
    assert_eq!(response.content_type.as_deref(), Some("application/json"));
    let uri = response.response_uri.expect("response uri");
    assert!(uri.starts_with("http://"));
    assert!(!uri.contains("mockContent"));
}
