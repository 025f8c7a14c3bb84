//! Request helpers and response assertions for black-box API tests.

use crate::error::{Error, Result};
use crate::matcher::Matcher;
use std::path::{Path, PathBuf};

/// Per-request transport options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub form_params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Verify TLS certificates.
    pub verify: bool,
    pub allow_redirects: bool,
    /// Keep a cookie jar across requests.
    pub cookies: bool,
    /// Turn non-2xx statuses into [`Error::HttpStatus`].
    pub http_errors: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            query: Vec::new(),
            form_params: Vec::new(),
            headers: Vec::new(),
            verify: true,
            allow_redirects: true,
            cookies: true,
            http_errors: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Response {
    /// First value of a header, name compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub trait Transport {
    fn request(&self, method: &str, url: &str, options: &RequestOptions) -> Result<Response>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn request(&self, method: &str, url: &str, options: &RequestOptions) -> Result<Response> {
        (**self).request(method, url, options)
    }
}

/// Test harness pairing a transport with a directory of expected-response patterns.
#[derive(Debug)]
pub struct JsonApiTest<T: Transport> {
    transport: T,
    base_url: String,
    response_dir: PathBuf,
    matcher: Matcher,
}

impl<T: Transport> JsonApiTest<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            base_url: String::new(),
            response_dir: PathBuf::new(),
            matcher: Matcher::new(),
        }
    }

    /// Prefix prepended verbatim to every request URL.
    pub fn set_base_url(&mut self, url: impl Into<String>) {
        self.base_url = url.into();
    }

    pub fn set_response_dir(&mut self, dir: impl Into<PathBuf>) {
        self.response_dir = dir.into();
    }

    pub fn set_matcher(&mut self, matcher: Matcher) {
        self.matcher = matcher;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn request(
        &self,
        url: &str,
        method: &str,
        params: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<Response> {
        // Local test servers commonly run with self-signed certificates.
        let mut options = RequestOptions {
            verify: false,
            headers: headers.to_vec(),
            ..RequestOptions::default()
        };
        if !params.is_empty() {
            if method.eq_ignore_ascii_case("GET") {
                options.query = params.to_vec();
            } else {
                options.form_params = params.to_vec();
            }
        }

        let full_url = format!("{}{}", self.base_url, url);
        log::debug!("{} {}", method, full_url);
        let response = self.transport.request(method, &full_url, &options)?;
        log::debug!(
            "{} {} -> {} ({} bytes)",
            method,
            full_url,
            response.status,
            response.body.len()
        );
        Ok(response)
    }

    /// Status, JSON content type, then body against the fixture `filename`.
    pub fn assert_response(&self, response: &Response, filename: &str, status: u16) -> Result<()> {
        if response.status != status {
            return Err(Error::Status {
                expected: status,
                actual: response.status,
            });
        }
        self.assert_json_header(response)?;
        self.assert_json_response_content(response, filename)
    }

    pub fn assert_json_header(&self, response: &Response) -> Result<()> {
        self.assert_header(response, "Content-Type", "application/json")
    }

    /// The first value of `header` must contain `content`.
    pub fn assert_header(&self, response: &Response, header: &str, content: &str) -> Result<()> {
        let value = response
            .header(header)
            .ok_or_else(|| Error::MissingHeader(header.to_string()))?;
        if value.contains(content) {
            Ok(())
        } else {
            Err(Error::HeaderMismatch {
                header: header.to_string(),
                expected: content.to_string(),
                actual: value.to_string(),
            })
        }
    }

    pub fn assert_json_response_content(&self, response: &Response, filename: &str) -> Result<()> {
        let pattern = read_fixture(&self.response_dir.join(filename))?;
        let result = self.matcher.match_json(response.body.trim(), &pattern)?;
        if result.is_match() {
            return Ok(());
        }
        if let Some(failure) = result.failure() {
            log::debug!("{} does not match: {}", filename, failure);
        }
        Err(Error::Mismatch(result.message()))
    }
}

/// Reads a pattern fixture, trimmed.
pub fn read_fixture(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| Error::ReadFixture {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::FAILURE_HEADER;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    struct FakeTransport {
        response: Response,
        seen: RefCell<Vec<(String, String, RequestOptions)>>,
    }

    impl FakeTransport {
        fn new(status: u16, content_type: &str, body: &str) -> Self {
            Self {
                response: Response {
                    status,
                    headers: vec![("content-type".to_string(), content_type.to_string())],
                    body: body.to_string(),
                },
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for FakeTransport {
        fn request(&self, method: &str, url: &str, options: &RequestOptions) -> Result<Response> {
            self.seen
                .borrow_mut()
                .push((method.to_string(), url.to_string(), options.clone()));
            Ok(self.response.clone())
        }
    }

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    fn harness(
        transport: FakeTransport,
        fixtures: &[(&str, &str)],
    ) -> (JsonApiTest<FakeTransport>, TempDir) {
        let tmp = TempDir::new().unwrap();
        for (name, content) in fixtures {
            fs::write(tmp.path().join(name), content).unwrap();
        }
        let mut api = JsonApiTest::new(transport);
        api.set_base_url("http://localhost:8080");
        api.set_response_dir(tmp.path());
        (api, tmp)
    }

    #[test]
    fn test_request_routes_params_by_method() {
        let (api, _tmp) = harness(FakeTransport::new(200, "application/json", "{}"), &[]);
        api.request("/users", "GET", &[pair("page", "2")], &[]).unwrap();
        api.request(
            "/users",
            "POST",
            &[pair("name", "x")],
            &[pair("Accept", "application/json")],
        )
        .unwrap();

        let seen = api.transport().seen.borrow();
        let (method, url, options) = &seen[0];
        assert_eq!(method, "GET");
        assert_eq!(url, "http://localhost:8080/users");
        assert_eq!(options.query, vec![pair("page", "2")]);
        assert!(options.form_params.is_empty());
        assert!(!options.verify);

        let (_, _, options) = &seen[1];
        assert!(options.query.is_empty());
        assert_eq!(options.form_params, vec![pair("name", "x")]);
        assert_eq!(options.headers, vec![pair("Accept", "application/json")]);
    }

    #[test]
    fn test_assert_response_passes() {
        let body = r#"{"id": 1, "email": "a@b.io", "tags": ["x", "y"]}"#;
        let (api, _tmp) = harness(
            FakeTransport::new(200, "application/json; charset=utf-8", body),
            &[(
                "user.json",
                "\n{\"id\": @integer@, \"email\": \"@string@.isEmail()\", \"tags\": [\"x\", @...@]}\n",
            )],
        );
        let response = api.request("/user/1", "GET", &[], &[]).unwrap();
        api.assert_response(&response, "user.json", 200).unwrap();
    }

    #[test]
    fn test_assert_response_status_and_header() {
        let (api, _tmp) = harness(FakeTransport::new(404, "text/html", "nope"), &[]);
        let response = api.request("/missing", "GET", &[], &[]).unwrap();
        assert!(matches!(
            api.assert_response(&response, "any.json", 200),
            Err(Error::Status {
                expected: 200,
                actual: 404
            })
        ));
        assert!(matches!(
            api.assert_json_header(&response),
            Err(Error::HeaderMismatch { .. })
        ));
        assert!(matches!(
            api.assert_header(&response, "X-Request-Id", "1"),
            Err(Error::MissingHeader(name)) if name == "X-Request-Id"
        ));
        api.assert_header(&response, "CONTENT-TYPE", "html").unwrap();
    }

    #[test]
    fn test_content_mismatch_carries_header_and_trail() {
        let (api, _tmp) = harness(
            FakeTransport::new(200, "application/json", r#"{"email": "not-an-email"}"#),
            &[("user.json", r#"{"email": "@string@.isEmail()"}"#)],
        );
        let response = api.request("/user", "GET", &[], &[]).unwrap();
        match api.assert_json_response_content(&response, "user.json") {
            Err(Error::Mismatch(message)) => {
                assert!(message.starts_with(FAILURE_HEADER));
                assert!(message.contains("#1 Matcher token failed to match value \"not-an-email\""));
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_fixture_and_bad_body() {
        let (api, _tmp) = harness(
            FakeTransport::new(200, "application/json", "<html>"),
            &[("ok.json", "{}")],
        );
        let response = api.request("/", "GET", &[], &[]).unwrap();
        assert!(matches!(
            api.assert_json_response_content(&response, "absent.json"),
            Err(Error::ReadFixture { .. })
        ));
        assert!(matches!(
            api.assert_json_response_content(&response, "ok.json"),
            Err(Error::ParseJson { what: "actual", .. })
        ));
    }

    #[test]
    fn test_closed_matcher_is_used() {
        let (mut api, _tmp) = harness(
            FakeTransport::new(200, "application/json", r#"{"a": 1, "b": 2}"#),
            &[("a.json", r#"{"a": 1}"#)],
        );
        let response = api.request("/", "GET", &[], &[]).unwrap();
        api.assert_json_response_content(&response, "a.json").unwrap();
        api.set_matcher(Matcher::new().closed_objects(true));
        assert!(api.assert_json_response_content(&response, "a.json").is_err());
    }
}
