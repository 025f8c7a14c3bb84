//! Blocking reqwest transport.

use crate::api::{JsonApiTest, RequestOptions, Response, Transport};
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use reqwest::{redirect, Method};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ClientKey {
    verify: bool,
    allow_redirects: bool,
    cookies: bool,
}

impl From<&RequestOptions> for ClientKey {
    fn from(options: &RequestOptions) -> Self {
        Self {
            verify: options.verify,
            allow_redirects: options.allow_redirects,
            cookies: options.cookies,
        }
    }
}

/// Sends requests with one cached client per TLS, redirect and cookie combination.
#[derive(Debug, Default)]
pub struct ReqwestTransport {
    timeout: Option<Duration>,
    clients: Mutex<HashMap<ClientKey, Client>>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    fn client(&self, key: ClientKey) -> Result<Client> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let policy = if key.allow_redirects {
            redirect::Policy::default()
        } else {
            redirect::Policy::none()
        };
        let mut builder = Client::builder()
            .danger_accept_invalid_certs(!key.verify)
            .redirect(policy)
            .cookie_store(key.cookies);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Http(format!("failed to build client: {}", e)))?;

        log::debug!("created HTTP client for {:?}", key);
        clients.insert(key, client.clone());
        Ok(client)
    }

    #[cfg(test)]
    fn cached_clients(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or_default()
    }
}

impl Transport for ReqwestTransport {
    fn request(&self, method: &str, url: &str, options: &RequestOptions) -> Result<Response> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| Error::Http(format!("invalid method '{}'", method)))?;
        let client = self.client(ClientKey::from(options))?;

        let mut request = client.request(method.clone(), url);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if !options.form_params.is_empty() {
            request = request.form(&options.form_params);
        }
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .map_err(|e| Error::Http(format!("{} {}: {}", method, url, e)))?;

        let status = response.status();
        if options.http_errors && !status.is_success() {
            return Err(Error::HttpStatus {
                method: method.to_string(),
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .text()
            .map_err(|e| Error::Http(format!("failed to read body from {}: {}", url, e)))?;

        Ok(Response {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

impl Default for JsonApiTest<ReqwestTransport> {
    fn default() -> Self {
        JsonApiTest::new(ReqwestTransport::new())
    }
}
