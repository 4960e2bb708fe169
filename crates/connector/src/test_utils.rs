//! Test utilities for driving the client without a network
//!
//! [`ScriptedTransport`] answers requests from canned responses keyed by API
//! path (and optionally query parameters) and records every request it sees.
//! Use it instead of mocking the client - it exercises the real retry, URL
//! building and decoding code paths.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;
use parking_lot::Mutex;
use serde_json::Value;
use tap_iterable_config::Config;

use crate::error::Result;
use crate::transport::{Transport, TransportResponse};

/// Base URL used by [`test_config`]
pub const TEST_BASE_URL: &str = "http://iterable.test/api/";

/// Config pointing at the scripted base URL with millisecond backoff
pub fn test_config() -> Config {
    Config {
        api_key: "test-key".to_string(),
        start_date: "2024-01-01T00:00:00Z".to_string(),
        base_url: TEST_BASE_URL.to_string(),
        retry_base_delay_ms: 1,
        ..Config::default()
    }
}

/// A canned response
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    status: u16,
    chunks: Vec<Bytes>,
}

impl ScriptedResponse {
    /// 200 with a JSON body
    pub fn json(value: &Value) -> Self {
        Self::text(&value.to_string())
    }

    /// 200 with a raw body
    pub fn text(body: &str) -> Self {
        Self {
            status: 200,
            chunks: vec![Bytes::from(body.to_string())],
        }
    }

    /// 200 with newline-delimited lines, one chunk per line
    pub fn lines(lines: &[&str]) -> Self {
        Self {
            status: 200,
            chunks: lines
                .iter()
                .map(|line| Bytes::from(format!("{line}\n")))
                .collect(),
        }
    }

    /// Empty body with the given status
    pub fn status(status: u16) -> Self {
        Self {
            status,
            chunks: Vec::new(),
        }
    }
}

/// A request seen by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Path relative to the API root, e.g. `lists/getUsers`
    pub path: String,
    /// Decoded query parameters in request order
    pub params: Vec<(String, String)>,
}

impl RecordedRequest {
    /// Value of a query parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

struct Route {
    path: String,
    params: Vec<(String, String)>,
    responses: VecDeque<ScriptedResponse>,
}

impl Route {
    fn matches(&self, request: &RecordedRequest) -> bool {
        self.path == request.path
            && self
                .params
                .iter()
                .all(|(k, v)| request.param(k) == Some(v.as_str()))
    }
}

/// In-memory [`Transport`]
///
/// Responses registered for the same route are served in order; the last one
/// repeats forever. Unknown routes answer 404. When several routes match, the
/// one with the most parameters wins.
pub struct ScriptedTransport {
    base_url: String,
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Transport serving [`TEST_BASE_URL`]
    pub fn new() -> Self {
        Self {
            base_url: TEST_BASE_URL.to_string(),
            routes: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a response for a path regardless of parameters
    pub fn respond(&self, path: &str, response: ScriptedResponse) {
        self.respond_with_params(path, &[], response);
    }

    /// Queue a response for a path when all given parameters match
    pub fn respond_with_params(
        &self,
        path: &str,
        params: &[(&str, &str)],
        response: ScriptedResponse,
    ) {
        let params: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut routes = self.routes.lock();
        if let Some(route) = routes
            .iter_mut()
            .find(|r| r.path == path && r.params == params)
        {
            route.responses.push_back(response);
            return;
        }
        routes.push(Route {
            path: path.to_string(),
            params,
            responses: VecDeque::from([response]),
        });
    }

    /// All requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Requests received for one path
    pub fn requests_for(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    fn parse(&self, url: &str) -> RecordedRequest {
        let relative = url.strip_prefix(&self.base_url).unwrap_or(url);
        let (path, query) = relative.split_once('?').unwrap_or((relative, ""));
        let params = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (decode(k), decode(v))
            })
            .collect();
        RecordedRequest {
            path: decode(path),
            params,
        }
    }

    fn next_response(&self, request: &RecordedRequest) -> ScriptedResponse {
        let mut routes = self.routes.lock();
        let route = routes
            .iter_mut()
            .filter(|r| r.matches(request))
            .max_by_key(|r| r.params.len());
        match route {
            Some(route) if route.responses.len() > 1 => {
                route.responses.pop_front().unwrap_or_else(|| ScriptedResponse::status(404))
            }
            Some(route) => route
                .responses
                .front()
                .cloned()
                .unwrap_or_else(|| ScriptedResponse::status(404)),
            None => ScriptedResponse::status(404),
        }
    }
}

fn decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse> {
        let request = self.parse(url);
        let response = self.next_response(&request);
        self.requests.lock().push(request);

        let chunks: Vec<Result<Bytes>> = response.chunks.into_iter().map(Ok).collect();
        Ok(TransportResponse {
            status: response.status,
            body: stream::iter(chunks).boxed(),
        })
    }
}
