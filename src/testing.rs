//! Recording `Transport` double used by unit tests across the crate.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::api::{ApiError, ApiResult, Transport};

#[derive(Debug, Clone)]
enum MockResponse {
    Json(Value),
    Http {
        status: u16,
        error_code: Option<String>,
    },
    Malformed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub data: Option<Value>,
}

#[derive(Debug, Default)]
struct MockState {
    routes: HashMap<(Method, String), VecDeque<MockResponse>>,
    calls: Vec<RecordedCall>,
}

/// Responses are queued per route; the last queued response repeats.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, path: &str, response: MockResponse) -> &Self {
        self.state
            .lock()
            .unwrap()
            .routes
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
        self
    }

    pub fn respond(&self, method: Method, path: &str, value: Value) -> &Self {
        self.push(method, path, MockResponse::Json(value))
    }

    pub fn fail(&self, method: Method, path: &str, status: u16, error_code: Option<&str>) -> &Self {
        self.push(
            method,
            path,
            MockResponse::Http {
                status,
                error_code: error_code.map(str::to_string),
            },
        )
    }

    pub fn malformed(&self, method: Method, path: &str) -> &Self {
        self.push(method, path, MockResponse::Malformed)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.path == path)
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn perform_query(
        &self,
        method: Method,
        path: &str,
        data: Option<Value>,
    ) -> ApiResult<Value> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RecordedCall {
            method: method.clone(),
            path: path.to_string(),
            data,
        });

        let response = match state.routes.get_mut(&(method.clone(), path.to_string())) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        match response {
            Some(MockResponse::Json(value)) => Ok(value),
            Some(MockResponse::Http { status, error_code }) => Err(ApiError::Http {
                method: method.to_string(),
                path: path.to_string(),
                status,
                error_code,
                message: "mock failure".to_string(),
            }),
            Some(MockResponse::Malformed) => {
                Err(serde_json::from_str::<Value>("{").unwrap_err().into())
            }
            None => Err(ApiError::Http {
                method: method.to_string(),
                path: path.to_string(),
                status: 500,
                error_code: Some("MOCK_UNROUTED".to_string()),
                message: format!("no mock response for {method} {path}"),
            }),
        }
    }
}
