//! Shim over the legacy 1.2 API used for command execution contexts.

use reqwest::Method;
use serde_json::Value;

use super::{ApiClient, ApiResult, Transport, API_V1_PREFIX, API_V2_PREFIX};
use crate::retry::{retry, RetryPolicy, CREATE_CONTEXT_RETRY};

pub struct ApiV1Client<T = ApiClient> {
    v1_client: T,
    create_context_policy: RetryPolicy,
}

impl ApiV1Client<ApiClient> {
    pub fn new(api_client: &ApiClient) -> Self {
        Self::with_transport(api_client.with_api_prefix(API_V2_PREFIX, API_V1_PREFIX))
    }
}

impl<T: Transport> ApiV1Client<T> {
    /// Uses `transport` as-is; it must already point at the legacy prefix.
    pub fn with_transport(transport: T) -> Self {
        Self {
            v1_client: transport,
            create_context_policy: CREATE_CONTEXT_RETRY,
        }
    }

    pub fn with_create_context_policy(mut self, policy: RetryPolicy) -> Self {
        self.create_context_policy = policy;
        self
    }

    pub fn create_context_policy(&self) -> &RetryPolicy {
        &self.create_context_policy
    }

    pub async fn get_command_status(&self, payload: Value) -> ApiResult<Value> {
        self.v1_client
            .perform_query(Method::GET, "/commands/status", Some(payload))
            .await
    }

    pub async fn cancel_command(&self, payload: Value) -> ApiResult<()> {
        self.v1_client
            .perform_query(Method::POST, "/commands/cancel", Some(payload))
            .await?;
        Ok(())
    }

    pub async fn execute_command(&self, payload: Value) -> ApiResult<Value> {
        self.v1_client
            .perform_query(Method::POST, "/commands/execute", Some(payload))
            .await
    }

    /// `None` when the platform rejects the lookup; the context may not exist yet.
    pub async fn get_context_status(&self, payload: Value) -> ApiResult<Option<Value>> {
        match self
            .v1_client
            .perform_query(Method::GET, "/contexts/status", Some(payload))
            .await
        {
            Ok(result) => Ok(Some(result)),
            Err(e) if e.is_http() => {
                tracing::debug!(error = %e, "context status lookup failed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create_context(&self, payload: Value) -> ApiResult<Value> {
        retry(&self.create_context_policy, "create execution context", || {
            self.v1_client
                .perform_query(Method::POST, "/contexts/create", Some(payload.clone()))
        })
        .await
    }
}
