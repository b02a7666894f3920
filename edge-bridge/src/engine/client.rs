//! EngineClient: authenticated RPC client for the engine
//!
//! Every call goes through the shared [`CircuitBreaker`]. Failed posts are
//! written to the [`FailedPostLedger`] before the error reaches the caller;
//! failed queries are not.

use super::breaker::{BreakerConfig, CircuitBreaker};
use crate::store::FailedPostLedger;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use shared::engine::{
    EngineResponse, HEADER_REQUEST_ID, HEADER_SERVICE_AUTH, HEADER_SERVICE_NAME, RpcRequest,
    UserContext, action,
};
use shared::error::{AppError, AppResult, ErrorCode};
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Message shown when a post could not reach the engine
pub const POST_UNAVAILABLE_MESSAGE: &str =
    "Engine is offline or busy. Your data has been saved for retry.";
/// Message shown when a read could not reach the engine
pub const QUERY_UNAVAILABLE_MESSAGE: &str =
    "Engine is temporarily unavailable. Please try again later.";
/// Technical cause when the breaker rejects a call
pub const BREAKER_OPEN: &str = "Circuit breaker is open";

/// Engine connection settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    /// Shared secret sent as `X-Service-Auth`
    pub secret: String,
    /// Caller identity sent as `X-Service-Name`
    pub service_name: String,
    pub failure_threshold: u32,
    pub recovery_time: Duration,
}

impl EngineConfig {
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}/rpc/execute", self.host, self.port)
    }

    pub fn breaker(&self) -> BreakerConfig {
        BreakerConfig {
            enabled: self.enabled,
            failure_threshold: self.failure_threshold,
            recovery_time: self.recovery_time,
        }
    }
}

/// Why a single RPC attempt failed; the Display text is the technical detail
#[derive(Debug, Error)]
enum CallError {
    #[error("Engine Timeout ({0}ms)")]
    Timeout(u128),

    #[error("Engine HTTP Error: {}", .0.as_u16())]
    Status(StatusCode),

    #[error("Invalid JSON Response from Engine")]
    InvalidResponse,

    #[error("Engine connection failed: {0}")]
    Transport(String),

    #[error("Failed to encode request: {0}")]
    Encode(String),
}

/// RPC client for `POST /rpc/execute`
#[derive(Clone)]
pub struct EngineClient {
    http: Client,
    endpoint: String,
    secret: String,
    service_name: String,
    timeout: Duration,
    breaker: Arc<CircuitBreaker>,
    ledger: FailedPostLedger,
}

impl EngineClient {
    pub fn new(
        config: &EngineConfig,
        breaker: Arc<CircuitBreaker>,
        ledger: FailedPostLedger,
    ) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {e}")))?;

        if config.enabled && config.secret.is_empty() {
            tracing::warn!("INTER_SERVICE_SECRET not set, engine traffic is unauthenticated");
        }

        Ok(Self {
            http,
            endpoint: config.endpoint(),
            secret: config.secret.clone(),
            service_name: config.service_name.clone(),
            timeout: config.timeout,
            breaker,
            ledger,
        })
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Dispatch a write (`post`, `validate`, ...) to the engine.
    ///
    /// Any failure, including a breaker rejection, leaves exactly one ledger
    /// entry behind and returns `ENGINE_UNAVAILABLE`.
    pub async fn execute(
        &self,
        module_id: &str,
        rpc_action: &str,
        table: &str,
        payload: &Value,
        user: &UserContext,
    ) -> AppResult<EngineResponse> {
        if !self.breaker.can_proceed() {
            tracing::error!(module_id = %module_id, table = %table, "Engine unavailable, rejecting post");
            self.ledger.log_failure(table, payload, BREAKER_OPEN).await;
            return Err(AppError::with_message(ErrorCode::EngineUnavailable, POST_UNAVAILABLE_MESSAGE)
                .with_technical(BREAKER_OPEN));
        }

        let request = RpcRequest {
            module: module_id.to_string(),
            action: rpc_action.to_string(),
            table: table.to_string(),
            context: user.to_rpc_context(rpc_action != action::QUERY),
            payload: payload.clone(),
        };

        match self.call(&request).await {
            Ok(response) => {
                self.breaker.record_success();
                Ok(response)
            }
            Err(e) => {
                self.breaker.record_failure();
                let technical = e.to_string();
                tracing::error!(module_id = %module_id, table = %table, error = %technical, "Engine request failed");
                self.ledger.log_failure(table, payload, &technical).await;
                Err(AppError::with_message(ErrorCode::EngineUnavailable, POST_UNAVAILABLE_MESSAGE)
                    .with_technical(technical))
            }
        }
    }

    /// Read-only query; failures are reported but not written to the ledger
    pub async fn query(
        &self,
        module_id: &str,
        table: &str,
        params: &Value,
        user: &UserContext,
    ) -> AppResult<EngineResponse> {
        if !self.breaker.can_proceed() {
            tracing::error!(module_id = %module_id, table = %table, "Engine unavailable, rejecting query");
            return Err(AppError::with_message(ErrorCode::EngineUnavailable, QUERY_UNAVAILABLE_MESSAGE)
                .with_technical(BREAKER_OPEN));
        }

        let request = RpcRequest {
            module: module_id.to_string(),
            action: action::QUERY.to_string(),
            table: table.to_string(),
            context: user.to_rpc_context(false),
            payload: params.clone(),
        };

        match self.call(&request).await {
            Ok(response) => {
                self.breaker.record_success();
                Ok(response)
            }
            Err(e) => {
                self.breaker.record_failure();
                tracing::error!(module_id = %module_id, table = %table, error = %e, "Engine query failed");
                Err(AppError::with_message(ErrorCode::EngineQueryFailed, QUERY_UNAVAILABLE_MESSAGE)
                    .with_technical(e.to_string()))
            }
        }
    }

    /// One HTTP round trip; success means 2xx plus a body with a boolean `ok`
    async fn call(&self, request: &RpcRequest) -> Result<EngineResponse, CallError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let body = serde_json::to_vec(request).map_err(|e| CallError::Encode(e.to_string()))?;

        tracing::debug!(
            request_id = %request_id,
            module_id = %request.module,
            action = %request.action,
            table = %request.table,
            "Sending engine RPC"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(HEADER_SERVICE_AUTH, &self.secret)
            .header(HEADER_REQUEST_ID, &request_id)
            .header(HEADER_SERVICE_NAME, &self.service_name)
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CallError::Status(status));
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        serde_json::from_slice::<EngineResponse>(&bytes).map_err(|_| CallError::InvalidResponse)
    }

    fn classify(&self, err: reqwest::Error) -> CallError {
        if err.is_timeout() {
            return CallError::Timeout(self.timeout.as_millis());
        }

        let mut msg = err.to_string();
        let mut source: Option<&dyn StdError> = StdError::source(&err);
        while let Some(s) = source {
            msg.push_str(&format!(" → {s}"));
            source = s.source();
        }
        CallError::Transport(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::tests::memory_store;
    use serde_json::json;

    fn config(enabled: bool) -> EngineConfig {
        EngineConfig {
            enabled,
            host: "127.0.0.1".into(),
            // Nothing listens on port 9; connections are refused
            port: 9,
            timeout: Duration::from_millis(500),
            secret: "s3cret".into(),
            service_name: "edge-bridge".into(),
            failure_threshold: 2,
            recovery_time: Duration::from_secs(30),
        }
    }

    async fn client(enabled: bool) -> EngineClient {
        let cfg = config(enabled);
        let ledger = FailedPostLedger::new(Arc::new(memory_store().await));
        EngineClient::new(&cfg, Arc::new(CircuitBreaker::new(cfg.breaker())), ledger).unwrap()
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(config(true).endpoint(), "http://127.0.0.1:9/rpc/execute");
    }

    #[test]
    fn test_call_error_messages() {
        assert_eq!(CallError::Timeout(5000).to_string(), "Engine Timeout (5000ms)");
        assert_eq!(
            CallError::Status(StatusCode::SERVICE_UNAVAILABLE).to_string(),
            "Engine HTTP Error: 503"
        );
        assert_eq!(
            CallError::InvalidResponse.to_string(),
            "Invalid JSON Response from Engine"
        );
    }

    #[tokio::test]
    async fn test_disabled_engine_fails_fast_and_logs() {
        let client = client(false).await;
        let err = client
            .execute("finance", "post", "journal", &json!({"id": "j-1"}), &UserContext::default())
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::EngineUnavailable);
        assert_eq!(err.technical(), Some(BREAKER_OPEN));
        assert_eq!(client.ledger.entries().await.unwrap().len(), 1);
        // Rejections are not counted as failures
        assert_eq!(client.breaker().state().failure_count, 0);
    }

    #[tokio::test]
    async fn test_query_failure_not_logged() {
        let client = client(false).await;
        let err = client
            .query("finance", "journal", &json!({"q": "x"}), &UserContext::default())
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::EngineUnavailable);
        assert_eq!(err.message, QUERY_UNAVAILABLE_MESSAGE);
        assert!(client.ledger.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connection_refused_counts_against_breaker() {
        let client = client(true).await;
        let payload = json!({"id": "j-1"});
        let user = UserContext::default();

        for _ in 0..2 {
            let err = client
                .execute("finance", "post", "journal", &payload, &user)
                .await
                .unwrap_err();
            assert_eq!(err.code, ErrorCode::EngineUnavailable);
            assert_eq!(err.message, POST_UNAVAILABLE_MESSAGE);
        }

        assert!(client.breaker().state().open);
        let err = client
            .execute("finance", "post", "journal", &payload, &user)
            .await
            .unwrap_err();
        assert_eq!(err.technical(), Some(BREAKER_OPEN));
        assert_eq!(client.ledger.entries().await.unwrap().len(), 3);
    }
}
