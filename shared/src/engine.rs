//! Engine RPC wire types
//!
//! ```text
//! POST /rpc/execute
//! X-Service-Auth / X-Request-ID / X-Service-Name
//! { module, action, table, context: {...}, payload }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Language sent when the session carries none
pub const DEFAULT_LANG: &str = "ar";

/// Header names
pub const HEADER_SERVICE_AUTH: &str = "X-Service-Auth";
pub const HEADER_REQUEST_ID: &str = "X-Request-ID";
pub const HEADER_SERVICE_NAME: &str = "X-Service-Name";

/// RPC actions understood by the engine
pub mod action {
    pub const QUERY: &str = "query";
    pub const POST: &str = "post";
}

/// Session info of the user on whose behalf a write or read is made
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub session_token: String,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub default_branch_id: Option<String>,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub default_lang: Option<String>,
}

impl UserContext {
    /// Effective branch: the user's default branch wins over the session branch
    pub fn effective_branch(&self) -> Option<&str> {
        self.default_branch_id
            .as_deref()
            .or(self.branch_id.as_deref())
    }

    pub fn effective_lang(&self) -> &str {
        self.default_lang
            .as_deref()
            .or(self.lang.as_deref())
            .unwrap_or(DEFAULT_LANG)
    }

    /// Build the RPC context; permissions are only forwarded for writes
    pub fn to_rpc_context(&self, include_permissions: bool) -> RpcContext {
        RpcContext {
            user_id: self.user_id.clone(),
            session_token: self.session_token.clone(),
            branch_id: self.effective_branch().map(str::to_string),
            company_id: self.company_id.clone(),
            role: self.role.clone(),
            permissions: if include_permissions {
                self.permissions.clone()
            } else {
                None
            },
            lang: self.effective_lang().to_string(),
        }
    }
}

/// Identity block carried by every RPC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcContext {
    pub user_id: String,
    pub session_token: String,
    pub branch_id: Option<String>,
    pub company_id: Option<String>,
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    pub lang: String,
}

/// Body of `POST /rpc/execute`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub module: String,
    pub action: String,
    pub table: String,
    pub context: RpcContext,
    pub payload: Value,
}

/// Structured engine reply; `ok` is mandatory, anything else is passed through
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> UserContext {
        UserContext {
            user_id: "u-1".into(),
            session_token: "tok".into(),
            branch_id: Some("b-session".into()),
            default_branch_id: Some("b-default".into()),
            company_id: Some("c-1".into()),
            role: Some("accountant".into()),
            permissions: Some(vec!["journal:post".into()]),
            lang: Some("en".into()),
            default_lang: None,
        }
    }

    #[test]
    fn test_rpc_context_prefers_defaults() {
        let ctx = user().to_rpc_context(true);
        assert_eq!(ctx.branch_id.as_deref(), Some("b-default"));
        assert_eq!(ctx.lang, "en");
        assert_eq!(ctx.permissions, Some(vec!["journal:post".to_string()]));
    }

    #[test]
    fn test_query_context_omits_permissions() {
        let ctx = user().to_rpc_context(false);
        let json = serde_json::to_value(&ctx).unwrap();
        assert!(json.get("permissions").is_none());
    }

    #[test]
    fn test_lang_falls_back() {
        let ctx = UserContext::default().to_rpc_context(false);
        assert_eq!(ctx.lang, DEFAULT_LANG);
        assert_eq!(ctx.branch_id, None);
    }

    #[test]
    fn test_engine_response_requires_ok() {
        let resp: EngineResponse =
            serde_json::from_value(json!({"ok": true, "id": "j-1"})).unwrap();
        assert!(resp.ok);
        assert_eq!(resp.body["id"], "j-1");

        assert!(serde_json::from_value::<EngineResponse>(json!({"id": "j-1"})).is_err());
        assert!(serde_json::from_value::<EngineResponse>(json!([1, 2])).is_err());
    }
}
