//! JSON-RPC 2.0 wire types for the control plane.

use crate::error::SupervisorError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const OPERATION_FAILED: i32 = -32000;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: Option<String>,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Params,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Fault>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, fault: Fault) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(fault),
        }
    }
}

/// Structured error returned to the caller instead of crashing the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Fault {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self::new(PARSE_ERROR, format!("Parse error: {}", detail))
    }

    pub fn invalid_request(detail: impl std::fmt::Display) -> Self {
        Self::new(INVALID_REQUEST, format!("Invalid request: {}", detail))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(detail: impl std::fmt::Display) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {}", detail))
    }

    /// Taxonomy name of an operation failure, if this is one.
    pub fn kind(&self) -> Option<&str> {
        self.data.as_ref()?.get("kind")?.as_str()
    }
}

impl From<SupervisorError> for Fault {
    fn from(err: SupervisorError) -> Self {
        Self {
            code: OPERATION_FAILED,
            message: err.to_string(),
            data: Some(json!({ "kind": err.kind() })),
        }
    }
}

/// Positional (`[a, b]`) or named (`{"a": ..}`) call parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(serde_json::Map<String, Value>),
}

impl Params {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::None => true,
            Self::Positional(values) => values.is_empty(),
            Self::Named(map) => map.is_empty(),
        }
    }

    /// Argument at `index`, or the one called `name`.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        match self {
            Self::None => None,
            Self::Positional(values) => values.get(index),
            Self::Named(map) => map.get(name),
        }
    }

    pub fn optional_str(&self, index: usize, name: &str) -> Result<Option<String>, Fault> {
        match self.get(index, name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(Fault::invalid_params(format!(
                "'{}' must be a string, got {}",
                name, other
            ))),
        }
    }

    pub fn required(&self, index: usize, name: &str) -> Result<&Value, Fault> {
        self.get(index, name)
            .ok_or_else(|| Fault::invalid_params(format!("missing '{}'", name)))
    }
}

impl std::fmt::Display for Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Positional(values) => {
                write!(f, "args: {}", Value::Array(values.clone()))
            }
            Self::Named(map) => write!(f, "kwargs: {}", Value::Object(map.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_accepts_both_param_styles() {
        let positional: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"add","params":[1,2]}"#)
                .unwrap();
        assert_eq!(positional.params.get(1, "b"), Some(&json!(2)));

        let named: RpcRequest = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":"x","method":"update_trex","params":{"package_path":"/tmp/p.tar.gz"}}"#,
        )
        .unwrap();
        assert_eq!(
            named.params.optional_str(0, "package_path").unwrap(),
            Some("/tmp/p.tar.gz".to_string())
        );

        let bare: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":2,"method":"get_methods"}"#).unwrap();
        assert!(bare.params.is_empty());
    }

    #[test]
    fn supervisor_errors_become_operation_faults() {
        let fault = Fault::from(SupervisorError::UpdateDisabled);
        assert_eq!(fault.code, OPERATION_FAILED);
        assert_eq!(fault.kind(), Some("UpdateDisabled"));
        assert_eq!(fault.message, "Updating server not allowed");
    }

    #[test]
    fn wrong_param_type_is_invalid_params() {
        let params = Params::Positional(vec![json!(42)]);
        let fault = params.optional_str(0, "package_path").unwrap_err();
        assert_eq!(fault.code, INVALID_PARAMS);
    }

    #[test]
    fn params_render_for_invocation_log() {
        assert_eq!(Params::Positional(vec![json!(1), json!(2)]).to_string(), "args: [1,2]");
        assert_eq!(Params::None.to_string(), "");
    }
}
