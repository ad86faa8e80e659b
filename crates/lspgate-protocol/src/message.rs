//! JSON-RPC 2.0 message types.
//!
//! Gateway-originated traffic uses the typed structs; traffic forwarded on
//! behalf of clients stays as raw [`Value`]s and is classified with
//! [`Incoming`] so the gateway can route it without re-encoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Build a success response for the given request id.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response for the given request id.
    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// JSON-RPC notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// A classified inbound JSON-RPC message.
///
/// JSON-RPC distinguishes the three shapes by field presence: a `method`
/// with an `id` is a request, a `method` without one is a notification,
/// and an `id` with `result` or `error` is a response. Ids are kept as raw
/// values since peers may use numbers or strings.
#[derive(Debug, Clone)]
pub enum Incoming {
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
    Response {
        id: Value,
        result: Option<Value>,
        error: Option<JsonRpcError>,
    },
}

impl Incoming {
    /// Classify a decoded frame. Returns `None` for values that are not
    /// recognizable JSON-RPC messages.
    pub fn classify(value: Value) -> Option<Self> {
        let obj = value.as_object()?;

        if let Some(method) = obj.get("method").and_then(Value::as_str) {
            let method = method.to_string();
            let params = obj.get("params").cloned();
            return match obj.get("id") {
                Some(id) if !id.is_null() => Some(Incoming::Request {
                    id: id.clone(),
                    method,
                    params,
                }),
                _ => Some(Incoming::Notification { method, params }),
            };
        }

        if let Some(id) = obj.get("id") {
            let error = obj
                .get("error")
                .cloned()
                .and_then(|e| serde_json::from_value(e).ok());
            if obj.contains_key("result") || error.is_some() {
                return Some(Incoming::Response {
                    id: id.clone(),
                    result: obj.get("result").cloned(),
                    error,
                });
            }
        }

        None
    }

    /// The method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Incoming::Request { method, .. } | Incoming::Notification { method, .. } => {
                Some(method)
            }
            Incoming::Response { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serializes_without_null_params() {
        let req = JsonRpcRequest::new(1, "initialize", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""jsonrpc":"2.0""#));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_notification_roundtrip() {
        let note = JsonRpcNotification::new("textDocument/didOpen", Some(json!({"x": 1})));
        let json = serde_json::to_string(&note).unwrap();
        let back: JsonRpcNotification = serde_json::from_str(&json).unwrap();
        assert_eq!(back.method, "textDocument/didOpen");
        assert_eq!(back.params, Some(json!({"x": 1})));
    }

    #[test]
    fn test_classify_request() {
        let msg = Incoming::classify(json!({
            "jsonrpc": "2.0", "id": 7, "method": "workspace/configuration", "params": {}
        }))
        .unwrap();
        match msg {
            Incoming::Request { id, method, .. } => {
                assert_eq!(id, json!(7));
                assert_eq!(method, "workspace/configuration");
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn test_classify_notification() {
        let msg = Incoming::classify(json!({
            "jsonrpc": "2.0", "method": "textDocument/publishDiagnostics", "params": {"uri": "file:///x"}
        }))
        .unwrap();
        assert_eq!(msg.method(), Some("textDocument/publishDiagnostics"));
        assert!(matches!(msg, Incoming::Notification { .. }));
    }

    #[test]
    fn test_classify_response_with_error() {
        let msg = Incoming::classify(json!({
            "jsonrpc": "2.0", "id": "abc",
            "error": {"code": -32601, "message": "method not found"}
        }))
        .unwrap();
        match msg {
            Incoming::Response { id, error, result } => {
                assert_eq!(id, json!("abc"));
                assert!(result.is_none());
                assert_eq!(error.unwrap().code, -32601);
            }
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn test_classify_null_id_is_notification() {
        // Some servers emit notifications with an explicit null id.
        let msg = Incoming::classify(json!({
            "jsonrpc": "2.0", "id": null, "method": "$/progress"
        }))
        .unwrap();
        assert!(matches!(msg, Incoming::Notification { .. }));
    }

    #[test]
    fn test_classify_rejects_non_rpc() {
        assert!(Incoming::classify(json!([1, 2, 3])).is_none());
        assert!(Incoming::classify(json!({"hello": "world"})).is_none());
        assert!(Incoming::classify(json!({"id": 1})).is_none());
    }

    #[test]
    fn test_response_constructors() {
        let ok = JsonRpcResponse::success(json!(3), json!({"capabilities": {}}));
        assert!(ok.error.is_none());

        let err = JsonRpcResponse::failure(json!(3), JsonRpcError::new(-32600, "bad"));
        assert!(err.result.is_none());
        assert_eq!(err.error.unwrap().message, "bad");
    }
}
