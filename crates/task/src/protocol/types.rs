//! JSON-RPC protocol types and structures

use gradle_tasks_core::{ErrorKind, Reply, JSONRPC_VERSION, REPLY_NOTIFICATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

/// JSON-RPC 2.0 request structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

/// JSON-RPC 2.0 response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// JSON-RPC error structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Terminal failure of an operation, tagged with its kind
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: kind.rpc_code(),
            message: message.into(),
            data: Some(serde_json::json!({ "kind": kind })),
        }
    }
}

/// Streamed reply, sent as a notification tied to the originating request id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification<T> {
    pub jsonrpc: String,
    pub method: String,
    pub params: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyParams {
    pub id: Value,
    pub reply: Reply,
}

impl JsonRpcNotification<ReplyParams> {
    pub fn reply(id: Value, reply: Reply) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: REPLY_NOTIFICATION.to_string(),
            params: ReplyParams { id, reply },
        }
    }
}

/// `getProject` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetProjectParams {
    pub source_dir: String,
}

/// `runTask` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTaskParams {
    pub source_dir: String,
    pub task: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// `cancelRunTask` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRunTaskParams {
    pub source_dir: String,
    pub task: String,
}

/// Methods understood by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GetProject,
    RunTask,
    CancelRunTask,
    CancelRunTasks,
    CancelGetProjects,
}

impl Method {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "getProject" => Some(Method::GetProject),
            "runTask" => Some(Method::RunTask),
            "cancelRunTask" => Some(Method::CancelRunTask),
            "cancelRunTasks" => Some(Method::CancelRunTasks),
            "cancelGetProjects" => Some(Method::CancelGetProjects),
            _ => None,
        }
    }

    /// Whether the method streams replies before its response
    pub fn is_streaming(self) -> bool {
        matches!(self, Method::GetProject | Method::RunTask)
    }
}
