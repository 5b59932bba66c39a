//! JSON-RPC 2.0 endpoint for unary calls.
//!
//! Every method name and parameter name is camelCase, matching what the
//! external tool sends. Mutating methods answer `{"accepted": true}` once the
//! work is queued. Notifications (requests without an `id`) run but get no
//! response body.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use viewsync_core::{EntityId, Position};

use crate::error::{codes, ServiceError};
use crate::metrics;
use crate::service::ViewService;
use crate::AppState;

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID. Absent for notifications.
    #[serde(default)]
    pub id: Value,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request ID (matches request).
    pub id: Value,
    /// Result (on success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i32,
    /// Error message.
    pub message: String,
}

impl JsonRpcResponse {
    /// Create a success response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    #[must_use]
    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddEntityParams {
    label: String,
    id: EntityId,
    x: f32,
    y: f32,
    z: f32,
    #[serde(default)]
    color: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SetColorsParams {
    ids: Vec<EntityId>,
    colors: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct SetVisibilityAndPositionParams {
    ids: Vec<EntityId>,
    coordinates: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct IdsParams {
    ids: Vec<EntityId>,
}

#[derive(Debug, Deserialize)]
struct SetSphereSizeParams {
    size: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetTimePointParams {
    time_point: i64,
}

#[derive(Debug, Deserialize)]
struct SetActiveEntityParams {
    #[serde(default)]
    id: Option<EntityId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetTagSetListParams {
    tag_set_names: Vec<String>,
}

/// Why a call produced an error response.
#[derive(Debug)]
struct RpcFailure {
    code: i32,
    message: String,
}

impl From<ServiceError> for RpcFailure {
    fn from(error: ServiceError) -> Self {
        Self {
            code: error.rpc_code(),
            message: error.to_string(),
        }
    }
}

fn params<T: DeserializeOwned>(params: Value) -> Result<T, RpcFailure> {
    serde_json::from_value(params).map_err(|e| RpcFailure {
        code: codes::INVALID_PARAMS,
        message: format!("invalid params: {e}"),
    })
}

fn accepted() -> Value {
    json!({ "accepted": true })
}

/// Run one method against the service.
fn dispatch(service: &ViewService, method: &str, raw: Value) -> Result<Value, RpcFailure> {
    let result = match method {
        "getVersion" => json!({ "version": service.version() }),
        "closeAll" => {
            service.close_all()?;
            json!({})
        }
        "addEntity" => {
            let p: AddEntityParams = params(raw)?;
            service.add_entity(p.id, p.label, Position::new(p.x, p.y, p.z), p.color)?;
            accepted()
        }
        "setColors" => {
            let p: SetColorsParams = params(raw)?;
            service.set_colors(p.ids, &p.colors)?;
            accepted()
        }
        "setVisibilityAndPosition" => {
            let p: SetVisibilityAndPositionParams = params(raw)?;
            service.set_visibility_and_position(p.ids, p.coordinates)?;
            accepted()
        }
        "setSelection" => {
            let p: IdsParams = params(raw)?;
            service.set_selection(p.ids)?;
            accepted()
        }
        "setSphereSize" => {
            let p: SetSphereSizeParams = params(raw)?;
            service.set_sphere_size(p.size)?;
            accepted()
        }
        "setTimePoint" => {
            let p: SetTimePointParams = params(raw)?;
            service.set_time_point(p.time_point)?;
            accepted()
        }
        "setActiveEntity" => {
            let p: SetActiveEntityParams = params(raw)?;
            service.set_active_entity(p.id)?;
            accepted()
        }
        "getActiveEntity" => json!({ "id": service.active_entity() }),
        "getTimePoint" => json!({ "timePoint": service.time_point() }),
        "setTagSetList" => {
            let p: SetTagSetListParams = params(raw)?;
            service.set_tag_set_list(p.tag_set_names)?;
            accepted()
        }
        "getTagSetList" => json!({ "tagSetNames": service.tag_set_list() }),
        "getSelectedTagSet" => json!({ "index": service.selected_tag_set() }),
        "getSelectedSyncGroup" => json!({ "index": service.selected_sync_group() }),
        _ => {
            return Err(RpcFailure {
                code: codes::METHOD_NOT_FOUND,
                message: format!("Method not found: {method}"),
            })
        }
    };
    Ok(result)
}

/// Handle one raw request body.
///
/// Returns `None` for a well-formed notification. Malformed requests always
/// get an error response.
#[must_use]
pub fn handle_request(service: &ViewService, body: &[u8]) -> Option<JsonRpcResponse> {
    let value = match serde_json::from_slice::<Value>(body) {
        Ok(value) => value,
        Err(e) => {
            metrics::record_rpc_call("unknown", false);
            return Some(JsonRpcResponse::error(
                Value::Null,
                codes::PARSE_ERROR,
                format!("Parse error: {e}"),
            ));
        }
    };
    let is_notification = value.get("id").is_none();
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request = match serde_json::from_value::<JsonRpcRequest>(value) {
        Ok(request) if request.jsonrpc == "2.0" => request,
        Ok(request) => {
            metrics::record_rpc_call("unknown", false);
            return Some(JsonRpcResponse::error(
                request.id,
                codes::INVALID_REQUEST,
                format!("Unsupported jsonrpc version {:?}", request.jsonrpc),
            ));
        }
        Err(e) => {
            metrics::record_rpc_call("unknown", false);
            return Some(JsonRpcResponse::error(
                id,
                codes::INVALID_REQUEST,
                format!("Invalid request: {e}"),
            ));
        }
    };

    let JsonRpcRequest {
        id, method, params, ..
    } = request;
    let response = match dispatch(service, &method, params) {
        Ok(result) => {
            metrics::record_rpc_call(&method, true);
            JsonRpcResponse::success(id, result)
        }
        Err(failure) => {
            metrics::record_rpc_call(&method, false);
            tracing::debug!(%method, code = failure.code, message = %failure.message, "RPC call failed");
            JsonRpcResponse::error(id, failure.code, failure.message)
        }
    };
    (!is_notification).then_some(response)
}

/// JSON-RPC endpoint. Notifications are answered with `204 No Content`.
#[tracing::instrument(name = "rpc_handler", skip(state, body), fields(bytes = body.len()))]
pub async fn rpc_handler(State(state): State<AppState>, body: Bytes) -> Response {
    match handle_request(&state.service, &body) {
        Some(response) => Json(response).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::Shutdown;
    use viewsync_core::{DispatchQueue, SyncState};

    fn service() -> ViewService {
        ViewService::new(DispatchQueue::new(), SyncState::new(), Shutdown::new())
    }

    fn call(service: &ViewService, method: &str, params: Value) -> JsonRpcResponse {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        respond(service, body.to_string().as_bytes())
    }

    fn respond(service: &ViewService, body: &[u8]) -> JsonRpcResponse {
        handle_request(service, body).expect("request with an id should get a response")
    }

    fn error_code(response: &JsonRpcResponse) -> Option<i32> {
        response.error.as_ref().map(|e| e.code)
    }

    #[test]
    fn test_get_version() {
        let response = call(&service(), "getVersion", Value::Null);
        assert_eq!(response.id, json!(1));
        assert_eq!(response.result, Some(json!({ "version": viewsync_core::VERSION })));
    }

    #[test]
    fn test_parse_and_request_errors() {
        let service = service();
        let response = respond(&service, b"{not json");
        assert_eq!(error_code(&response), Some(-32700));

        let response = respond(&service, br#"{"jsonrpc":"1.0","id":4,"method":"getVersion"}"#);
        assert_eq!(error_code(&response), Some(-32600));
        assert_eq!(response.id, json!(4));

        let response = respond(&service, br#"{"jsonrpc":"2.0","id":5}"#);
        assert_eq!(error_code(&response), Some(-32600));
        assert_eq!(response.id, json!(5));
    }

    #[test]
    fn test_unknown_method() {
        let response = call(&service(), "deleteEverything", Value::Null);
        assert_eq!(error_code(&response), Some(-32601));
    }

    #[test]
    fn test_invalid_params() {
        let service = service();
        let response = call(&service, "setColors", json!({ "ids": ["a"] }));
        assert_eq!(error_code(&response), Some(-32602));

        let response = call(&service, "setColors", json!({ "ids": ["a", "b"], "colors": [1] }));
        assert_eq!(error_code(&response), Some(-32602));

        let response = call(&service, "setSphereSize", json!({ "size": -1.0 }));
        assert_eq!(error_code(&response), Some(-32602));
    }

    #[test]
    fn test_mutations_are_accepted() {
        let service = service();
        let response = call(
            &service,
            "addEntity",
            json!({ "label": "spot", "id": 3, "x": 0.0, "y": 1.0, "z": 2.0, "color": 0xff8800 }),
        );
        assert_eq!(response.result, Some(json!({ "accepted": true })));

        let response = call(
            &service,
            "setVisibilityAndPosition",
            json!({ "ids": [3], "coordinates": [1.0, 1.0, 1.0] }),
        );
        assert_eq!(response.result, Some(json!({ "accepted": true })));
        assert_eq!(service.queue_depth(), 2);
    }

    #[test]
    fn test_state_methods() {
        let service = service();
        call(&service, "setTimePoint", json!({ "timePoint": 7 }));
        call(&service, "setTagSetList", json!({ "tagSetNames": ["a", "b"] }));

        assert_eq!(
            call(&service, "getTimePoint", Value::Null).result,
            Some(json!({ "timePoint": 7 }))
        );
        assert_eq!(
            call(&service, "getTagSetList", Value::Null).result,
            Some(json!({ "tagSetNames": ["a", "b"] }))
        );
        assert_eq!(
            call(&service, "getSelectedTagSet", Value::Null).result,
            Some(json!({ "index": -1 }))
        );
        assert_eq!(
            call(&service, "getSelectedSyncGroup", Value::Null).result,
            Some(json!({ "index": -1 }))
        );
        assert_eq!(
            call(&service, "getActiveEntity", Value::Null).result,
            Some(json!({ "id": null }))
        );
    }

    #[test]
    fn test_notification_runs_without_response() {
        let service = service();
        let response = handle_request(
            &service,
            br#"{"jsonrpc":"2.0","method":"setTimePoint","params":{"timePoint":9}}"#,
        );
        assert!(response.is_none());
        assert_eq!(service.time_point(), 9);

        // An explicit null id is a request, not a notification.
        let response = respond(&service, br#"{"jsonrpc":"2.0","id":null,"method":"getVersion"}"#);
        assert_eq!(response.id, Value::Null);
        assert!(response.result.is_some());

        // Malformed notifications are still reported.
        let response = respond(&service, br#"{"jsonrpc":"2.0"}"#);
        assert_eq!(error_code(&response), Some(-32600));
    }

    #[test]
    fn test_signed_argb_colors() {
        let service = service();
        let response = call(&service, "setColors", json!({ "ids": ["a"], "colors": [-65536] }));
        assert_eq!(response.result, Some(json!({ "accepted": true })));

        let response = call(
            &service,
            "addEntity",
            json!({ "label": "b", "id": "b", "x": 0.0, "y": 0.0, "z": 0.0, "color": -16_711_936 }),
        );
        assert_eq!(response.result, Some(json!({ "accepted": true })));

        let response = call(&service, "setColors", json!({ "ids": ["a"], "colors": [8_589_934_592_i64] }));
        assert_eq!(error_code(&response), Some(-32602));
    }

    #[test]
    fn test_closed_service_is_unavailable() {
        let service = service();
        service.begin_shutdown();
        let response = call(&service, "setSelection", json!({ "ids": [] }));
        assert_eq!(error_code(&response), Some(-32003));
    }
}
