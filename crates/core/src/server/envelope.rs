//! Webhook request and response bodies.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::relay::events::EventRecord;
use crate::relay::{InvocationRequest, InvokeError, ValidationError};

pub const SERVICE_KEY_HEADER: &str = "IFTTT-Service-Key";
pub const BAD_SERVICE_KEY: &str = "Channel/Service key is not correct";

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractFields {
    #[serde(default)]
    pub contract_id: String,
    #[serde(default)]
    pub network: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionFields {
    #[serde(default)]
    pub contract_id: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub increment_amount: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFields {
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    #[serde(rename = "actionFields")]
    pub action_fields: ActionFields,
    #[serde(default)]
    pub user: Option<UserFields>,
}

impl From<ActionRequest> for InvocationRequest {
    fn from(req: ActionRequest) -> Self {
        InvocationRequest {
            contract_id: req.action_fields.contract_id,
            network: req.action_fields.network,
            increment_amount: req.action_fields.increment_amount,
            time_zone: req.user.and_then(|u| u.timezone),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerRequest {
    #[serde(rename = "triggerFields")]
    pub trigger_fields: ContractFields,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    #[serde(rename = "queryFields")]
    pub query_fields: ContractFields,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub cursor: Option<String>,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ActionResult {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub data: Vec<EventRecord>,
    /// Serialized as `null` on the last page.
    pub cursor: Option<String>,
}

// =============================================================================
// Errors
// =============================================================================

/// An error rendered as `{"errors":[{"message":..}]}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, BAD_SERVICE_KEY)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "errors": [{ "message": self.message }]
        }));
        (self.status, body).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<InvokeError> for ApiError {
    fn from(e: InvokeError) -> Self {
        let status = if e.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::new(status, e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::bad_request(e.body_text())
    }
}
