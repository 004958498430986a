//! Uniform response envelope (spec.md §4.8): `{success, message?, data?, error?}`.
//! `AppError` already renders its own `{success:false, error}` body via
//! `IntoResponse`, so this wraps only the success side.

use axum::{response::IntoResponse, Json};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct Envelope {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl Envelope {
    pub fn data(data: impl Serialize) -> impl IntoResponse {
        Json(Envelope {
            success: true,
            message: None,
            data: Some(serde_json::to_value(data).unwrap_or(Value::Null)),
        })
    }

    pub fn message(message: impl Into<String>) -> impl IntoResponse {
        Json(Envelope {
            success: true,
            message: Some(message.into()),
            data: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn data_envelope_omits_message() {
        let response = Envelope::data(serde_json::json!({"session_id": "abc"})).into_response();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("message").is_none());
        assert_eq!(json["data"]["session_id"], "abc");
    }

    #[tokio::test]
    async fn message_envelope_omits_data() {
        let response = Envelope::message("logged out").into_response();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "logged out");
        assert!(json.get("data").is_none());
    }
}
