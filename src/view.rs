use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::error;

/// A named view plus its model attributes, rendered as
/// `{ "view": "...", "model": { ... } }`.
#[derive(Debug)]
pub struct View {
    status: StatusCode,
    name: &'static str,
    model: Map<String, Value>,
}

impl View {
    pub fn new(name: &'static str) -> Self {
        Self {
            status: StatusCode::OK,
            name,
            model: Map::new(),
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or_else(|e| {
            error!(error = %e, key, "model attribute not serializable");
            Value::Null
        });
        self.model.insert(key.to_string(), value);
        self
    }
}

impl IntoResponse for View {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "view": self.name,
            "model": Value::Object(self.model),
        });
        (self.status, Json(body)).into_response()
    }
}
