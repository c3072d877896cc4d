//! Request and response envelopes.
//!
//! # Merge Order
//! ```text
//! path params → query params → body fields
//! ```
//! Later layers overwrite same-named keys. Path and query values are strings;
//! body values keep their JSON type.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::dispatch::error::{DispatchError, DispatchResult};

/// Key under which the action discriminator travels to the backend.
pub const ACTION_KEY: &str = "action";

/// Raw components of an inbound request, as produced by the front door.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub path: String,
    pub path_params: HashMap<String, String>,
    /// Query pairs in arrival order; a repeated key keeps its last value.
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl RawRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(key.into(), value.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Normalize into a [`RequestEnvelope`].
    pub fn envelope(&self) -> DispatchResult<RequestEnvelope> {
        RequestEnvelope::from_parts(&self.path_params, &self.query, self.body.as_deref())
    }
}

/// Flat request handed to a backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestEnvelope {
    fields: Map<String, Value>,
    action: Option<String>,
}

impl RequestEnvelope {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            action: None,
        }
    }

    /// Merge path params, then query params, then the JSON body.
    ///
    /// An absent or blank body contributes nothing. Any other body must be a
    /// JSON object.
    pub fn from_parts(
        path_params: &HashMap<String, String>,
        query: &[(String, String)],
        body: Option<&[u8]>,
    ) -> DispatchResult<Self> {
        let mut fields = Map::new();

        for (key, value) in path_params {
            fields.insert(key.clone(), Value::String(value.clone()));
        }
        for (key, value) in query {
            fields.insert(key.clone(), Value::String(value.clone()));
        }

        if let Some(body) = body.filter(|b| !b.trim_ascii().is_empty()) {
            match serde_json::from_slice::<Value>(body) {
                Ok(Value::Object(object)) => fields.extend(object),
                Ok(other) => {
                    return Err(DispatchError::BadRequest(format!(
                        "request body must be a JSON object, got {}",
                        json_kind(&other)
                    )))
                }
                Err(e) => {
                    return Err(DispatchError::BadRequest(format!(
                        "malformed JSON body: {e}"
                    )))
                }
            }
        }

        Ok(Self {
            fields,
            action: None,
        })
    }

    /// Attach an action discriminator.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Payload sent over the channel. The action, when set, wins over a
    /// same-named field.
    pub fn to_payload(&self) -> Value {
        let mut payload = self.fields.clone();
        if let Some(action) = &self.action {
            payload.insert(ACTION_KEY.to_string(), Value::String(action.clone()));
        }
        Value::Object(payload)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Failure half of a [`ResponseEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureBody {
    pub status: u16,
    pub message: String,
    pub path: String,
}

/// Normalized outcome of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseEnvelope {
    Success(Value),
    Failure(FailureBody),
}

impl ResponseEnvelope {
    pub fn failure(error: &DispatchError, path: impl Into<String>) -> Self {
        ResponseEnvelope::Failure(FailureBody {
            status: error.status(),
            message: error.to_string(),
            path: path.into(),
        })
    }

    pub fn status(&self) -> u16 {
        match self {
            ResponseEnvelope::Success(_) => 200,
            ResponseEnvelope::Failure(body) => body.status,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseEnvelope::Success(_))
    }
}
