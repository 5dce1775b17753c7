// ABOUTME: Request and response bodies exchanged with the attendance API
// ABOUTME: The server sends flags and counters as strings, decoding is lenient

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::mapper::WireRecord;

/// Body of `POST /sessions`.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

/// Body of `POST /device_attendances`: every record under a single `record` array.
#[derive(Debug, Serialize)]
pub struct AttendanceEnvelope<'a> {
    pub record: &'a [WireRecord],
}

/// Response shape shared by every endpoint.
///
/// `success` arrives as the literal string `"true"` or `"false"`; it is
/// compared by string value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiResponse {
    #[serde(default, deserialize_with = "string_flag")]
    pub success: bool,
    #[serde(default, deserialize_with = "loose_string")]
    pub access_token: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub records_updated: Option<String>,
}

impl ApiResponse {
    /// The server's explanation for a failed call.
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "server reported failure without a message".to_string())
    }

    pub fn records_updated_count(&self) -> Option<u64> {
        self.records_updated
            .as_deref()
            .and_then(|count| count.trim().parse().ok())
    }
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn string_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(render(&value).as_deref() == Some("true"))
}

fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(render(&value))
}
