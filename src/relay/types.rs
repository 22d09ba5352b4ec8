// Relay wire types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Storage key for the access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Message posted to the parent once the relay is ready
pub const READY_MESSAGE: &str = "sso_loaded";

/// Access/refresh token pair returned by the token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Commands a parent window may send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundCommand {
    GetToken,
    RefreshToken,
    /// Anything else; ignored without reply
    Unknown(String),
}

impl InboundCommand {
    fn parse(s: &str) -> Self {
        match s {
            "get_token" => InboundCommand::GetToken,
            "refresh_token" => InboundCommand::RefreshToken,
            other => InboundCommand::Unknown(other.to_string()),
        }
    }
}

/// Message received from a parent window
///
/// Only the envelope (`id`, `command`) is read up front. Credentials are
/// checked when a command needs them, so a mistyped field still gets a reply.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Correlation id, echoed verbatim. `Some(Value::Null)` when sent as `null`.
    pub id: Option<Value>,
    pub command: Option<String>,
    fields: Map<String, Value>,
}

impl InboundMessage {
    /// Parse a message payload. Returns `None` for anything that is not an
    /// object.
    pub fn from_value(data: &Value) -> Option<Self> {
        let fields = data.as_object()?.clone();
        Some(Self {
            id: fields.get("id").cloned(),
            command: fields
                .get("command")
                .and_then(Value::as_str)
                .map(str::to_string),
            fields,
        })
    }

    pub fn command(&self) -> InboundCommand {
        InboundCommand::parse(self.command.as_deref().unwrap_or_default())
    }

    /// Credentials forwarded to the token endpoint
    pub fn refresh_request(&self) -> Result<RefreshRequest, serde_json::Error> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }
}

/// Body of `POST /api/v1/tokens`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Reply commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundCommand {
    SetToken,
    Error,
}

/// Reply posted back to the requesting window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub command: OutboundCommand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutboundMessage {
    pub fn set_token(
        id: Option<Value>,
        access_token: Option<String>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            id,
            command: OutboundCommand::SetToken,
            access_token,
            refresh_token,
            error: None,
        }
    }

    pub fn error(id: Option<Value>, message: impl Into<String>) -> Self {
        Self {
            id,
            command: OutboundCommand::Error,
            access_token: None,
            refresh_token: None,
            error: Some(message.into()),
        }
    }

    pub fn to_value(&self) -> Value {
        // Only strings and JSON values inside; serialization cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_get_token() {
        let msg = InboundMessage::from_value(&json!({"id": 7, "command": "get_token"})).unwrap();
        assert_eq!(msg.id, Some(json!(7)));
        assert_eq!(msg.command(), InboundCommand::GetToken);
    }

    #[test]
    fn test_parse_refresh_token_fields() {
        let msg = InboundMessage::from_value(&json!({
            "id": "abc",
            "command": "refresh_token",
            "email": "ada@example.com",
            "password": "hunter2"
        }))
        .unwrap();

        assert_eq!(msg.command(), InboundCommand::RefreshToken);
        let request = msg.refresh_request().unwrap();
        assert_eq!(request.email.as_deref(), Some("ada@example.com"));
        assert_eq!(request.password.as_deref(), Some("hunter2"));
        assert!(request.name.is_none());
        assert!(request.refresh_token.is_none());
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(InboundMessage::from_value(&json!("get_token")).is_none());
        assert!(InboundMessage::from_value(&json!([1, 2])).is_none());
        assert!(InboundMessage::from_value(&Value::Null).is_none());
    }

    #[test]
    fn test_parse_null_id_is_kept() {
        let msg = InboundMessage::from_value(&json!({"id": null, "command": "get_token"})).unwrap();
        assert_eq!(msg.id, Some(Value::Null));

        let msg = InboundMessage::from_value(&json!({"command": "get_token"})).unwrap();
        assert_eq!(msg.id, None);
    }

    #[test]
    fn test_non_string_command_is_unknown() {
        let msg = InboundMessage::from_value(&json!({"id": 1, "command": 5})).unwrap();
        assert_eq!(msg.command(), InboundCommand::Unknown(String::new()));
    }

    #[test]
    fn test_mistyped_credentials_fail_late() {
        let msg = InboundMessage::from_value(
            &json!({"id": 1, "command": "refresh_token", "name": "ada", "password": 12345}),
        )
        .unwrap();

        assert_eq!(msg.id, Some(json!(1)));
        assert_eq!(msg.command(), InboundCommand::RefreshToken);
        assert!(msg.refresh_request().is_err());
    }

    #[test]
    fn test_null_id_is_echoed() {
        let msg = OutboundMessage::set_token(Some(Value::Null), None, None);
        assert_eq!(msg.to_value(), json!({"id": null, "command": "set_token"}));
    }

    #[test]
    fn test_unknown_and_missing_command() {
        let msg = InboundMessage::from_value(&json!({"command": "drop_tables"})).unwrap();
        assert_eq!(
            msg.command(),
            InboundCommand::Unknown("drop_tables".to_string())
        );

        let msg = InboundMessage::from_value(&json!({"id": 1})).unwrap();
        assert_eq!(msg.command(), InboundCommand::Unknown(String::new()));
    }

    #[test]
    fn test_refresh_request_omits_absent_fields() {
        let request = RefreshRequest {
            name: Some("ada".to_string()),
            refresh_token: Some("r".to_string()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"name": "ada", "refresh_token": "r"})
        );
    }

    #[test]
    fn test_set_token_serialization() {
        let msg = OutboundMessage::set_token(
            Some(json!({"seq": 1})),
            Some("A".to_string()),
            Some("B".to_string()),
        );
        assert_eq!(
            msg.to_value(),
            json!({
                "id": {"seq": 1},
                "command": "set_token",
                "access_token": "A",
                "refresh_token": "B"
            })
        );
    }

    #[test]
    fn test_set_token_with_empty_storage_omits_tokens() {
        let msg = OutboundMessage::set_token(Some(json!(3)), None, None);
        assert_eq!(msg.to_value(), json!({"id": 3, "command": "set_token"}));
    }

    #[test]
    fn test_error_serialization_without_id() {
        let msg = OutboundMessage::error(None, "boom");
        assert_eq!(msg.to_value(), json!({"command": "error", "error": "boom"}));
    }
}
